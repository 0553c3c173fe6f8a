//! State shared by both execution adapters
//!
//! Holds the read-only configuration, the pre-resolved base headers and the
//! closed flag. Nothing here is mutated per call except through atomics, so
//! no lock is ever held across an I/O or backoff suspension point.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::http::error::{ErrorClassification, HttpError};
use crate::http::request::{prepare, RequestSpec};
use crate::http::retry::{RetryHandler, RetryPolicy};
use crate::http::transport::{PreparedRequest, RawResponse};
use crate::{Error, Result};

/// Per-call controls beyond the client configuration
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Absolute deadline for the whole logical call, retries included
    pub deadline: Option<Instant>,
    /// Aborts the call at the next suspension point when fired
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Whether a wait of `delay` still ends before the deadline
    pub(crate) fn fits(&self, delay: Duration) -> bool {
        self.deadline
            .map_or(true, |deadline| Instant::now() + delay < deadline)
    }
}

/// Shared request execution state
#[derive(Debug)]
pub struct Executor {
    config: ClientConfig,
    base_headers: HeaderMap,
    retry_policy: RetryPolicy,
    closed: AtomicBool,
}

impl Executor {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let base_headers = config.base_headers()?;
        let retry_policy = RetryPolicy::new(config.max_retries, config.backoff.clone());
        debug!(
            base_url = %config.base_url,
            credential = config.credential.kind(),
            max_retries = config.max_retries,
            "client configured"
        );
        Ok(Self {
            config,
            base_headers,
            retry_policy,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Mark closed; later calls fail fast, in-flight calls are left alone
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(base_url = %self.config.base_url, "client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::configuration("Client is closed"));
        }
        Ok(())
    }

    /// Build the attempt template for a logical call
    pub fn prepare(&self, spec: &RequestSpec) -> Result<PreparedRequest> {
        prepare(
            &self.config.base_url,
            &self.base_headers,
            spec,
            self.config.request_timeout,
        )
    }

    /// Timeout for the next attempt, or `None` if the call deadline has passed
    pub fn attempt_timeout(&self, options: &CallOptions) -> Option<Duration> {
        match options.deadline {
            None => Some(self.config.request_timeout),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    None
                } else {
                    Some(remaining.min(self.config.request_timeout))
                }
            }
        }
    }
}

/// Error returned when the call deadline passes before an attempt can start
pub(crate) fn deadline_exceeded(request: &PreparedRequest) -> HttpError {
    HttpError::new(
        ErrorClassification::Timeout,
        None,
        format!("deadline exceeded before request to {} could be sent", request.url),
    )
}

pub(crate) fn log_attempt(request: &PreparedRequest, attempt: u32) {
    debug!(
        method = %request.method,
        url = %request.url,
        attempt,
        timeout_ms = request.timeout.as_millis() as u64,
        "sending request"
    );
}

pub(crate) fn log_retry(
    request: &PreparedRequest,
    handler: &RetryHandler<'_>,
    delay: Duration,
    error: &HttpError,
) {
    warn!(
        method = %request.method,
        url = %request.url,
        attempt = handler.attempt(),
        delay_ms = delay.as_millis() as u64,
        classification = %error.classification,
        status = error.status_code,
        request_id = error.request_id.as_deref(),
        "request failed, retrying: {}",
        error
    );
}

pub(crate) fn log_failure(
    request: &PreparedRequest,
    handler: &RetryHandler<'_>,
    error: &HttpError,
) {
    error!(
        method = %request.method,
        url = %request.url,
        attempts = handler.attempts().len(),
        classification = %error.classification,
        status = error.status_code,
        request_id = error.request_id.as_deref(),
        "request failed, not retrying: {}",
        error
    );
}

/// Decode a 2xx body; a decode failure is terminal and never retried
pub fn decode_response<T, F, E>(response: RawResponse, decode: F) -> Result<T>
where
    F: FnOnce(&[u8]) -> std::result::Result<T, E>,
    E: fmt::Display,
{
    decode(&response.body).map_err(|e| {
        let error = HttpError::decode_failure(&response, e);
        warn!(
            status = error.status_code,
            request_id = error.request_id.as_deref(),
            "{}",
            error.message
        );
        Error::Http(error)
    })
}

/// JSON decoder used by `execute_json`; an empty body decodes as `null`
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> serde_json::Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_slice(b"null")
    } else {
        serde_json::from_slice(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde::Deserialize;

    fn executor() -> Executor {
        let config = ClientConfig::builder()
            .api_key("sk-yod-test")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();
        Executor::new(config).unwrap()
    }

    fn ok(body: &str) -> RawResponse {
        RawResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Health {
        status: String,
    }

    #[test]
    fn test_closed_executor_rejects_calls() {
        let executor = executor();
        assert!(executor.ensure_open().is_ok());
        executor.close();
        executor.close();
        assert!(executor.is_closed());
        assert!(executor.ensure_open().unwrap_err().is_configuration());
    }

    #[test]
    fn test_prepare_carries_auth_and_timeout() {
        let request = executor().prepare(&RequestSpec::get("/health")).unwrap();
        assert_eq!(request.url.as_str(), "https://api.yod.agames.ai/health");
        assert_eq!(request.headers.get("authorization").unwrap(), "Bearer sk-yod-test");
        assert_eq!(request.timeout, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_respects_deadline() {
        let executor = executor();
        assert_eq!(executor.attempt_timeout(&CallOptions::new()), Some(Duration::from_secs(30)));

        let options = CallOptions::new().with_timeout(Duration::from_secs(5));
        assert_eq!(executor.attempt_timeout(&options), Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(executor.attempt_timeout(&options), None);
        assert!(!options.fits(Duration::from_millis(1)));
    }

    #[test]
    fn test_decode_json_success() {
        let health: Health = decode_response(ok(r#"{"status": "ok"}"#), decode_json).unwrap();
        assert_eq!(health.status, "ok");
    }

    #[test]
    fn test_decode_failure_is_unknown() {
        let err = decode_response::<Health, _, _>(ok("<html>"), decode_json).unwrap_err();
        assert_eq!(err.classification(), Some(ErrorClassification::Unknown));
        assert_eq!(err.status_code(), Some(200));
    }

    #[test]
    fn test_empty_body_decodes_as_null() {
        let unit: () = decode_response(ok(""), decode_json).unwrap();
        assert_eq!(unit, ());
        let missing: Option<Health> = decode_response(ok("  "), decode_json).unwrap();
        assert!(missing.is_none());
    }
}
