//! Non-blocking HTTP client
//!
//! Many logical calls may run concurrently over one client. Each call waits
//! for its own I/O and backoff on the tokio timer, so a call sleeping after a
//! 429 never holds up the others.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfig;
use crate::http::executor::{
    deadline_exceeded, decode_json, decode_response, log_attempt, log_failure, log_retry,
    CallOptions, Executor,
};
use crate::http::request::RequestSpec;
use crate::http::retry::{RetryHandler, Step};
use crate::http::transport::{RawResponse, ReqwestTransport, Transport, TransportError};
use crate::{Error, Result};

/// Unified async client for the Yod API
///
/// Cloning is cheap; clones share configuration, transport and closed state.
#[derive(Clone)]
pub struct HttpClient {
    executor: Arc<Executor>,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client over a pooled reqwest transport
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create from `YOD_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Create over any transport implementation
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Ok(Self {
            executor: Arc::new(Executor::new(config)?),
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }

    /// Reject all subsequently issued calls
    pub fn close(&self) {
        self.executor.close();
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }

    /// Execute a call and decode the 2xx body with `decode`
    pub async fn execute<T, F, E>(&self, spec: RequestSpec, decode: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> std::result::Result<T, E>,
        E: fmt::Display,
    {
        self.execute_with(spec, CallOptions::default(), decode).await
    }

    /// Execute a call and decode the body as JSON
    pub async fn execute_json<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T> {
        self.execute(spec, decode_json).await
    }

    /// Execute a call and return the body bytes untouched
    pub async fn execute_raw(&self, spec: RequestSpec) -> Result<Vec<u8>> {
        self.execute(spec, |body| Ok::<_, Infallible>(body.to_vec()))
            .await
    }

    /// Execute with a deadline and/or cancellation token
    pub async fn execute_with<T, F, E>(
        &self,
        spec: RequestSpec,
        options: CallOptions,
        decode: F,
    ) -> Result<T>
    where
        F: FnOnce(&[u8]) -> std::result::Result<T, E>,
        E: fmt::Display,
    {
        let response = self.send_with_retry(&spec, &options).await?;
        decode_response(response, decode)
    }

    async fn send_with_retry(
        &self,
        spec: &RequestSpec,
        options: &CallOptions,
    ) -> Result<RawResponse> {
        self.executor.ensure_open()?;
        let template = self.executor.prepare(spec)?;
        let mut handler = RetryHandler::new(self.executor.retry_policy());

        loop {
            let Some(attempt_timeout) = self.executor.attempt_timeout(options) else {
                return Err(deadline_exceeded(&template).into());
            };

            let mut request = template.clone();
            request.timeout = attempt_timeout;
            log_attempt(&request, handler.attempt());

            let outcome = tokio::select! {
                biased;
                _ = cancelled(options.cancel.as_ref()) => {
                    debug!(
                        url = %template.url,
                        attempt = handler.attempt(),
                        "request cancelled during I/O"
                    );
                    return Err(Error::Cancelled);
                }
                sent = tokio::time::timeout(attempt_timeout, self.transport.send(request)) => {
                    sent.unwrap_or_else(|_| Err(TransportError::timed_out(attempt_timeout)))
                }
            };

            match handler.on_outcome(outcome) {
                Step::Succeeded(response) => return Ok(response),
                Step::Failed(error) => {
                    log_failure(&template, &handler, &error);
                    return Err(error.into());
                }
                Step::Retrying { delay, error } => {
                    if !options.fits(delay) {
                        log_failure(&template, &handler, &error);
                        return Err(error.into());
                    }
                    log_retry(&template, &handler, delay, &error);

                    tokio::select! {
                        biased;
                        _ = cancelled(options.cancel.as_ref()) => {
                            debug!(
                                url = %template.url,
                                attempt = handler.attempt(),
                                "request cancelled during backoff"
                            );
                            return Err(Error::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

/// Resolves when the token fires; never resolves without one
async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_client_creation() {
        let config = ClientConfig::builder()
            .api_key("sk-yod-test")
            .base_url("http://localhost:8000")
            .build()
            .unwrap();
        let client = HttpClient::new(config).unwrap();
        assert_eq!(client.config().base_url.as_str(), "http://localhost:8000/");
        assert!(!client.is_closed());
    }

    #[test]
    fn test_clones_share_closed_state() {
        let config = ClientConfig::builder().user_id("dev").build().unwrap();
        let client = HttpClient::new(config).unwrap();
        let clone = client.clone();
        client.close();
        assert!(clone.is_closed());
    }

    #[tokio::test]
    async fn test_closed_client_fails_fast() {
        let config = ClientConfig::builder()
            .api_key("sk-yod-test")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();
        let client = HttpClient::new(config).unwrap();
        client.close();

        let err = client.execute_raw(RequestSpec::get("/health")).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("closed"));
    }
}
