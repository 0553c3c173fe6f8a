//! Blocking HTTP client
//!
//! Same retry semantics as [`HttpClient`](crate::http::HttpClient); one
//! logical call occupies the calling thread end to end, backoff included.
//! Cancellation is observed before each attempt, as soon as an attempt returns
//! and while sleeping. An attempt already on the wire is bounded by its timeout.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

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
use crate::http::transport::{BlockingTransport, RawResponse};
use crate::{Error, Result};

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Synchronous client for the Yod API
#[derive(Clone)]
pub struct BlockingHttpClient {
    executor: Arc<Executor>,
    transport: Arc<dyn BlockingTransport>,
}

impl fmt::Debug for BlockingHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingHttpClient")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl BlockingHttpClient {
    /// Create a client over reqwest's blocking transport
    ///
    /// Must not be called from inside an async runtime.
    #[cfg(feature = "blocking")]
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = crate::http::transport::ReqwestBlockingTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    #[cfg(feature = "blocking")]
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn BlockingTransport>,
    ) -> Result<Self> {
        Ok(Self {
            executor: Arc::new(Executor::new(config)?),
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }

    pub fn close(&self) {
        self.executor.close();
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }

    pub fn execute<T, F, E>(&self, spec: RequestSpec, decode: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> std::result::Result<T, E>,
        E: fmt::Display,
    {
        self.execute_with(spec, CallOptions::default(), decode)
    }

    pub fn execute_json<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T> {
        self.execute(spec, decode_json)
    }

    pub fn execute_raw(&self, spec: RequestSpec) -> Result<Vec<u8>> {
        self.execute(spec, |body| Ok::<_, Infallible>(body.to_vec()))
    }

    pub fn execute_with<T, F, E>(
        &self,
        spec: RequestSpec,
        options: CallOptions,
        decode: F,
    ) -> Result<T>
    where
        F: FnOnce(&[u8]) -> std::result::Result<T, E>,
        E: fmt::Display,
    {
        let response = self.send_with_retry(&spec, &options)?;
        decode_response(response, decode)
    }

    fn send_with_retry(&self, spec: &RequestSpec, options: &CallOptions) -> Result<RawResponse> {
        self.executor.ensure_open()?;
        let template = self.executor.prepare(spec)?;
        let mut handler = RetryHandler::new(self.executor.retry_policy());

        loop {
            if options.is_cancelled() {
                debug!(
                    url = %template.url,
                    attempt = handler.attempt(),
                    "request cancelled before attempt"
                );
                return Err(Error::Cancelled);
            }
            let Some(attempt_timeout) = self.executor.attempt_timeout(options) else {
                return Err(deadline_exceeded(&template).into());
            };

            let mut request = template.clone();
            request.timeout = attempt_timeout;
            log_attempt(&request, handler.attempt());

            let outcome = self.transport.send(request);
            if options.is_cancelled() {
                debug!(
                    url = %template.url,
                    attempt = handler.attempt(),
                    "request cancelled during I/O"
                );
                return Err(Error::Cancelled);
            }

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

                    if sleep_unless_cancelled(delay, options.cancel.as_ref()) {
                        debug!(
                            url = %template.url,
                            attempt = handler.attempt(),
                            "request cancelled during backoff"
                        );
                        return Err(Error::Cancelled);
                    }
                }
            }
        }
    }
}

/// Sleep for `delay`; returns `true` if the token fired first
fn sleep_unless_cancelled(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    let Some(token) = cancel else {
        std::thread::sleep(delay);
        return false;
    };

    let until = Instant::now() + delay;
    loop {
        if token.is_cancelled() {
            return true;
        }
        let now = Instant::now();
        if now >= until {
            return false;
        }
        std::thread::sleep((until - now).min(CANCEL_POLL_INTERVAL));
    }
}
