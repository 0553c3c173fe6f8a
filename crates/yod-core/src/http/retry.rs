//! Retry state machine shared by the blocking and non-blocking executors
//!
//! The handler is a pure function of (attempt state, outcome) to next step. It
//! never sleeps or performs I/O; the adapters in `client` and `blocking` do
//! the waiting in their own concurrency model.

use std::time::{Duration, Instant};

use crate::http::backoff::BackoffPolicy;
use crate::http::error::{ErrorClassification, HttpError};
use crate::http::transport::{Outcome, RawResponse};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }
}

/// Decision on whether to retry a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the request after the specified delay
    Retry { delay: Duration },
    /// Do not retry the request
    NoRetry,
}

/// What the executor does next
#[derive(Debug)]
pub enum Step {
    /// 2xx received; decode and return
    Succeeded(RawResponse),
    /// Wait `delay`, then attempt again
    Retrying { delay: Duration, error: HttpError },
    /// Terminal failure: non-retryable, or the retry budget is spent
    Failed(HttpError),
}

/// Record of one physical attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    /// Zero-based
    pub index: u32,
    /// Time since the logical call started when the outcome arrived
    pub elapsed: Duration,
    pub status: Option<u16>,
    /// `None` for a successful attempt
    pub classification: Option<ErrorClassification>,
}

/// Per-call retry state
#[derive(Debug)]
pub struct RetryHandler<'a> {
    policy: &'a RetryPolicy,
    attempt: u32,
    started: Instant,
    history: Vec<Attempt>,
}

impl<'a> RetryHandler<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            started: Instant::now(),
            history: Vec::new(),
        }
    }

    /// Index of the attempt about to be made (or just made)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempts recorded so far
    pub fn attempts(&self) -> &[Attempt] {
        &self.history
    }

    /// Feed the outcome of the current attempt and get the next step
    pub fn on_outcome(&mut self, outcome: Outcome) -> Step {
        let error = match outcome {
            Ok(response) if response.status.is_success() => {
                self.record(Some(response.status.as_u16()), None);
                return Step::Succeeded(response);
            }
            Ok(response) => HttpError::from_response(&response),
            Err(failure) => HttpError::from_transport(&failure),
        };

        self.record(error.status_code, Some(error.classification));

        match self.should_retry(&error) {
            RetryDecision::Retry { delay } => {
                self.attempt += 1;
                Step::Retrying { delay, error }
            }
            RetryDecision::NoRetry => Step::Failed(error),
        }
    }

    /// Determine if a request should be retried based on the error
    pub fn should_retry(&self, error: &HttpError) -> RetryDecision {
        if !error.should_retry() {
            return RetryDecision::NoRetry;
        }

        if self.attempt >= self.policy.max_retries {
            return RetryDecision::NoRetry;
        }

        let delay = self.policy.backoff.delay(self.attempt, error.retry_hint());
        RetryDecision::Retry { delay }
    }

    fn record(&mut self, status: Option<u16>, classification: Option<ErrorClassification>) {
        self.history.push(Attempt {
            index: self.attempt,
            elapsed: self.started.elapsed(),
            status,
            classification,
        });
    }
}
