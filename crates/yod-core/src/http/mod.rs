//! HTTP request execution for the Yod API
//!
//! This module provides:
//! - Credential resolution into request headers
//! - Error classification and normalization
//! - Exponential backoff with injectable jitter
//! - A pure retry state machine
//! - Blocking and non-blocking executors sharing that state machine
//! - The transport seam, with reqwest implementations

pub mod auth;
pub mod backoff;
pub mod blocking;
pub mod client;
pub mod error;
pub mod executor;
pub mod request;
pub mod retry;
pub mod transport;

pub use auth::{Credential, CredentialInputs};
pub use backoff::{BackoffPolicy, JitterSource, NoJitter, SeededJitter, ThreadRngJitter};
pub use blocking::BlockingHttpClient;
pub use client::HttpClient;
pub use error::{ErrorClassification, HttpError};
pub use executor::{decode_json, CallOptions};
pub use request::RequestSpec;
pub use retry::{Attempt, RetryDecision, RetryHandler, RetryPolicy, Step};
pub use transport::{
    BlockingTransport, Outcome, PreparedRequest, RawResponse, ReqwestTransport, Transport,
    TransportError, TransportFailureKind,
};

#[cfg(feature = "blocking")]
pub use transport::ReqwestBlockingTransport;

// Re-export commonly used types
pub use reqwest::{Method, StatusCode};
