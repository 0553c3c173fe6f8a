//! Error types for the Yod core library
//!
//! Every logical call resolves to exactly one of these. Transport and HTTP
//! failures arrive already classified as [`HttpError`]; the remaining variants
//! cover problems detected locally before or between attempts.

use thiserror::Error;

use crate::http::error::{ErrorClassification, HttpError};

/// Main error type for Yod client operations
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing credential, invalid URL or header, closed client
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A classified transport or HTTP failure, possibly after retries
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The caller's cancellation signal fired before the call completed
    #[error("Request cancelled")]
    Cancelled,
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error without an underlying source
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error wrapping the error that caused it
    pub fn configuration_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Error::Configuration {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Classification of the failure, if it came from the network or the server
    pub fn classification(&self) -> Option<ErrorClassification> {
        match self {
            Error::Http(e) => Some(e.classification),
            _ => None,
        }
    }

    /// HTTP status code of the final attempt, when one was received
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Http(e) => e.status_code,
            _ => None,
        }
    }

    /// Upstream request identifier, for correlating with server logs
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::Http(e) => e.request_id.as_deref(),
            _ => None,
        }
    }

    /// Borrow the classified error, if any
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Error::Http(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }
}
