//! HTTP error classification and normalization
//!
//! Maps transport failures and non-2xx responses onto one closed set of
//! classifications. Callers match on [`ErrorClassification`] rather than on raw
//! status codes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::transport::{RawResponse, TransportError, TransportFailureKind};

/// Response header carrying the upstream request identifier
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_MESSAGE_CHARS: usize = 512;

/// Classification of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClassification {
    /// 401 - invalid or missing credentials
    Authentication,
    /// 403 - credentials lack permission
    Authorization,
    /// 404 - resource does not exist
    NotFound,
    /// 422 - request body rejected
    Validation,
    /// 429 - rate limited, may carry a Retry-After hint
    RateLimit,
    /// 500, 502, 503, 504
    Server,
    /// Connection refused, reset or DNS failure
    Connection,
    /// Attempt deadline exceeded
    Timeout,
    /// Any other status, protocol failure, or undecodable success body
    Unknown,
}

impl ErrorClassification {
    /// Check if this error type should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClassification::RateLimit
                | ErrorClassification::Server
                | ErrorClassification::Connection
                | ErrorClassification::Timeout
        )
    }

    /// Classify a non-2xx HTTP status
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 => ErrorClassification::Authentication,
            403 => ErrorClassification::Authorization,
            404 => ErrorClassification::NotFound,
            422 => ErrorClassification::Validation,
            429 => ErrorClassification::RateLimit,
            500 | 502 | 503 | 504 => ErrorClassification::Server,
            _ => ErrorClassification::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClassification::Authentication => "authentication",
            ErrorClassification::Authorization => "authorization",
            ErrorClassification::NotFound => "not_found",
            ErrorClassification::Validation => "validation",
            ErrorClassification::RateLimit => "rate_limit",
            ErrorClassification::Server => "server",
            ErrorClassification::Connection => "connection",
            ErrorClassification::Timeout => "timeout",
            ErrorClassification::Unknown => "unknown",
        }
    }

    /// Message used when the server sent nothing more specific
    fn default_message(&self) -> &'static str {
        match self {
            ErrorClassification::Authentication => "Authentication failed",
            ErrorClassification::Authorization => "Permission denied",
            ErrorClassification::NotFound => "Resource not found",
            ErrorClassification::Validation => "Validation error",
            ErrorClassification::RateLimit => "Rate limit exceeded",
            ErrorClassification::Server => "Server error",
            ErrorClassification::Connection => "Connection failed",
            ErrorClassification::Timeout => "Request timed out",
            ErrorClassification::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized error for one logical call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpError {
    /// Closed classification callers match on
    pub classification: ErrorClassification,
    /// HTTP status code if a response was received
    pub status_code: Option<u16>,
    /// Human-readable error message
    pub message: String,
    /// Raw response body text, if any
    pub body: Option<String>,
    /// Response body parsed as JSON, if it was JSON
    pub details: Option<Value>,
    /// Server-supplied wait hint (rate limits only)
    pub retry_after: Option<Duration>,
    /// Upstream request identifier
    pub request_id: Option<String>,
}

impl HttpError {
    pub fn new(
        classification: ErrorClassification,
        status_code: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            classification,
            status_code,
            message: message.into(),
            body: None,
            details: None,
            retry_after: None,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Classify a non-2xx response
    pub fn from_response(response: &RawResponse) -> Self {
        let classification = ErrorClassification::from_status(response.status);
        let body = String::from_utf8_lossy(&response.body).into_owned();
        let details = serde_json::from_str::<Value>(&body).ok();

        let message = Self::extract_message(details.as_ref(), &body)
            .unwrap_or_else(|| classification.default_message().to_string());

        let retry_after = match classification {
            ErrorClassification::RateLimit => parse_retry_after(&response.headers, Utc::now()),
            _ => None,
        };

        Self {
            classification,
            status_code: Some(response.status.as_u16()),
            message,
            body: (!body.is_empty()).then_some(body),
            details,
            retry_after,
            request_id: request_id(&response.headers),
        }
    }

    /// Classify a failure that produced no HTTP response
    pub fn from_transport(error: &TransportError) -> Self {
        let classification = match error.kind {
            TransportFailureKind::Connect | TransportFailureKind::Dns => {
                ErrorClassification::Connection
            }
            TransportFailureKind::TimedOut => ErrorClassification::Timeout,
            TransportFailureKind::Other => ErrorClassification::Unknown,
        };
        Self::new(classification, None, error.message.clone())
    }

    /// A 2xx response whose body could not be decoded into the expected type
    pub fn decode_failure(response: &RawResponse, reason: impl fmt::Display) -> Self {
        let body = String::from_utf8_lossy(&response.body).into_owned();
        Self {
            classification: ErrorClassification::Unknown,
            status_code: Some(response.status.as_u16()),
            message: format!("Failed to decode response body: {}", reason),
            body: (!body.is_empty()).then_some(body),
            details: None,
            retry_after: None,
            request_id: request_id(&response.headers),
        }
    }

    /// Pull a message out of the common error body shapes
    fn extract_message(details: Option<&Value>, body: &str) -> Option<String> {
        if let Some(json) = details {
            // FastAPI style: {"detail": "..."} or {"detail": [{...}]}
            if let Some(detail) = json.get("detail") {
                return Some(match detail {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            }

            if let Some(message) = json.get("message").and_then(|m| m.as_str()) {
                return Some(message.to_string());
            }

            match json.get("error") {
                Some(Value::String(s)) => return Some(s.clone()),
                Some(error) => {
                    if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
                        return Some(message.to_string());
                    }
                }
                None => {}
            }
        }

        // Fallback to raw body
        let trimmed = body.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.chars().take(MAX_MESSAGE_CHARS).collect())
        }
    }

    /// Check if this error should trigger a retry
    pub fn should_retry(&self) -> bool {
        self.classification.is_retryable()
    }

    /// Wait hint that overrides computed backoff
    pub fn retry_hint(&self) -> Option<Duration> {
        match self.classification {
            ErrorClassification::RateLimit => self.retry_after,
            _ => None,
        }
    }

    pub fn classification(&self) -> ErrorClassification {
        self.classification
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "{}: {}", status, self.message)?,
            None => write!(f, "{}: {}", self.classification, self.message)?,
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " (request_id: {})", request_id)?;
        }
        if let Some(retry_after) = self.retry_hint() {
            write!(f, " (retry after {}s)", retry_after.as_secs_f64())?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}

/// Read the upstream request identifier, if present
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse `Retry-After` as delta-seconds or an HTTP-date relative to `now`
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        return Duration::try_from_secs_f64(seconds).ok();
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        at.with_timezone(&Utc)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}
