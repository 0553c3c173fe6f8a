//! Client configuration
//!
//! A [`ClientConfig`] is built and validated once, then shared read-only by
//! every call on a client. Changing credentials means building a new client.
//!
//! Values come from the builder or from the environment:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `YOD_BASE_URL` | API base URL |
//! | `YOD_API_KEY` | API key (`sk-yod-*`) |
//! | `YOD_TOKEN` | JWT bearer token |
//! | `YOD_USER_ID` | dev-mode user id |
//! | `YOD_TIMEOUT` | request timeout, seconds |
//! | `YOD_CONNECT_TIMEOUT` | connect timeout, seconds |
//! | `YOD_MAX_RETRIES` | retry budget |

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use url::Url;

use crate::http::auth::{Credential, CredentialInputs};
use crate::http::backoff::BackoffPolicy;
use crate::http::request::parse_header;
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.yod.agames.ai";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_USER_AGENT: &str = concat!("yod-rust-sdk/", env!("CARGO_PKG_VERSION"));

/// Validated client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub credential: Credential,
    /// Deadline for one attempt, including reading the body
    pub request_timeout: Duration,
    /// Deadline for establishing a connection
    pub connect_timeout: Duration,
    /// Retries after the first attempt; a call makes at most `max_retries + 1` attempts
    pub max_retries: u32,
    /// Sent on every request
    pub custom_headers: HeaderMap,
    pub user_agent: String,
    pub backoff: BackoffPolicy,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Load from `YOD_*` variables, reading a `.env` file first if one exists
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        ClientConfigBuilder::from_lookup(|key| std::env::var(key).ok())?.build()
    }

    /// Validate timeout and URL invariants
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::configuration("Connect timeout cannot be zero"));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::configuration("Request timeout cannot be zero"));
        }

        if self.request_timeout < self.connect_timeout {
            return Err(Error::configuration("Request timeout should be >= connect timeout"));
        }

        match self.base_url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(Error::configuration(format!(
                "Base URL must use http or https, got {}",
                other
            ))),
        }
    }

    /// Headers sent on every request: defaults, then credential, then custom headers
    pub fn base_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|e| Error::configuration_with_source("Invalid user agent", e))?;
        headers.insert(USER_AGENT, user_agent);

        self.credential.apply_auth(&mut headers)?;

        for (name, value) in &self.custom_headers {
            headers.insert(name.clone(), value.clone());
        }
        Ok(headers)
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    credentials: CredentialInputs,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    max_retries: Option<u32>,
    headers: Vec<(String, String)>,
    user_agent: Option<String>,
    backoff: Option<BackoffPolicy>,
}

impl ClientConfigBuilder {
    /// Read settings through `lookup`, e.g. the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();
        builder.base_url = lookup("YOD_BASE_URL");
        builder.credentials.api_key = lookup("YOD_API_KEY");
        builder.credentials.bearer_token = lookup("YOD_TOKEN");
        builder.credentials.user_id = lookup("YOD_USER_ID");

        if let Some(raw) = lookup("YOD_TIMEOUT") {
            builder.timeout = Some(parse_seconds("YOD_TIMEOUT", &raw)?);
        }
        if let Some(raw) = lookup("YOD_CONNECT_TIMEOUT") {
            builder.connect_timeout = Some(parse_seconds("YOD_CONNECT_TIMEOUT", &raw)?);
        }
        if let Some(raw) = lookup("YOD_MAX_RETRIES") {
            let retries = raw.trim().parse::<u32>().map_err(|e| {
                Error::configuration_with_source(
                    format!("YOD_MAX_RETRIES must be a non-negative integer, got {:?}", raw),
                    e,
                )
            })?;
            builder.max_retries = Some(retries);
        }

        Ok(builder)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.credentials.api_key = Some(api_key.into());
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.credentials.bearer_token = Some(token.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.credentials.user_id = Some(user_id.into());
        self
    }

    /// Acknowledge that requests may go out with no credential
    pub fn allow_anonymous(mut self, allow: bool) -> Self {
        self.credentials.allow_anonymous = allow;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Add a header sent on every request
    ///
    /// `Authorization` and `X-User-Id` are refused at `build()`; set a credential instead.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let raw_url = self
            .base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(raw_url.trim()).map_err(|e| {
            Error::configuration_with_source(format!("Invalid base URL: {}", raw_url), e)
        })?;

        let credential = Credential::resolve(&self.credentials)?;

        let mut custom_headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let (name, value) = parse_header(name, value)?;
            custom_headers.insert(name, value);
        }

        let config = ClientConfig {
            base_url,
            credential,
            request_timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            custom_headers,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            backoff: self.backoff.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| {
            Error::configuration(format!(
                "{} must be a non-negative number of seconds, got {:?}",
                key, raw
            ))
        })
}
