//! Authentication handling for the Yod API
//!
//! Exactly one credential is active per client. When several inputs are
//! supplied the fixed precedence is api-key > bearer-token > dev user-id; the
//! others are dropped, never combined.

use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

use crate::{Error, Result};

/// Dev-mode identity header
pub const USER_ID_HEADER: &str = "x-user-id";

/// Raw credential inputs as supplied by the caller
#[derive(Clone, Default)]
pub struct CredentialInputs {
    pub api_key: Option<String>,
    pub bearer_token: Option<String>,
    pub user_id: Option<String>,
    /// Explicit acknowledgment that requests go out unauthenticated
    pub allow_anonymous: bool,
}

impl fmt::Debug for CredentialInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialInputs")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("user_id", &self.user_id)
            .field("allow_anonymous", &self.allow_anonymous)
            .finish()
    }
}

/// The single resolved credential
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Yod API key (`sk-yod-*`), sent as a bearer token
    ApiKey(String),
    /// JWT bearer token
    BearerToken(String),
    /// `X-User-Id` header, dev deployments only
    DevUser(String),
    /// No authentication, explicitly acknowledged
    Anonymous,
}

impl Credential {
    /// Pick one credential from the inputs
    pub fn resolve(inputs: &CredentialInputs) -> Result<Self> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        if let Some(key) = present(&inputs.api_key) {
            return Ok(Credential::ApiKey(key));
        }
        if let Some(token) = present(&inputs.bearer_token) {
            return Ok(Credential::BearerToken(token));
        }
        if let Some(user_id) = present(&inputs.user_id) {
            return Ok(Credential::DevUser(user_id));
        }
        if inputs.allow_anonymous {
            return Ok(Credential::Anonymous);
        }

        Err(Error::configuration(
            "No credential provided. Set an API key, bearer token or user id \
             (YOD_API_KEY, YOD_TOKEN, YOD_USER_ID), or allow anonymous access explicitly",
        ))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::ApiKey(_) => "api_key",
            Credential::BearerToken(_) => "bearer_token",
            Credential::DevUser(_) => "user_id",
            Credential::Anonymous => "anonymous",
        }
    }

    /// Headers carrying this credential
    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        self.apply_auth(&mut headers)?;
        Ok(headers)
    }

    /// Apply authentication to request headers
    pub fn apply_auth(&self, headers: &mut HeaderMap) -> Result<()> {
        match self {
            Credential::ApiKey(secret) | Credential::BearerToken(secret) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", secret)).map_err(|e| {
                    Error::configuration_with_source(
                        format!("{} contains characters not allowed in a header", self.kind()),
                        e,
                    )
                })?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Credential::DevUser(user_id) => {
                let value = HeaderValue::from_str(user_id).map_err(|e| {
                    Error::configuration_with_source(
                        "user_id contains characters not allowed in a header",
                        e,
                    )
                })?;
                headers.insert(HeaderName::from_static(USER_ID_HEADER), value);
            }
            Credential::Anonymous => {}
        }
        Ok(())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credential::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
            Credential::DevUser(user_id) => f.debug_tuple("DevUser").field(user_id).finish(),
            Credential::Anonymous => f.write_str("Anonymous"),
        }
    }
}
