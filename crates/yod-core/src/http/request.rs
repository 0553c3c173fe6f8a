//! Logical request descriptions
//!
//! A [`RequestSpec`] is what the endpoint layer hands to the executor: method,
//! path, optional JSON body, query and extra headers. The executor turns it into
//! a [`PreparedRequest`] once per call and clones that per attempt.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::http::auth::USER_ID_HEADER;
use crate::http::transport::PreparedRequest;
use crate::{Error, Result};

/// One logical HTTP call
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Set a JSON body from an already built value
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize a payload into the JSON body
    pub fn json<T: Serialize + ?Sized>(self, payload: &T) -> Result<Self> {
        let value = serde_json::to_value(payload)
            .map_err(|e| Error::configuration_with_source("Failed to serialize request body", e))?;
        Ok(self.body(value))
    }

    /// Add a query parameter; `None` values are dropped
    pub fn query<V: ToString>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.query.push((key.into(), value.to_string()));
        }
        self
    }

    /// Add a per-request header
    ///
    /// Credential headers (`Authorization`, `X-User-Id`) are rejected; they come
    /// only from the client's resolved credential.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }
}

/// Parse a caller-supplied header, refusing the ones that carry credentials
pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        Error::configuration_with_source(format!("Invalid header name: {}", name), e)
    })?;
    if header_name == AUTHORIZATION || header_name.as_str() == USER_ID_HEADER {
        return Err(Error::configuration(format!(
            "Header {} is derived from the client credential and cannot be set directly",
            header_name
        )));
    }
    let header_value = HeaderValue::from_str(value).map_err(|e| {
        Error::configuration_with_source(format!("Invalid value for header {}", name), e)
    })?;
    Ok((header_name, header_value))
}

/// Join base URL and path the way the server expects, then append the query
pub fn build_url(base_url: &Url, path: &str, query: &[(String, String)]) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base_url.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined).map_err(|e| {
        Error::configuration_with_source(format!("Invalid request URL: {}", joined), e)
    })?;

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    Ok(url)
}

/// Build the attempt template for a logical call
///
/// `base_headers` already holds defaults, credential and custom config headers;
/// per-request headers override them.
pub fn prepare(
    base_url: &Url,
    base_headers: &HeaderMap,
    spec: &RequestSpec,
    timeout: Duration,
) -> Result<PreparedRequest> {
    let url = build_url(base_url, &spec.path, &spec.query)?;

    let mut headers = base_headers.clone();
    let body = match &spec.body {
        Some(value) => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Some(serde_json::to_vec(value).map_err(|e| {
                Error::configuration_with_source("Failed to serialize request body", e)
            })?)
        }
        None => None,
    };
    for (name, value) in &spec.headers {
        headers.insert(name.clone(), value.clone());
    }

    Ok(PreparedRequest {
        method: spec.method.clone(),
        url,
        headers,
        body,
        timeout,
    })
}
