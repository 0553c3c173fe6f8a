//! Shared test support for executor integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use yod_core::http::{
    BlockingTransport, NoJitter, Outcome, PreparedRequest, RawResponse, Transport, TransportError,
    TransportFailureKind,
};
use yod_core::{BackoffPolicy, ClientConfig};

/// A scripted reply for one attempt
#[derive(Debug, Clone)]
pub enum Reply {
    Now(Outcome),
    /// Never answers; only meaningful for the async transport
    Hang,
}

/// Transport that replays scripted outcomes per request path
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, path: &str, outcome: Outcome) {
        self.push_reply(path, Reply::Now(outcome));
    }

    pub fn push_times(&self, path: &str, outcome: Outcome, times: usize) {
        for _ in 0..times {
            self.push(path, outcome.clone());
        }
    }

    pub fn push_hang(&self, path: &str) {
        self.push_reply(path, Reply::Hang);
    }

    fn push_reply(&self, path: &str, reply: Reply) {
        self.script
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == path)
            .count()
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &PreparedRequest) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let path = request.url.path().to_string();
        self.script
            .lock()
            .unwrap()
            .get_mut(&path)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Reply::Now(Err(TransportError::new(
                    TransportFailureKind::Other,
                    format!("no scripted reply left for {}", path),
                )))
            })
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: PreparedRequest) -> Outcome {
        match self.next(&request) {
            Reply::Now(outcome) => outcome,
            Reply::Hang => std::future::pending().await,
        }
    }
}

impl BlockingTransport for ScriptedTransport {
    fn send(&self, request: PreparedRequest) -> Outcome {
        match self.next(&request) {
            Reply::Now(outcome) => outcome,
            Reply::Hang => Err(TransportError::timed_out(request.timeout)),
        }
    }
}

pub fn response(status: u16, body: &str) -> Outcome {
    response_with_headers(status, body, &[])
}

pub fn response_with_headers(status: u16, body: &str, headers: &[(&str, &str)]) -> Outcome {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    Ok(RawResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: map,
        body: body.as_bytes().to_vec(),
    })
}

pub fn refused() -> Outcome {
    Err(TransportError::new(
        TransportFailureKind::Connect,
        "tcp connect error: Connection refused (os error 111)",
    ))
}

/// Config with a tiny, jitter-free backoff so tests never wait long
pub fn fast_config(max_retries: u32) -> ClientConfig {
    config_with_backoff(
        max_retries,
        BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(5)),
    )
}

pub fn config_with_backoff(max_retries: u32, backoff: BackoffPolicy) -> ClientConfig {
    ClientConfig::builder()
        .base_url("http://yod.test")
        .api_key("sk-yod-test")
        .max_retries(max_retries)
        .backoff(backoff.with_jitter(Arc::new(NoJitter)))
        .build()
        .unwrap()
}
