//! Integration tests for the blocking executor

mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;
use yod_core::http::{BlockingTransport, Outcome, PreparedRequest};
use yod_core::{
    BackoffPolicy, BlockingHttpClient, CallOptions, CancellationToken, ClientConfig, Error,
    ErrorClassification, RequestSpec,
};

use support::{
    config_with_backoff, fast_config, refused, response, response_with_headers, ScriptedTransport,
};

#[derive(Debug, Deserialize)]
struct Memory {
    id: String,
    content: String,
}

fn client(transport: &Arc<ScriptedTransport>, config: ClientConfig) -> BlockingHttpClient {
    BlockingHttpClient::with_transport(config, transport.clone()).unwrap()
}

#[test]
fn test_server_errors_then_success() {
    let transport = ScriptedTransport::new();
    transport.push("/memories/mem_1", response(503, ""));
    transport.push("/memories/mem_1", response(504, ""));
    transport.push(
        "/memories/mem_1",
        response(200, r#"{"id": "mem_1", "content": "likes tea"}"#),
    );

    let client = client(&transport, fast_config(3));
    let memory: Memory = client.execute_json(RequestSpec::get("/memories/mem_1")).unwrap();

    assert_eq!(memory.id, "mem_1");
    assert_eq!(memory.content, "likes tea");
    assert_eq!(transport.calls(), 3);
}

#[test]
fn test_validation_error_is_single_call() {
    let transport = ScriptedTransport::new();
    transport.push(
        "/chat",
        response_with_headers(
            422,
            r#"{"detail": "question must not be empty"}"#,
            &[("X-Request-Id", "req-422")],
        ),
    );

    let client = client(&transport, fast_config(5));
    let err = client
        .execute_raw(RequestSpec::post("/chat").body(json!({"question": ""})))
        .unwrap_err();

    assert_eq!(err.classification(), Some(ErrorClassification::Validation));
    assert_eq!(err.request_id(), Some("req-422"));
    let http = err.as_http().unwrap();
    assert_eq!(http.message, "question must not be empty");
    assert_eq!(transport.calls(), 1);
}

#[test]
fn test_connection_refused_exhausts_budget() {
    let transport = ScriptedTransport::new();
    transport.push_times("/health", refused(), 10);

    let client = client(&transport, fast_config(2));
    let err = client.execute_raw(RequestSpec::get("/health")).unwrap_err();

    assert_eq!(err.classification(), Some(ErrorClassification::Connection));
    assert_eq!(transport.calls(), 3);
}

#[test]
fn test_timeouts_are_retried() {
    let transport = ScriptedTransport::new();
    transport.push_hang("/chat");
    transport.push("/chat", response(200, "{}"));

    let client = client(&transport, fast_config(1));
    client.execute_raw(RequestSpec::post("/chat")).unwrap();
    assert_eq!(transport.calls(), 2);
}

#[test]
fn test_retry_after_hint_is_slept() {
    let transport = ScriptedTransport::new();
    transport.push("/chat", response_with_headers(429, "", &[("Retry-After", "0.2")]));
    transport.push("/chat", response(200, "{}"));

    let backoff = BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(30));
    let client = client(&transport, config_with_backoff(2, backoff));

    let start = Instant::now();
    client.execute_raw(RequestSpec::post("/chat")).unwrap();
    let waited = start.elapsed();

    assert!(waited >= Duration::from_millis(200), "waited {:?}", waited);
    assert!(waited < Duration::from_secs(5), "waited {:?}", waited);
}

#[test]
fn test_decode_failure_is_unknown() {
    let transport = ScriptedTransport::new();
    transport.push("/memories/mem_1", response(200, "not json"));

    let client = client(&transport, fast_config(3));
    let err = client
        .execute_json::<Memory>(RequestSpec::get("/memories/mem_1"))
        .unwrap_err();

    assert_eq!(err.classification(), Some(ErrorClassification::Unknown));
    assert!(err.to_string().contains("Failed to decode response body"));
    assert_eq!(transport.calls(), 1);
}

#[test]
fn test_pre_cancelled_token_sends_nothing() {
    let transport = ScriptedTransport::new();
    transport.push("/health", response(200, "{}"));

    let client = client(&transport, fast_config(3));
    let token = CancellationToken::new();
    token.cancel();

    let err = client
        .execute_with(
            RequestSpec::get("/health"),
            CallOptions::new().with_cancellation(token),
            |body| Ok::<_, String>(body.to_vec()),
        )
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(transport.calls(), 0);
}

#[test]
fn test_cancellation_interrupts_backoff() {
    let transport = ScriptedTransport::new();
    transport.push("/chat", response_with_headers(429, "", &[("Retry-After", "60")]));
    transport.push("/chat", response(200, "{}"));

    let client = client(&transport, fast_config(3));
    let token = CancellationToken::new();
    let trigger = token.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        trigger.cancel();
    });

    let start = Instant::now();
    let err = client
        .execute_with(
            RequestSpec::post("/chat"),
            CallOptions::new().with_cancellation(token),
            |body| Ok::<_, String>(body.to_vec()),
        )
        .unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, Error::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(transport.calls(), 1);
}

/// Transport whose reply arrives after the caller has already cancelled
#[derive(Debug)]
struct CancelsMidFlight {
    token: CancellationToken,
    reply: Outcome,
}

impl BlockingTransport for CancelsMidFlight {
    fn send(&self, _request: PreparedRequest) -> Outcome {
        self.token.cancel();
        self.reply.clone()
    }
}

#[test]
fn test_cancellation_during_io_wins_over_reply() {
    for status in [200, 404, 503] {
        let token = CancellationToken::new();
        let transport = Arc::new(CancelsMidFlight {
            token: token.clone(),
            reply: response(status, "{}"),
        });
        let client = BlockingHttpClient::with_transport(fast_config(3), transport).unwrap();

        let result = client.execute_with(
            RequestSpec::get("/health"),
            CallOptions::new().with_cancellation(token),
            |body| Ok::<_, String>(body.to_vec()),
        );

        assert!(matches!(result, Err(Error::Cancelled)), "status {}", status);
    }
}

#[test]
fn test_closed_client_sends_nothing() {
    let transport = ScriptedTransport::new();
    let client = client(&transport, fast_config(3));
    client.close();

    let err = client.execute_raw(RequestSpec::get("/health")).unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(transport.calls(), 0);
}

#[test]
fn test_dev_user_header_is_sent() {
    let transport = ScriptedTransport::new();
    transport.push("/health", response(200, "{}"));

    let config = ClientConfig::builder()
        .base_url("http://yod.test")
        .user_id("dev-user-7")
        .build()
        .unwrap();
    let client = client(&transport, config);
    client.execute_raw(RequestSpec::get("/health")).unwrap();

    let request = &transport.requests()[0];
    assert_eq!(request.headers.get("x-user-id").unwrap(), "dev-user-7");
    assert!(request.headers.get("authorization").is_none());
    assert!(request.headers.get("content-type").is_none());
}
