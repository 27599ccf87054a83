//! HTTP-level tests for the OpenAI-compatible client.
//!
//! Uses wiremock to stand in for the chat-completion endpoint and checks the
//! request shape, status classification and SSE streaming.

#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use std::sync::Arc;
use std::time::Duration;

use crucible_core::{CallDefaults, CallOptions, ChatMessage, FailureKind, ModelCallRequest};
use crucible_providers::{
    ChatBackend as _, ConcurrencyGate, ModelCallOutcome, ModelGateway, OpenAiCompatibleClient,
};
use futures::StreamExt as _;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, timeout: Duration) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(&format!("{}/v1", server.uri()), "test-key", timeout)
        .expect("failed to create client")
}

fn request(streaming: bool) -> ModelCallRequest {
    let options = CallOptions {
        streaming,
        ..CallOptions::default()
    };
    ModelCallRequest::resolve(
        "meta/test-model",
        vec![ChatMessage::user("Say hello")],
        options,
        CallDefaults::default(),
    )
}

#[tokio::test]
async fn test_completion_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "meta/test-model",
            "max_tokens": 2048,
            "stream": false,
            "messages": [{"role": "user", "content": "Say hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let text = client.complete(&request(false)).await.unwrap();
    assert_eq!(text, "Hello!");
}

#[tokio::test]
async fn test_status_classification() {
    let cases = [
        (401, FailureKind::AuthenticationError),
        (403, FailureKind::AuthenticationError),
        (429, FailureKind::RateLimited),
        (500, FailureKind::GenericApiError),
        (404, FailureKind::GenericApiError),
    ];

    for (status, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let failure = client.complete(&request(false)).await.unwrap_err();
        assert_eq!(failure.kind, expected, "status {status}");
        assert!(failure.detail.contains("nope"));
    }
}

#[tokio::test]
async fn test_undecodable_body_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let failure = client.complete(&request(false)).await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::Unexpected);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": "late"}}]}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_millis(50));
    let failure = client.complete(&request(false)).await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_connection_error() {
    let client =
        OpenAiCompatibleClient::new("http://127.0.0.1:9/v1", "test-key", Duration::from_secs(2))
            .unwrap();
    let failure = client.complete(&request(false)).await.unwrap_err();
    assert!(
        matches!(
            failure.kind,
            FailureKind::ConnectionError | FailureKind::Timeout
        ),
        "unexpected kind {:?}",
        failure.kind
    );
}

#[tokio::test]
async fn test_streaming_through_gateway() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = ModelGateway::new(
        Arc::new(client_for(&server, Duration::from_secs(5))),
        ConcurrencyGate::new(1),
        CallDefaults::default(),
    );

    let outcome = gateway
        .stream(
            "meta/test-model",
            vec![ChatMessage::user("Say hello")],
            CallOptions::default(),
        )
        .await;
    let stream = match outcome {
        ModelCallOutcome::Stream(stream) => stream,
        other => panic!("expected a stream, got {other:?}"),
    };
    let chunks: Vec<String> = stream.collect().await;
    assert_eq!(chunks, vec!["Hel".to_owned(), "lo".to_owned()]);
    assert_eq!(gateway.gate().in_flight(), 0);
}

#[tokio::test]
async fn test_stream_open_failure_yields_empty_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let gateway = ModelGateway::new(
        Arc::new(client_for(&server, Duration::from_secs(5))),
        ConcurrencyGate::new(1),
        CallDefaults::default(),
    );
    let text = gateway
        .stream("m", vec![ChatMessage::user("x")], CallOptions::default())
        .await
        .into_text()
        .await
        .unwrap();
    assert!(text.is_empty());
    assert_eq!(gateway.gate().in_flight(), 0);
}
