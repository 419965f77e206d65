//! HTTP provider against a mock OpenAI-compatible server.

use std::net::TcpListener;
use std::time::Duration;

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use coordination::retry::complete_with_retry;
use coordination::{
    CallPurpose, ChatMessage, CompletionProvider, CompletionRequest, ProviderErrorKind,
    RetryPolicy,
};
use roundtable::config::ProviderSettings;
use roundtable::provider::{check_endpoint, OpenAiCompatProvider};

fn provider(server: &MockServer) -> OpenAiCompatProvider {
    provider_at(&server.uri())
}

fn provider_at(uri: &str) -> OpenAiCompatProvider {
    let settings = ProviderSettings {
        base_url: format!("{uri}/v1"),
        model: "test-model".into(),
        ..ProviderSettings::default()
    };
    OpenAiCompatProvider::new(&settings, "test-key").unwrap()
}

/// Address of a local port with nothing listening on it.
fn closed_port_uri() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

fn request() -> CompletionRequest {
    CompletionRequest::new(CallPurpose::Proposal, "You are the Visionary.", 0.9)
        .push(ChatMessage::user("Should I launch the product line?"))
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn test_successful_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "messages": [
                { "role": "system", "content": "You are the Visionary." },
                { "role": "user", "content": "Should I launch the product line?" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Launch it now.")))
        .expect(1)
        .mount(&server)
        .await;

    let text = provider(&server).complete(&request()).await.unwrap();
    assert_eq!(text, "Launch it now.");
}

#[tokio::test]
async fn test_empty_choices_is_empty_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let text = provider(&server).complete(&request()).await.unwrap();
    assert_eq!(text, "");
}

#[tokio::test]
async fn test_status_codes_map_to_kinds() {
    let cases = [
        (429, ProviderErrorKind::RateLimited),
        (503, ProviderErrorKind::Unavailable),
        (401, ProviderErrorKind::Auth),
        (400, ProviderErrorKind::Malformed),
        (418, ProviderErrorKind::Other),
    ];
    for (status, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = provider(&server).complete(&request()).await.unwrap_err();
        assert_eq!(err.kind, expected, "HTTP {status}");
        assert!(err.message.contains("nope"), "{}", err.message);
    }
}

#[tokio::test]
async fn test_garbage_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&request()).await.unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Malformed);
}

#[tokio::test]
async fn test_unreachable_server_is_unavailable() {
    let p = provider_at(&closed_port_uri());

    let err = p.complete(&request()).await.unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Unavailable);
}

#[tokio::test]
async fn test_retry_recovers_from_overload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Third time lucky.")))
        .mount(&server)
        .await;

    let policy = RetryPolicy::new()
        .with_min_wait(Duration::from_millis(5))
        .with_max_wait(Duration::from_millis(20))
        .with_jitter(false);
    let p = provider(&server);
    let text = complete_with_retry(&p, &policy, &request()).await.unwrap();
    assert_eq!(text, "Third time lucky.");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_auth_failure_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let policy = RetryPolicy::new().with_min_wait(Duration::from_millis(5));
    let p = provider(&server);
    let err = complete_with_retry(&p, &policy, &request()).await.unwrap_err();
    assert_eq!(err.attempts, 1);
    assert_eq!(err.last_error.kind, ProviderErrorKind::Auth);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_check_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    assert!(check_endpoint(&format!("{}/v1", server.uri()), "k").await);
    assert!(!check_endpoint(&format!("{}/nowhere", server.uri()), "k").await);
}
