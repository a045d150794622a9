//! Integration tests for chat and text completions

use super::*;
use inferra_client::{
    ChatOptions, ChatRequest, CompletionRequest, InferraError, Message, RateLimitScope,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_partial_json, header};

fn request(content: &str) -> ChatRequest {
    ChatRequest::builder()
        .model(MODEL)
        .system("You are terse.")
        .user(content)
        .temperature(0.5)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_chat_completion_success() {
    let server = MockServer::start().await;

    mock_with_auth("POST", "/chat/completions")
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(json!({
            "model": MODEL,
            "stream": false,
            "temperature": 0.5,
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "Hi"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("Hello")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let response = client.chat().create(request("Hi")).await.unwrap();

    assert_eq!(response.id, "chatcmpl-integration");
    assert_eq!(response.content(), Some("Hello"));
    assert_eq!(response.usage.total_tokens, 15);

    let metrics = client.metrics();
    assert_eq!(metrics.exchanges, 1);
    assert_eq!(metrics.by_endpoint.get("/chat/completions"), Some(&1));
}

#[tokio::test]
async fn test_authentication_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(error_response(401, "Invalid API key"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).chat().create(request("Hi")).await.unwrap_err();

    assert!(matches!(err, InferraError::Authentication { .. }));
    assert_eq!(err.status_code(), Some(401));
}

#[tokio::test]
async fn test_server_error_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(error_response(503, "overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("recovered")))
        .mount(&server)
        .await;

    let client = client(&server);
    let response = client.chat().create(request("Hi")).await.unwrap();

    assert_eq!(response.content(), Some("recovered"));
    assert_eq!(client.metrics().retries, 1);
}

#[tokio::test]
async fn test_retries_exhausted_surfaces_last_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(error_response(500, "boom"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server).chat().create(request("Hi")).await.unwrap_err();

    match err {
        InferraError::Server {
            message,
            status_code,
            body,
        } => {
            assert_eq!(message, "API request failed: boom");
            assert_eq!(status_code, Some(500));
            assert_eq!(body.unwrap()["error"]["message"], json!("boom"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_server_rate_limit_uses_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(error_response(429, "slow down").insert_header("Retry-After", "0.05"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server).chat().create(request("Hi")).await.unwrap_err();

    assert!(matches!(
        err,
        InferraError::RateLimit {
            scope: RateLimitScope::Server,
            ..
        }
    ));
    assert_eq!(err.retry_after(), Some(Duration::from_millis(50)));
}

#[tokio::test]
async fn test_validation_error_sends_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut bad = request("Hi");
    bad.model = "not-a-model".to_string();
    let err = client(&server).chat().create(bad).await.unwrap_err();

    assert!(matches!(err, InferraError::Validation { .. }));
    assert!(err.to_string().contains("Available models"));
}

#[tokio::test]
async fn test_create_many_runs_every_conversation() {
    let server = MockServer::start().await;

    mock_with_auth("POST", "/chat/completions")
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("ok")))
        .expect(3)
        .mount(&server)
        .await;

    let conversations = vec![
        vec![Message::user("one")],
        vec![Message::user("two")],
        vec![Message::user("three")],
    ];
    let results = client(&server)
        .chat()
        .create_many(MODEL, conversations, &ChatOptions::new().max_tokens(8))
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn test_text_completion() {
    let server = MockServer::start().await;

    mock_with_auth("POST", "/completions")
        .and(body_partial_json(json!({"prompt": "Once", "stop": "\n"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cmpl-1",
            "object": "text_completion",
            "created": 1,
            "model": MODEL,
            "choices": [{"index": 0, "text": " upon a time", "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 4, "total_tokens": 5}
        })))
        .mount(&server)
        .await;

    let completion = client(&server)
        .completions()
        .create(CompletionRequest::new(MODEL, "Once").stop("\n"))
        .await
        .unwrap();

    assert_eq!(completion.text(), Some(" upon a time"));
}
