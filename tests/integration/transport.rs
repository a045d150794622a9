//! Integration tests for the HTTP transport and client lifecycle

use super::*;
use inferra_client::errors::InferraError;
use inferra_client::transport::TransportError;
use inferra_client::{ChatRequest, ErrorKind, RetryConfig};
use pretty_assertions::assert_eq;
use wiremock::matchers::header;

fn chat_request() -> ChatRequest {
    ChatRequest::builder()
        .model(MODEL)
        .user("ping")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_completion_body("late"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = builder(&server)
        .timeout(Duration::from_millis(100))
        .retry_config(RetryConfig::no_retries())
        .build()
        .unwrap();

    let err = client.chat().create(chat_request()).await.unwrap_err();

    match err {
        InferraError::Transport { message, cause } => {
            assert!(message.starts_with("Request failed"));
            assert!(matches!(cause, Some(TransportError::Timeout { .. })));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_refused() {
    let client = InferraClient::builder()
        .api_key(API_KEY)
        .base_url("http://127.0.0.1:1")
        .retry_config(RetryConfig::no_retries())
        .build()
        .unwrap();

    let err = client.chat().create(chat_request()).await.unwrap_err();

    assert!(matches!(err, InferraError::Transport { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_custom_headers_and_user_agent() {
    let server = MockServer::start().await;

    mock_with_auth("POST", "/chat/completions")
        .and(header("X-Request-Source", "integration"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let client = builder(&server)
        .header("X-Request-Source", "integration")
        .build()
        .unwrap();

    client.chat().create(chat_request()).await.unwrap();

    let received = server.received_requests().await.unwrap();
    let user_agent = received[0]
        .headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(user_agent.starts_with("inferra-client/"));
}

#[tokio::test]
async fn test_close_is_idempotent_and_reopens() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("ok")))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);

    client.close().await;
    client.chat().create(chat_request()).await.unwrap();
    client.close().await;
    client.close().await;

    let response = client.chat().create(chat_request()).await.unwrap();
    assert_eq!(response.content(), Some("ok"));
}

#[tokio::test]
async fn test_rate_limit_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(error_response(429, "slow down").insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("ok")))
        .mount(&server)
        .await;

    let client = client(&server);
    let response = client.chat().create(chat_request()).await.unwrap();

    assert_eq!(response.content(), Some("ok"));
    let metrics = client.metrics();
    assert_eq!(metrics.retries, 1);
    assert_eq!(metrics.failures_of(ErrorKind::RateLimit), 1);
}
