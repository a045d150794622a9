//! Integration tests for server-sent event streams

use super::*;
use futures::{StreamExt, TryStreamExt};
use inferra_client::{
    ChatCompletion, ChatCompletionChunk, ChatRequest, CompletionChunk, CompletionRequest,
    InferraError,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_partial_json, header};

fn chunk_frame(content: &str, finish: Option<&str>) -> String {
    let chunk = json!({
        "id": "chatcmpl-stream",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": MODEL,
        "choices": [{
            "index": 0,
            "delta": {"content": content},
            "finish_reason": finish
        }]
    });
    format!("data: {chunk}\n\n")
}

fn sse(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn chat_request() -> ChatRequest {
    ChatRequest::builder()
        .model(MODEL)
        .user("Count to three")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_chat_stream_yields_chunks_in_order() {
    let server = MockServer::start().await;

    let body = [
        ": keep-alive\n\n".to_string(),
        chunk_frame("one ", None),
        chunk_frame("two ", None),
        chunk_frame("three", Some("stop")),
        "data: [DONE]\n\n".to_string(),
    ]
    .concat();

    mock_with_auth("POST", "/chat/completions")
        .and(header("Accept", "text/event-stream"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(sse(body))
        .expect(1)
        .mount(&server)
        .await;

    let chunks: Vec<ChatCompletionChunk> = client(&server)
        .chat()
        .create_stream(chat_request())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let text: String = chunks.iter().map(|c| c.content()).collect();
    assert_eq!(text, "one two three");

    let assembled = ChatCompletion::from_chunks(&chunks).unwrap();
    assert_eq!(assembled.content(), Some("one two three"));
}

#[tokio::test]
async fn test_stream_ends_without_sentinel() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse(chunk_frame("only", Some("stop"))))
        .mount(&server)
        .await;

    let mut stream = client(&server)
        .chat()
        .create_stream(chat_request())
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap().content(), "only");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_invalid_frame_terminates_stream() {
    let server = MockServer::start().await;

    let body = [
        chunk_frame("good", None),
        "data: {broken\n\n".to_string(),
        chunk_frame("never", None),
    ]
    .concat();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let mut stream = client(&server)
        .chat()
        .create_stream(chat_request())
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap().content(), "good");
    assert!(matches!(
        stream.next().await,
        Some(Err(InferraError::Decode { .. }))
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_error_status_before_stream_starts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/completions"))
        .respond_with(error_response(400, "prompt too long"))
        .mount(&server)
        .await;

    let err = builder(&server)
        .retry_config(inferra_client::RetryConfig::no_retries())
        .build()
        .unwrap()
        .completions()
        .create_stream(CompletionRequest::new(MODEL, "Hi"))
        .await
        .unwrap_err();

    assert!(matches!(err, InferraError::Server { .. }));
    assert_eq!(err.status_code(), Some(400));
    assert_eq!(err.to_string(), "API request failed: prompt too long");
}

#[tokio::test]
async fn test_completion_stream() {
    let server = MockServer::start().await;

    let frame = |text: &str| {
        let chunk = json!({
            "id": "cmpl-stream",
            "object": "text_completion",
            "created": 1,
            "model": MODEL,
            "choices": [{"index": 0, "text": text, "finish_reason": null}]
        });
        format!("data: {chunk}\n\n")
    };
    let body = [frame("Once"), frame(" upon"), "data: [DONE]\n\n".to_string()].concat();

    mock_with_auth("POST", "/completions")
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let chunks: Vec<CompletionChunk> = client(&server)
        .completions()
        .create_stream(CompletionRequest::new(MODEL, "Tell me"))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let text: String = chunks.iter().map(|c| c.text()).collect();
    assert_eq!(text, "Once upon");
}
