//! Integration tests using WireMock
//!
//! These tests drive the real reqwest transport against a mock HTTP server
//! and cover the full request/response cycle: serialization, authentication,
//! status classification, retries and stream decoding.

mod batch;
mod chat;
mod files;
mod streaming;
mod transport;

use inferra_client::{InferraClient, InferraClientBuilder, RetryConfig};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "test-api-key";
pub const MODEL: &str = "meta-llama/llama-3.1-8b-instruct/fp-8";

/// Builder pointed at the mock server, with short retry delays.
pub fn builder(server: &MockServer) -> InferraClientBuilder {
    InferraClient::builder()
        .api_key(API_KEY)
        .base_url(server.uri())
        .timeout(Duration::from_secs(5))
        .retry_config(
            RetryConfig::new()
                .max_retries(2)
                .initial_delay(Duration::from_millis(10)),
        )
}

/// Client pointed at the mock server.
pub fn client(server: &MockServer) -> InferraClient {
    builder(server).build().unwrap()
}

/// Mock matching method, path and the bearer credential.
pub fn mock_with_auth(method_matcher: &str, path_matcher: &str) -> wiremock::MockBuilder {
    Mock::given(method(method_matcher))
        .and(path(path_matcher))
        .and(header("Authorization", format!("Bearer {API_KEY}").as_str()))
}

/// Error envelope in the API's format.
pub fn error_response(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": {"message": message, "type": "error"}
    }))
}

pub fn chat_completion_body(content: &str) -> Value {
    json!({
        "id": "chatcmpl-integration",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": MODEL,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

pub fn batch_body(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "object": "batch",
        "status": status,
        "input_file_id": "file-input",
        "completion_window": "24h",
        "created_at": 1_700_000_000,
        "request_counts": {"total": 2, "completed": 1, "failed": 0}
    })
}

pub fn file_body(id: &str) -> Value {
    json!({
        "id": id,
        "object": "file",
        "purpose": "batch",
        "filename": "batch.jsonl",
        "size": 64,
        "created_at": 1_700_000_000,
        "status": "processed"
    })
}
