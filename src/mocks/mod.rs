//! Mock implementations for testing.
//!
//! [`MockTransport`] replays queued responses in order and records every
//! request it sees, so services and the client can be exercised without a
//! network.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MultipartPart, MultipartRequest,
    StreamingResponse, TransportError,
};

/// A recorded request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Request path.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Multipart parts, for uploads.
    pub parts: Vec<MultipartPart>,
}

impl RecordedRequest {
    /// Parses the body as JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }

    /// Looks up a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A mock response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Body chunks, delivered one at a time on streaming calls.
    pub chunks: Vec<Vec<u8>>,
    /// Pause before each streamed chunk.
    pub chunk_delay: Option<Duration>,
    /// Transport failure raised after the chunks are delivered.
    pub stream_error: Option<TransportError>,
}

impl MockResponse {
    /// Creates a response with a status and a raw body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            chunks: vec![body.into()],
            chunk_delay: None,
            stream_error: None,
        }
    }

    /// Creates a successful JSON response.
    pub fn json<T: serde::Serialize>(value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::new(200, body).with_header("content-type", "application/json")
    }

    /// Creates an error response in the API's error envelope.
    pub fn error(status: u16, message: &str) -> Self {
        let error = serde_json::json!({
            "error": {
                "message": message,
                "type": "error"
            }
        });
        let body = serde_json::to_vec(&error).unwrap_or_default();
        Self::new(status, body).with_header("content-type", "application/json")
    }

    /// Creates a 200 streaming response delivered in the given chunks.
    pub fn stream<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            status: 200,
            headers: HashMap::from([(
                "content-type".to_string(),
                "text/event-stream".to_string(),
            )]),
            chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            chunk_delay: None,
            stream_error: None,
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Sleeps before each streamed chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Fails the stream after the last chunk.
    pub fn with_stream_error(mut self, error: TransportError) -> Self {
        self.stream_error = Some(error);
        self
    }

    fn body(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

type Queued = Result<MockResponse, TransportError>;

/// Mock HTTP transport for testing.
pub struct MockTransport {
    responses: Mutex<VecDeque<Queued>>,
    requests: Mutex<Vec<RecordedRequest>>,
    default_response: Mutex<Option<MockResponse>>,
    closed: Mutex<u32>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            default_response: Mutex::new(None),
            closed: Mutex::new(0),
        }
    }

    /// Queues a response.
    pub fn queue(&self, response: MockResponse) {
        lock(&self.responses).push_back(Ok(response));
    }

    /// Queues a JSON response.
    pub fn queue_json<T: serde::Serialize>(&self, value: &T) {
        self.queue(MockResponse::json(value));
    }

    /// Queues an error response.
    pub fn queue_error(&self, status: u16, message: &str) {
        self.queue(MockResponse::error(status, message));
    }

    /// Queues a transport failure: the exchange produces no response.
    pub fn queue_failure(&self, error: TransportError) {
        lock(&self.responses).push_back(Err(error));
    }

    /// Sets the response used once the queue is empty.
    pub fn set_default(&self, response: MockResponse) {
        *lock(&self.default_response) = Some(response);
    }

    /// Gets all recorded requests.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Gets the last recorded request.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        lock(&self.requests).last().cloned()
    }

    /// Returns the number of requests made.
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Returns how many times `close` was called.
    pub fn close_count(&self) -> u32 {
        *lock(&self.closed)
    }

    fn next_response(&self) -> Queued {
        if let Some(queued) = lock(&self.responses).pop_front() {
            return queued;
        }
        Ok(lock(&self.default_response)
            .clone()
            .unwrap_or_else(|| MockResponse::error(500, "No mock response configured")))
    }

    fn record(&self, request: RecordedRequest) {
        lock(&self.requests).push(request);
    }

    fn record_http(&self, request: &HttpRequest) {
        self.record(RecordedRequest {
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
            headers: request.headers.clone(),
            parts: Vec::new(),
        });
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.record_http(&request);

        let response = self.next_response()?;
        Ok(HttpResponse {
            status: response.status,
            body: response.body(),
            headers: response.headers,
        })
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        self.record_http(&request);

        let MockResponse {
            status,
            headers,
            chunks,
            chunk_delay,
            stream_error,
        } = self.next_response()?;

        let stream = async_stream::stream! {
            for chunk in chunks {
                if let Some(delay) = chunk_delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(Bytes::from(chunk));
            }
            if let Some(error) = stream_error {
                yield Err(error);
            }
        };

        Ok(StreamingResponse {
            status,
            headers,
            stream: Box::pin(stream),
        })
    }

    async fn send_multipart(
        &self,
        request: MultipartRequest,
    ) -> Result<HttpResponse, TransportError> {
        self.record(RecordedRequest {
            method: HttpMethod::Post,
            path: request.path,
            query: Vec::new(),
            body: None,
            headers: request.headers,
            parts: request.parts,
        });

        let response = self.next_response()?;
        Ok(HttpResponse {
            status: response.status,
            body: response.body(),
            headers: response.headers,
        })
    }

    async fn close(&self) {
        *lock(&self.closed) += 1;
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("request_count", &self.request_count())
            .finish()
    }
}

/// Test fixtures for common response bodies.
pub mod fixtures {
    use serde_json::{json, Value};

    /// Model used by fixtures.
    pub const MODEL: &str = "meta-llama/llama-3.1-8b-instruct/fp-8";

    /// A chat completion body.
    pub fn chat_completion(content: &str) -> Value {
        json!({
            "id": "chatcmpl-mock",
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

    /// One SSE frame carrying a chat chunk with a content delta.
    pub fn chat_chunk_frame(content: &str) -> String {
        let chunk = json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": MODEL,
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
        });
        format!("data: {chunk}\n\n")
    }

    /// A text completion body.
    pub fn completion(text: &str) -> Value {
        json!({
            "id": "cmpl-mock",
            "object": "text_completion",
            "created": 1_700_000_000,
            "model": MODEL,
            "choices": [{"index": 0, "text": text, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        })
    }

    /// A batch body with the given status.
    pub fn batch(id: &str, status: &str) -> Value {
        json!({
            "id": id,
            "object": "batch",
            "status": status,
            "input_file_id": "file-input",
            "completion_window": "24h",
            "created_at": 1_700_000_000,
            "request_counts": {"total": 2, "completed": 0, "failed": 0}
        })
    }

    /// A stored file body.
    pub fn file_object(id: &str) -> Value {
        json!({
            "id": id,
            "object": "file",
            "purpose": "batch",
            "filename": "batch.jsonl",
            "size": 128,
            "created_at": 1_700_000_000,
            "status": "processed"
        })
    }
}
