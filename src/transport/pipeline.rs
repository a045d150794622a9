//! Request pipeline shared by every API surface.
//!
//! [`RequestPipeline::send`] performs exactly one HTTP exchange and
//! classifies it into a [`TransportOutcome`]. It never retries; the retry
//! policy is layered around it by the services.

use futures::TryStreamExt;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

use super::{
    header_value, ByteStream, HttpMethod, HttpRequest, HttpTransport, MultipartPart,
    MultipartRequest, TransportError,
};
use crate::auth::AuthProvider;
use crate::errors::{ApiErrorResponse, ErrorKind, InferraError, InferraResult, RateLimitScope};
use crate::observability::{redact, MetricsCollector};

/// Wait hint used when a 429 carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("inferra-client/", env!("CARGO_PKG_VERSION"));

/// Body of an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// JSON document.
    Json(Value),
    /// Multipart form, used for file uploads.
    Multipart(Vec<MultipartPart>),
}

/// Immutable description of one API call.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Path relative to the base URL.
    pub path: String,
    /// Label the exchange is counted under in metrics. Defaults to the path;
    /// requests addressing one resource use a template such as `/files/{id}`.
    pub endpoint: String,
    /// Request body.
    pub body: RequestBody,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Whether the response body should be handed back as a byte stream.
    pub stream: bool,
}

impl OutboundRequest {
    /// Creates a request with the given method and path.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method,
            endpoint: path.clone(),
            path,
            body: RequestBody::Empty,
            query: Vec::new(),
            stream: false,
        }
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// Creates a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Sets the metrics label.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Sets a multipart body.
    pub fn multipart(mut self, parts: Vec<MultipartPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    /// Appends a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Requests the raw byte stream instead of a parsed body.
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Successful response payload.
pub enum ResponseBody {
    /// Fully read JSON document. An empty body is `Value::Null`.
    Json(Value),
    /// Raw, undecoded body chunks.
    Stream(ByteStream),
}

impl ResponseBody {
    /// Returns the JSON payload, or an error if the body is a stream.
    pub fn into_json(self) -> InferraResult<Value> {
        match self {
            ResponseBody::Json(value) => Ok(value),
            ResponseBody::Stream(_) => Err(InferraError::decode(
                "expected a JSON body but received a stream",
            )),
        }
    }

    /// Deserializes the JSON payload into `T`.
    pub fn parse<T: DeserializeOwned>(self) -> InferraResult<T> {
        Ok(serde_json::from_value(self.into_json()?)?)
    }

    /// Returns the byte stream, or an error if the body was fully read.
    pub fn into_stream(self) -> InferraResult<ByteStream> {
        match self {
            ResponseBody::Stream(stream) => Ok(stream),
            ResponseBody::Json(_) => Err(InferraError::decode(
                "expected a stream but received a JSON body",
            )),
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Json(value) => f.debug_tuple("Json").field(value).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Classified result of one HTTP exchange.
#[derive(Debug)]
pub enum TransportOutcome {
    /// 2xx response.
    Success(ResponseBody),
    /// HTTP 401.
    AuthFailure,
    /// HTTP 429 with the server's wait hint.
    RateLimited {
        /// Parsed `Retry-After`.
        retry_after: Option<Duration>,
    },
    /// Any other non-2xx status.
    ServerError {
        /// HTTP status code.
        status_code: u16,
        /// Message built from the error body.
        message: String,
        /// Parsed error body, when it was JSON.
        body: Option<Value>,
    },
    /// The exchange itself failed.
    TransportFailure {
        /// Underlying cause.
        cause: TransportError,
    },
}

impl TransportOutcome {
    /// Returns true for [`TransportOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, TransportOutcome::Success(_))
    }

    /// Returns the error kind this outcome maps to, if it is a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            TransportOutcome::Success(_) => None,
            TransportOutcome::AuthFailure => Some(ErrorKind::Authentication),
            TransportOutcome::RateLimited { .. } => Some(ErrorKind::RateLimit),
            TransportOutcome::ServerError { .. } => Some(ErrorKind::Server),
            TransportOutcome::TransportFailure { .. } => Some(ErrorKind::Transport),
        }
    }

    /// Converts the outcome into the client's error taxonomy.
    pub fn into_result(self) -> InferraResult<ResponseBody> {
        match self {
            TransportOutcome::Success(body) => Ok(body),
            TransportOutcome::AuthFailure => Err(InferraError::Authentication {
                message: "Invalid API key".to_string(),
            }),
            TransportOutcome::RateLimited { retry_after } => Err(InferraError::RateLimit {
                message: "Rate limit exceeded".to_string(),
                retry_after,
                scope: RateLimitScope::Server,
            }),
            TransportOutcome::ServerError {
                status_code,
                message,
                body,
            } => Err(InferraError::Server {
                message,
                status_code: Some(status_code),
                body,
            }),
            TransportOutcome::TransportFailure { cause } => Err(InferraError::transport(cause)),
        }
    }
}

/// Parses a `Retry-After` value in seconds, falling back to
/// [`DEFAULT_RETRY_AFTER`].
pub(crate) fn parse_retry_after(value: Option<&str>) -> Duration {
    let Some(raw) = value else {
        return DEFAULT_RETRY_AFTER;
    };

    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or_else(|| {
            tracing::warn!(retry_after = raw, "Unparsable Retry-After header, using default");
            DEFAULT_RETRY_AFTER
        })
}

/// Maps a fully read response to an outcome.
pub(crate) fn classify(status: u16, headers: &HashMap<String, String>, body: &[u8]) -> TransportOutcome {
    if status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
        return TransportOutcome::RateLimited {
            retry_after: Some(parse_retry_after(header_value(headers, "retry-after"))),
        };
    }

    if status == StatusCode::UNAUTHORIZED.as_u16() {
        return TransportOutcome::AuthFailure;
    }

    if !(200..300).contains(&status) {
        let detail = serde_json::from_slice::<ApiErrorResponse>(body)
            .ok()
            .and_then(|response| response.error.message)
            .unwrap_or_else(|| "Unknown error".to_string());
        return TransportOutcome::ServerError {
            status_code: status,
            message: format!("API request failed: {detail}"),
            body: serde_json::from_slice(body).ok(),
        };
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return TransportOutcome::Success(ResponseBody::Json(Value::Null));
    }

    match serde_json::from_slice(body) {
        Ok(value) => TransportOutcome::Success(ResponseBody::Json(value)),
        Err(e) => TransportOutcome::TransportFailure {
            cause: TransportError::InvalidResponse {
                message: format!("invalid JSON response body: {e}"),
            },
        },
    }
}

/// Outbound request pipeline.
///
/// Owns the transport (and through it the connection pool), applies
/// credentials and default headers, and records every exchange.
pub struct RequestPipeline {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthProvider>,
    default_headers: HashMap<String, String>,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl RequestPipeline {
    /// Creates a new pipeline.
    pub fn new(transport: Arc<dyn HttpTransport>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            transport,
            auth,
            default_headers: HashMap::new(),
            metrics: None,
        }
    }

    /// Adds headers sent with every request.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.default_headers.extend(headers);
        self
    }

    /// Records every exchange in the given collector.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Performs one HTTP exchange and classifies it.
    #[instrument(
        skip(self, request),
        fields(method = request.method.as_str(), path = %request.path, stream = request.stream)
    )]
    pub async fn send(&self, request: &OutboundRequest) -> TransportOutcome {
        let started = Instant::now();
        let outcome = self.dispatch(request).await;
        self.record(request, &outcome, started.elapsed());
        outcome
    }

    /// Performs one exchange and converts the outcome into a result.
    pub async fn execute(&self, request: &OutboundRequest) -> InferraResult<ResponseBody> {
        self.send(request).await.into_result()
    }

    /// Releases the connection pool. Safe to call repeatedly.
    pub async fn close(&self) {
        self.transport.close().await;
    }

    fn headers(&self, request: &OutboundRequest) -> HashMap<String, String> {
        let mut headers = self.default_headers.clone();
        headers.insert("User-Agent".to_string(), USER_AGENT.to_string());
        self.auth.authorize(&mut headers);

        if matches!(request.body, RequestBody::Json(_)) {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        let accept = match (request.stream, &request.body) {
            (true, RequestBody::Json(_)) => "text/event-stream",
            (true, _) => "*/*",
            (false, _) => "application/json",
        };
        headers.insert("Accept".to_string(), accept.to_string());
        headers
    }

    fn http_request(
        &self,
        request: &OutboundRequest,
        headers: HashMap<String, String>,
    ) -> Result<HttpRequest, TransportError> {
        let body = match &request.body {
            RequestBody::Json(value) => {
                let encoded = serde_json::to_vec(value).map_err(|e| TransportError::InvalidResponse {
                    message: format!("failed to encode request body: {e}"),
                })?;
                tracing::trace!(body = %redact(&String::from_utf8_lossy(&encoded)), "Request body");
                Some(encoded)
            }
            RequestBody::Empty | RequestBody::Multipart(_) => None,
        };

        Ok(HttpRequest {
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            headers,
            body,
            timeout: None,
        })
    }

    async fn dispatch(&self, request: &OutboundRequest) -> TransportOutcome {
        let headers = self.headers(request);

        if let RequestBody::Multipart(parts) = &request.body {
            let multipart = MultipartRequest {
                path: request.path.clone(),
                headers,
                parts: parts.clone(),
                timeout: None,
            };
            return match self.transport.send_multipart(multipart).await {
                Ok(response) => classify(response.status, &response.headers, &response.body),
                Err(cause) => TransportOutcome::TransportFailure { cause },
            };
        }

        let http_request = match self.http_request(request, headers) {
            Ok(http_request) => http_request,
            Err(cause) => return TransportOutcome::TransportFailure { cause },
        };

        if !request.stream {
            return match self.transport.send(http_request).await {
                Ok(response) => classify(response.status, &response.headers, &response.body),
                Err(cause) => TransportOutcome::TransportFailure { cause },
            };
        }

        let response = match self.transport.send_streaming(http_request).await {
            Ok(response) => response,
            Err(cause) => return TransportOutcome::TransportFailure { cause },
        };

        if (200..300).contains(&response.status) {
            return TransportOutcome::Success(ResponseBody::Stream(response.stream));
        }

        // Error statuses are classified from the full body, like any other call.
        let status = response.status;
        let headers = response.headers;
        match response
            .stream
            .try_fold(Vec::new(), |mut body, chunk| async move {
                body.extend_from_slice(&chunk);
                Ok::<_, TransportError>(body)
            })
            .await
        {
            Ok(body) => classify(status, &headers, &body),
            Err(cause) => TransportOutcome::TransportFailure { cause },
        }
    }

    fn record(&self, request: &OutboundRequest, outcome: &TransportOutcome, elapsed: Duration) {
        match outcome {
            TransportOutcome::Success(_) => {
                tracing::debug!(latency_ms = elapsed.as_millis(), "Request succeeded");
            }
            TransportOutcome::RateLimited { retry_after } => {
                tracing::warn!(
                    retry_after_ms = retry_after.map(|d| d.as_millis()),
                    "Server rate limit reached"
                );
            }
            TransportOutcome::ServerError {
                status_code,
                message,
                ..
            } => {
                tracing::warn!(status = status_code, error = %message, "Request failed");
            }
            TransportOutcome::AuthFailure => tracing::warn!(status = 401, "Authentication failed"),
            TransportOutcome::TransportFailure { cause } => {
                tracing::warn!(error = %cause, "Transport failure");
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_exchange(&request.endpoint, outcome.error_kind(), elapsed);
        }
    }
}

impl fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("default_headers", &self.default_headers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiKeyAuth;
    use crate::mocks::{MockResponse, MockTransport};
    use crate::observability::DefaultMetricsCollector;
    use futures::StreamExt;
    use serde_json::json;

    fn pipeline(transport: Arc<MockTransport>) -> RequestPipeline {
        RequestPipeline::new(transport, Arc::new(ApiKeyAuth::from_key("test-key")))
    }

    fn no_headers() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_classify_429_reads_retry_after() {
        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "2".to_string());

        match classify(429, &headers, b"") {
            TransportOutcome::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(2)));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_classify_429_defaults_to_sixty_seconds() {
        match classify(429, &no_headers(), b"") {
            TransportOutcome::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(DEFAULT_RETRY_AFTER));
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        assert_eq!(parse_retry_after(Some("soon")), DEFAULT_RETRY_AFTER);
        assert_eq!(parse_retry_after(Some("-1")), DEFAULT_RETRY_AFTER);
        assert_eq!(parse_retry_after(Some(" 1.5 ")), Duration::from_millis(1500));
    }

    #[test]
    fn test_classify_401_is_auth_failure() {
        assert!(matches!(
            classify(401, &no_headers(), br#"{"error":{"message":"bad key"}}"#),
            TransportOutcome::AuthFailure
        ));
    }

    #[test]
    fn test_classify_server_error_uses_body_message() {
        match classify(503, &no_headers(), br#"{"error":{"message":"overloaded"}}"#) {
            TransportOutcome::ServerError {
                status_code,
                message,
                body,
            } => {
                assert_eq!(status_code, 503);
                assert_eq!(message, "API request failed: overloaded");
                assert_eq!(body, Some(json!({"error": {"message": "overloaded"}})));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_classify_server_error_without_json_body() {
        match classify(500, &no_headers(), b"<html>oops</html>") {
            TransportOutcome::ServerError { message, body, .. } => {
                assert_eq!(message, "API request failed: Unknown error");
                assert!(body.is_none());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_classify_success_bodies() {
        match classify(200, &no_headers(), br#"{"id":"x"}"#) {
            TransportOutcome::Success(ResponseBody::Json(value)) => assert_eq!(value, json!({"id": "x"})),
            other => panic!("unexpected outcome {other:?}"),
        }

        match classify(204, &no_headers(), b"") {
            TransportOutcome::Success(ResponseBody::Json(value)) => assert!(value.is_null()),
            other => panic!("unexpected outcome {other:?}"),
        }

        assert!(matches!(
            classify(200, &no_headers(), b"not json"),
            TransportOutcome::TransportFailure { .. }
        ));
    }

    #[test]
    fn test_outcome_into_result_maps_taxonomy() {
        let err = TransportOutcome::AuthFailure.into_result().unwrap_err();
        assert!(matches!(err, InferraError::Authentication { .. }));
        assert_eq!(err.to_string(), "Authentication failed: Invalid API key");

        let err = TransportOutcome::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        }
        .into_result()
        .unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(err.status_code(), Some(429));

        let err = TransportOutcome::TransportFailure {
            cause: TransportError::Connection {
                message: "refused".to_string(),
            },
        }
        .into_result()
        .unwrap_err();
        assert_eq!(err.to_string(), "Request failed: Connection error: refused");
    }

    #[tokio::test]
    async fn test_send_applies_auth_and_json_body() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_json(&json!({"ok": true}));
        let pipeline = pipeline(Arc::clone(&transport));

        let outcome = pipeline
            .send(&OutboundRequest::post("/chat/completions").json(json!({"model": "m"})))
            .await;
        assert!(outcome.is_success());

        let recorded = transport.last_request().unwrap();
        assert_eq!(recorded.method, HttpMethod::Post);
        assert_eq!(recorded.path, "/chat/completions");
        assert_eq!(
            recorded.headers.get("Authorization"),
            Some(&"Bearer test-key".to_string())
        );
        assert_eq!(
            recorded.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
        let body: Value = serde_json::from_slice(&recorded.body.unwrap()).unwrap();
        assert_eq!(body, json!({"model": "m"}));
    }

    #[tokio::test]
    async fn test_send_streaming_returns_raw_stream() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::stream(["data: {\"a\":1}\n", "data: [DONE]\n"]));
        let pipeline = pipeline(Arc::clone(&transport));

        let outcome = pipeline
            .send(
                &OutboundRequest::post("/completions")
                    .json(json!({"prompt": "Hi"}))
                    .streaming(true),
            )
            .await;

        let mut stream = outcome.into_result().unwrap().into_stream().unwrap();
        let mut raw = Vec::new();
        while let Some(chunk) = stream.next().await {
            raw.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(raw, b"data: {\"a\":1}\ndata: [DONE]\n");
        assert_eq!(
            transport.last_request().unwrap().headers.get("Accept"),
            Some(&"text/event-stream".to_string())
        );
    }

    #[tokio::test]
    async fn test_send_streaming_error_status_is_classified() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_error(500, "model crashed");
        let pipeline = pipeline(transport);

        let outcome = pipeline
            .send(&OutboundRequest::post("/chat/completions").streaming(true))
            .await;

        match outcome {
            TransportOutcome::ServerError { message, .. } => {
                assert_eq!(message, "API request failed: model crashed");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_transport_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_failure(TransportError::Timeout {
            timeout: Duration::from_secs(60),
        });
        let pipeline = pipeline(transport);

        let outcome = pipeline.send(&OutboundRequest::get("/files")).await;
        assert!(matches!(
            outcome,
            TransportOutcome::TransportFailure {
                cause: TransportError::Timeout { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_send_records_metrics() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_json(&json!({}));
        transport.queue_error(401, "nope");
        let metrics = Arc::new(DefaultMetricsCollector::new());
        let pipeline = pipeline(transport).with_metrics(metrics.clone());

        pipeline.send(&OutboundRequest::get("/batch")).await;
        pipeline.send(&OutboundRequest::get("/batch")).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.exchanges, 2);
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.failures_of(ErrorKind::Authentication), 1);
    }

    #[tokio::test]
    async fn test_metrics_are_keyed_by_endpoint_label() {
        let transport = Arc::new(MockTransport::new());
        transport.set_default(MockResponse::json(&json!({})));
        let metrics = Arc::new(DefaultMetricsCollector::new());
        let pipeline = pipeline(Arc::clone(&transport)).with_metrics(metrics.clone());

        for id in ["file-1", "file-2", "file-3"] {
            let request = OutboundRequest::get(format!("/files/{id}")).endpoint("/files/{id}");
            pipeline.send(&request).await;
        }
        pipeline.send(&OutboundRequest::get("/files")).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.by_endpoint.len(), 2);
        assert_eq!(snapshot.by_endpoint.get("/files/{id}"), Some(&3));
        assert_eq!(snapshot.by_endpoint.get("/files"), Some(&1));
        assert_eq!(transport.requests()[2].path, "/files/file-3");
    }
}
