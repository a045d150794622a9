//! HTTP transport implementation.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, ClientBuilder, RequestBuilder};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::instrument;

use super::{MultipartPart, MultipartRequest, StreamingResponse, TransportError};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET request.
    Get,
    /// POST request.
    Post,
    /// DELETE request.
    Delete,
}

impl HttpMethod {
    /// Returns the method name as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// HTTP request representation.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Request path, relative to the base URL.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Request timeout override.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Creates a request with the given method and path.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Creates a new GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// Creates a new POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// Creates a new DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Sets a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Appends a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP response representation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTP transport trait.
///
/// One call performs exactly one HTTP exchange. Implementations must be safe
/// for many concurrent exchanges.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send an HTTP request and read the whole body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Send an HTTP request and hand back the body as a byte stream.
    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError>;

    /// Send a multipart form request.
    async fn send_multipart(
        &self,
        request: MultipartRequest,
    ) -> Result<HttpResponse, TransportError>;

    /// Releases pooled connections. Safe to call repeatedly.
    async fn close(&self) {}
}

/// [`HttpTransport`] over a reqwest connection pool.
///
/// The pool is built on first use and dropped by [`HttpTransport::close`].
/// A request issued after `close` builds a fresh pool.
pub struct HttpTransportImpl {
    pool: Mutex<Option<Client>>,
    base_url: String,
    timeout: Duration,
}

impl HttpTransportImpl {
    /// Creates a transport for `base_url`. Nothing is connected yet.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into();
        Self {
            pool: Mutex::new(None),
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        }
    }

    /// Returns true while a connection pool is held.
    pub fn is_open(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Client>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pool(&self) -> Result<Client, TransportError> {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(pool) => Ok(pool.clone()),
            None => {
                let pool = ClientBuilder::new()
                    .timeout(self.timeout)
                    .pool_max_idle_per_host(10)
                    .tcp_keepalive(Duration::from_secs(60))
                    .build()
                    .map_err(|e| TransportError::Connection {
                        message: e.to_string(),
                    })?;
                tracing::debug!(base_url = %self.base_url, "Opened connection pool");
                Ok(slot.insert(pool).clone())
            }
        }
    }

    fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{path}", self.base_url)
    }

    /// Starts a request with the method, url, query and per-request timeout
    /// applied. Headers are left to the caller.
    fn start(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        timeout: Option<Duration>,
    ) -> Result<RequestBuilder, TransportError> {
        let pool = self.pool()?;
        let url = self.url(path);
        let mut builder = match method {
            HttpMethod::Get => pool.get(url),
            HttpMethod::Post => pool.post(url),
            HttpMethod::Delete => pool.delete(url),
        };
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }

    async fn exchange(
        &self,
        builder: RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, TransportError> {
        let limit = timeout.unwrap_or(self.timeout);
        builder.send().await.map_err(|e| transport_error(&e, limit))
    }

    async fn collect(
        &self,
        response: reqwest::Response,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, TransportError> {
        let limit = timeout.unwrap_or(self.timeout);
        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&e, limit))?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Maps a reqwest failure onto the transport taxonomy.
fn transport_error(error: &reqwest::Error, limit: Duration) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout { timeout: limit };
    }
    let message = error.to_string();
    if error.is_connect() {
        TransportError::Connection { message }
    } else {
        TransportError::InvalidResponse { message }
    }
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut map = HashMap::with_capacity(headers.len());
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.insert(name.as_str().to_owned(), value.to_owned());
        }
    }
    map
}

fn multipart_form(parts: Vec<MultipartPart>) -> Result<Form, TransportError> {
    parts.into_iter().try_fold(Form::new(), |form, part| match part {
        MultipartPart::Text { name, value } => Ok(form.text(name, value)),
        MultipartPart::File {
            name,
            filename,
            content_type,
            data,
        } => {
            let file = Part::bytes(data)
                .file_name(filename)
                .mime_str(&content_type)
                .map_err(|e| TransportError::InvalidResponse {
                    message: format!("invalid content type {content_type}: {e}"),
                })?;
            Ok(form.part(name, file))
        }
    })
}

#[async_trait]
impl HttpTransport for HttpTransportImpl {
    #[instrument(skip_all, fields(method = request.method.as_str(), path = %request.path))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            path,
            query,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self.start(method, &path, &query, timeout)?;
        for (name, value) in &headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = self.exchange(builder, timeout).await?;
        self.collect(response, timeout).await
    }

    #[instrument(skip_all, fields(method = request.method.as_str(), path = %request.path))]
    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let limit = request.timeout.unwrap_or(self.timeout);
        let mut builder = self.start(request.method, &request.path, &request.query, request.timeout)?;
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = self.exchange(builder, request.timeout).await?;
        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| transport_error(&e, limit)));

        Ok(StreamingResponse {
            status,
            headers,
            stream: Box::pin(stream),
        })
    }

    #[instrument(skip_all, fields(path = %request.path))]
    async fn send_multipart(
        &self,
        request: MultipartRequest,
    ) -> Result<HttpResponse, TransportError> {
        let form = multipart_form(request.parts)?;
        let mut builder = self.start(HttpMethod::Post, &request.path, &[], request.timeout)?;
        // reqwest writes the boundary into its own content type.
        for (name, value) in request
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type"))
        {
            builder = builder.header(name, value);
        }

        let response = self.exchange(builder.multipart(form), request.timeout).await?;
        self.collect(response, request.timeout).await
    }

    async fn close(&self) {
        if self.slot().take().is_some() {
            tracing::debug!(base_url = %self.base_url, "Closed connection pool");
        }
    }
}

impl fmt::Debug for HttpTransportImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransportImpl")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("open", &self.is_open())
            .finish()
    }
}
