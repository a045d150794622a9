//! HTTP transport layer for the Inferra client.
//!
//! Provides the raw HTTP exchange abstraction, the line-framed stream
//! decoder, and the request pipeline that classifies every exchange into a
//! [`TransportOutcome`].

mod http;
mod pipeline;
mod streaming;

pub use self::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, HttpTransportImpl};
pub use pipeline::{
    OutboundRequest, RequestBody, RequestPipeline, ResponseBody, TransportOutcome,
    DEFAULT_RETRY_AFTER,
};
pub use streaming::{
    ByteStream, EventStream, FrameStream, StreamingResponse, DONE_SENTINEL, MAX_FRAME_LEN,
};

use std::collections::HashMap;
use std::time::Duration;

/// Multipart request for file uploads.
#[derive(Debug, Clone)]
pub struct MultipartRequest {
    /// Request path.
    pub path: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Multipart form parts.
    pub parts: Vec<MultipartPart>,
    /// Request timeout.
    pub timeout: Option<Duration>,
}

/// A part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartPart {
    /// Text field.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// File field.
    File {
        /// Field name.
        name: String,
        /// File name.
        filename: String,
        /// Content type.
        content_type: String,
        /// File data.
        data: Vec<u8>,
    },
}

/// Transport-level failure: the exchange did not produce a usable response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connect or DNS failure.
    #[error("Connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// The exchange exceeded its timeout.
    #[error("Timeout after {timeout:?}")]
    Timeout {
        /// Timeout duration.
        timeout: Duration,
    },

    /// The response could not be read or was not what the caller expected.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },

    /// A streamed frame grew past the framing limit without a newline.
    #[error("Stream frame exceeds {limit} bytes")]
    FrameTooLong {
        /// Maximum frame length in bytes.
        limit: usize,
    },
}

/// Looks up a header by name, ignoring ASCII case.
pub(crate) fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
