//! Error types for the Inferra client.
//!
//! Every failure the client can surface is an [`InferraError`]. The retry
//! layer dispatches on [`ErrorKind`] rather than on concrete variants, so a
//! caller who exhausts retries still receives the original failure and can
//! pattern-match on it.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for Inferra operations.
pub type InferraResult<T> = Result<T, InferraError>;

/// Comprehensive error type for Inferra client operations.
#[derive(Debug, Error)]
pub enum InferraError {
    /// Configuration error (missing API key, invalid base URL, etc.)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue.
        message: String,
    },

    /// Caller-supplied input was malformed. Raised before any request is sent.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation issue.
        message: String,
        /// The parameter that caused the error.
        param: Option<String>,
    },

    /// The API rejected the credential (HTTP 401).
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message.
        message: String,
    },

    /// Rate limit exceeded, either by the local bucket or by the server.
    #[error("{message}")]
    RateLimit {
        /// Error message.
        message: String,
        /// How long to wait before the request may succeed.
        retry_after: Option<Duration>,
        /// Where the limit was enforced.
        scope: RateLimitScope,
    },

    /// The API answered with a non-2xx status other than 401 and 429.
    #[error("{message}")]
    Server {
        /// Error message.
        message: String,
        /// HTTP status code, absent when the failure was not tied to a response.
        status_code: Option<u16>,
        /// Parsed error body, when the server sent JSON.
        body: Option<serde_json::Value>,
    },

    /// Connect, timeout, DNS or body-read failure.
    #[error("{message}")]
    Transport {
        /// Error message, prefixed with "Request failed".
        message: String,
        /// Underlying transport cause.
        #[source]
        cause: Option<TransportError>,
    },

    /// A streamed frame could not be decoded. Terminates the event stream.
    #[error("Error decoding streaming response: {message}")]
    Decode {
        /// Error message.
        message: String,
    },

    /// Local file read or write failed.
    #[error("File error: {message}")]
    Io {
        /// Error message naming the path.
        message: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A batch did not reach a terminal status in time.
    #[error("Batch {batch_id} did not complete within {waited:?}")]
    PollTimeout {
        /// The batch being polled.
        batch_id: String,
        /// How long the poll ran.
        waited: Duration,
    },
}

/// Where a rate limit was enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// The client-side token bucket refused the request.
    Local,
    /// The API answered HTTP 429.
    Server,
}

/// Kind tag used by the retry policy to decide what to re-attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// [`InferraError::Configuration`].
    Configuration,
    /// [`InferraError::Validation`].
    Validation,
    /// [`InferraError::Authentication`].
    Authentication,
    /// [`InferraError::RateLimit`].
    RateLimit,
    /// [`InferraError::Server`].
    Server,
    /// [`InferraError::Transport`].
    Transport,
    /// [`InferraError::Decode`].
    Decode,
    /// [`InferraError::Io`].
    Io,
    /// [`InferraError::PollTimeout`].
    PollTimeout,
}

impl ErrorKind {
    /// Kinds retried when no explicit set is configured: the API-level failures.
    pub const API: [ErrorKind; 3] = [ErrorKind::RateLimit, ErrorKind::Server, ErrorKind::Transport];

    /// Short lowercase name, used as a metrics key.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Server => "server",
            ErrorKind::Transport => "transport",
            ErrorKind::Decode => "decode",
            ErrorKind::Io => "io",
            ErrorKind::PollTimeout => "poll_timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InferraError {
    /// Returns the kind tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InferraError::Configuration { .. } => ErrorKind::Configuration,
            InferraError::Validation { .. } => ErrorKind::Validation,
            InferraError::Authentication { .. } => ErrorKind::Authentication,
            InferraError::RateLimit { .. } => ErrorKind::RateLimit,
            InferraError::Server { .. } => ErrorKind::Server,
            InferraError::Transport { .. } => ErrorKind::Transport,
            InferraError::Decode { .. } => ErrorKind::Decode,
            InferraError::Io { .. } => ErrorKind::Io,
            InferraError::PollTimeout { .. } => ErrorKind::PollTimeout,
        }
    }

    /// Returns true if the default retry policy would re-attempt this error.
    pub fn is_retryable(&self) -> bool {
        ErrorKind::API.contains(&self.kind())
    }

    /// Returns the wait hint. Only rate-limit errors carry one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            InferraError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the HTTP status code if this error came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            InferraError::Authentication { .. } => Some(401),
            InferraError::RateLimit {
                scope: RateLimitScope::Server,
                ..
            } => Some(429),
            InferraError::Server { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        InferraError::Validation {
            message: message.into(),
            param: None,
        }
    }

    /// Creates a validation error naming the offending parameter.
    pub fn validation_param(message: impl Into<String>, param: impl Into<String>) -> Self {
        InferraError::Validation {
            message: message.into(),
            param: Some(param.into()),
        }
    }

    /// Creates a server error.
    pub fn server(status_code: u16, message: impl Into<String>) -> Self {
        InferraError::Server {
            message: message.into(),
            status_code: Some(status_code),
            body: None,
        }
    }

    /// Creates a transport failure from its cause.
    pub fn transport(cause: TransportError) -> Self {
        InferraError::Transport {
            message: format!("Request failed: {cause}"),
            cause: Some(cause),
        }
    }

    /// Creates a file error for `path`.
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        InferraError::Io {
            message: format!("{}: {source}", path.display()),
            source,
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        InferraError::Decode {
            message: message.into(),
        }
    }
}

impl From<TransportError> for InferraError {
    fn from(err: TransportError) -> Self {
        InferraError::transport(err)
    }
}

impl From<serde_json::Error> for InferraError {
    fn from(err: serde_json::Error) -> Self {
        InferraError::decode(err.to_string())
    }
}

impl From<url::ParseError> for InferraError {
    fn from(err: url::ParseError) -> Self {
        InferraError::Configuration {
            message: format!("Invalid URL: {err}"),
        }
    }
}

/// API error response body.
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorResponse {
    /// The error details.
    pub error: ApiErrorDetail,
}

/// Detailed API error information.
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorDetail {
    /// The error message.
    pub message: Option<String>,
    /// The error type.
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    /// The error code, a string or a number depending on the endpoint.
    pub code: Option<serde_json::Value>,
}
