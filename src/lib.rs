//! Inferra Client Library
//!
//! An async Rust client for the Inferra inference API: chat and text
//! completions (plain and streamed), batch jobs, and file storage.
//!
//! # Features
//!
//! - **Rate limiting**: a token bucket shared by every API surface bounds
//!   the client's request rate
//! - **Retries**: capped exponential backoff that honors the server's
//!   `Retry-After` hint
//! - **Streaming**: server-sent events decoded lazily into typed chunks
//! - **Observability**: `tracing` spans and events, request metrics
//! - **Type Safety**: request builders validated before anything is sent
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use inferra_client::{ChatRequest, InferraClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = InferraClient::builder()
//!         .api_key("your-api-key")
//!         .requests_per_minute(120)
//!         .build()?;
//!
//!     let request = ChatRequest::builder()
//!         .model("meta-llama/llama-3.1-8b-instruct/fp-8")
//!         .user("Hello, Inferra!")
//!         .build()?;
//!
//!     let response = client.chat().create(request).await?;
//!     println!("{}", response.content().unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! # Streaming Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use inferra_client::{ChatRequest, InferraClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = InferraClient::from_env()?;
//!
//!     let request = ChatRequest::builder()
//!         .model("meta-llama/llama-3.1-8b-instruct/fp-8")
//!         .user("Tell me a story")
//!         .build()?;
//!
//!     let mut stream = client.chat().create_stream(request).await?;
//!     while let Some(chunk) = stream.next().await {
//!         print!("{}", chunk?.content());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod observability;
pub mod resilience;
pub mod services;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{InferraClient, InferraClientBuilder};
pub use config::InferraConfig;
pub use errors::{ErrorKind, InferraError, InferraResult, RateLimitScope};
pub use resilience::{RateLimiter, RetryConfig, RetryPolicy};
pub use transport::EventStream;

// Type re-exports
pub use types::batch::{Batch, BatchStatus, CreateBatchRequest};
pub use types::chat::{
    ChatCompletion, ChatCompletionChunk, ChatOptions, ChatRequest, Message, Role,
};
pub use types::common::{FinishReason, ListParams, Usage};
pub use types::completions::{
    Completion, CompletionChunk, CompletionOptions, CompletionRequest, StopSequence,
};
pub use types::files::{FileContent, FileListParams, FileObject, FileSource};

/// Mock implementations for testing.
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
