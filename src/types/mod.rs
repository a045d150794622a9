//! Request and response types for the Inferra API.

pub mod batch;
pub mod chat;
pub mod common;
pub mod completions;
pub mod files;
pub mod models;

pub use batch::{Batch, BatchRequestCounts, BatchStatus, CreateBatchRequest};
pub use chat::{
    AssistantMessage, ChatChoice, ChatCompletion, ChatCompletionChunk, ChatOptions, ChatRequest,
    ChatRequestBuilder, ChunkChoice, Delta, Message, Role,
};
pub use common::{FinishReason, ListParams, Usage};
pub use completions::{
    Completion, CompletionChoice, CompletionChunk, CompletionOptions, CompletionRequest,
    StopSequence,
};
pub use files::{FileContent, FileListParams, FileObject, FileSource};
pub use models::{model_price, validate_model, AVAILABLE_MODELS};
