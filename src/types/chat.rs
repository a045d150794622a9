//! Chat completion types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::{FinishReason, Usage};
use super::models::validate_model;
use crate::errors::{InferraError, InferraResult};

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message.
    System,
    /// User message.
    User,
    /// Assistant message.
    Assistant,
}

/// Chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: Role,

    /// Message content.
    pub content: String,

    /// Participant name (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Creates a message with the given role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Sets the participant name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Sampling options shared by single and fan-out chat calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    /// Temperature (0.0-2.0).
    pub temperature: Option<f32>,
    /// Max completion tokens.
    pub max_tokens: Option<u32>,
    /// Top P sampling.
    pub top_p: Option<f32>,
    /// Frequency penalty.
    pub frequency_penalty: Option<f32>,
    /// Presence penalty.
    pub presence_penalty: Option<f32>,
}

impl ChatOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the temperature.
    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    /// Sets the max tokens.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Sets top_p.
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Sets frequency penalty.
    pub fn frequency_penalty(mut self, penalty: f32) -> Self {
        self.frequency_penalty = Some(penalty);
        self
    }

    /// Sets presence penalty.
    pub fn presence_penalty(mut self, penalty: f32) -> Self {
        self.presence_penalty = Some(penalty);
        self
    }
}

/// Chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Model ID (required).
    pub model: String,

    /// Messages array (required).
    pub messages: Vec<Message>,

    /// Whether the response is streamed. Set by the chat service.
    pub stream: bool,

    /// Temperature (0.0-2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Max completion tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Top P sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Frequency penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    /// Presence penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

impl ChatRequest {
    /// Creates a new request with model and messages.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }

    /// Creates a request from model, messages and sampling options.
    pub fn with_options(
        model: impl Into<String>,
        messages: Vec<Message>,
        options: &ChatOptions,
    ) -> Self {
        Self {
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            frequency_penalty: options.frequency_penalty,
            presence_penalty: options.presence_penalty,
            ..Self::new(model, messages)
        }
    }

    /// Creates a new request builder.
    pub fn builder() -> ChatRequestBuilder {
        ChatRequestBuilder::new()
    }

    /// Validates the request. Runs before any token is taken from the bucket.
    pub fn validate(&self) -> InferraResult<()> {
        validate_model(&self.model)?;

        if self.messages.is_empty() {
            return Err(InferraError::validation_param(
                "Messages list cannot be empty",
                "messages",
            ));
        }

        for (i, msg) in self.messages.iter().enumerate() {
            if msg.content.trim().is_empty() {
                return Err(InferraError::validation_param(
                    format!("Message {i}: content cannot be empty"),
                    format!("messages[{i}]"),
                ));
            }
        }

        if let Some(temp) = self.temperature {
            if !(0.0..=2.0).contains(&temp) {
                return Err(InferraError::validation_param(
                    "Temperature must be between 0 and 2",
                    "temperature",
                ));
            }
        }

        if self.max_tokens == Some(0) {
            return Err(InferraError::validation_param(
                "max_tokens must be positive",
                "max_tokens",
            ));
        }

        Ok(())
    }
}

/// Chat request builder.
#[derive(Debug, Default)]
pub struct ChatRequestBuilder {
    model: Option<String>,
    messages: Vec<Message>,
    options: ChatOptions,
}

impl ChatRequestBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets all messages.
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Adds a message.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Adds a system message.
    pub fn system(self, content: impl Into<String>) -> Self {
        self.message(Message::system(content))
    }

    /// Adds a user message.
    pub fn user(self, content: impl Into<String>) -> Self {
        self.message(Message::user(content))
    }

    /// Adds an assistant message.
    pub fn assistant(self, content: impl Into<String>) -> Self {
        self.message(Message::assistant(content))
    }

    /// Sets the temperature.
    pub fn temperature(mut self, temp: f32) -> Self {
        self.options.temperature = Some(temp);
        self
    }

    /// Sets the max tokens.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.options.max_tokens = Some(tokens);
        self
    }

    /// Sets top_p.
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.options.top_p = Some(top_p);
        self
    }

    /// Sets frequency penalty.
    pub fn frequency_penalty(mut self, penalty: f32) -> Self {
        self.options.frequency_penalty = Some(penalty);
        self
    }

    /// Sets presence penalty.
    pub fn presence_penalty(mut self, penalty: f32) -> Self {
        self.options.presence_penalty = Some(penalty);
        self
    }

    /// Builds and validates the request.
    pub fn build(self) -> InferraResult<ChatRequest> {
        let model = self
            .model
            .ok_or_else(|| InferraError::validation_param("Model is required", "model"))?;

        let request = ChatRequest::with_options(model, self.messages, &self.options);
        request.validate()?;
        Ok(request)
    }
}

/// Assistant message in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Message role.
    pub role: Role,

    /// Message content.
    #[serde(default)]
    pub content: Option<String>,

    /// Participant name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Response choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Choice index.
    pub index: u32,

    /// Assistant message.
    pub message: AssistantMessage,

    /// Finish reason.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,

    /// Log probabilities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}

/// Chat completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// Response ID.
    pub id: String,

    /// Object type.
    #[serde(default = "chat_completion_object")]
    pub object: String,

    /// Creation timestamp.
    pub created: i64,

    /// Model ID.
    pub model: String,

    /// Response choices.
    pub choices: Vec<ChatChoice>,

    /// Token usage.
    #[serde(default)]
    pub usage: Usage,
}

fn chat_completion_object() -> String {
    "chat.completion".to_string()
}

fn chat_chunk_object() -> String {
    "chat.completion.chunk".to_string()
}

impl ChatCompletion {
    /// Gets the first choice content.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }

    /// Reassembles a full response from streamed chunks.
    ///
    /// Content deltas are concatenated per choice index. Identity fields
    /// come from the first chunk; usage and finish reasons from the last
    /// chunk that carries them.
    pub fn from_chunks(chunks: &[ChatCompletionChunk]) -> InferraResult<Self> {
        let first = chunks
            .first()
            .ok_or_else(|| InferraError::decode("No chunks received"))?;

        let mut choices: BTreeMap<u32, ChatChoice> = BTreeMap::new();
        let mut usage = None;

        for chunk in chunks {
            for delta in &chunk.choices {
                let choice = choices.entry(delta.index).or_insert_with(|| ChatChoice {
                    index: delta.index,
                    message: AssistantMessage {
                        role: Role::Assistant,
                        content: None,
                        name: None,
                    },
                    finish_reason: None,
                    logprobs: None,
                });

                if let Some(role) = delta.delta.role {
                    choice.message.role = role;
                }
                if let Some(content) = &delta.delta.content {
                    choice
                        .message
                        .content
                        .get_or_insert_with(String::new)
                        .push_str(content);
                }
                if delta.finish_reason.is_some() {
                    choice.finish_reason.clone_from(&delta.finish_reason);
                }
            }
            if chunk.usage.is_some() {
                usage.clone_from(&chunk.usage);
            }
        }

        Ok(Self {
            id: first.id.clone(),
            object: chat_completion_object(),
            created: first.created,
            model: first.model.clone(),
            choices: choices.into_values().collect(),
            usage: usage.unwrap_or_default(),
        })
    }
}

/// Delta content in streaming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// Role (first chunk only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Content delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Streaming choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index.
    pub index: u32,

    /// Delta content. Some servers send it under `message`.
    #[serde(default, alias = "message")]
    pub delta: Delta,

    /// Finish reason (in final chunk).
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Streaming chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Response ID.
    pub id: String,

    /// Object type.
    #[serde(default = "chat_chunk_object")]
    pub object: String,

    /// Creation timestamp.
    pub created: i64,

    /// Model ID.
    pub model: String,

    /// Chunk choices.
    pub choices: Vec<ChunkChoice>,

    /// Usage (final chunk only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionChunk {
    /// Returns the first choice's content delta, or `""` when absent.
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .unwrap_or("")
    }
}
