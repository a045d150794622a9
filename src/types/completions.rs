//! Text completion types.

use serde::{Deserialize, Serialize};

use super::common::{FinishReason, Usage};
use super::models::validate_model;
use crate::errors::{InferraError, InferraResult};

/// Stop sequence: a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequence {
    /// Single stop string.
    One(String),
    /// Several stop strings.
    Many(Vec<String>),
}

impl From<&str> for StopSequence {
    fn from(value: &str) -> Self {
        StopSequence::One(value.to_string())
    }
}

impl From<String> for StopSequence {
    fn from(value: String) -> Self {
        StopSequence::One(value)
    }
}

impl From<Vec<String>> for StopSequence {
    fn from(value: Vec<String>) -> Self {
        StopSequence::Many(value)
    }
}

impl From<Vec<&str>> for StopSequence {
    fn from(value: Vec<&str>) -> Self {
        StopSequence::Many(value.into_iter().map(str::to_string).collect())
    }
}

/// Sampling options for completion calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
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
    /// Stop sequences.
    pub stop: Option<StopSequence>,
}

impl CompletionOptions {
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

    /// Sets the stop sequence(s).
    pub fn stop(mut self, stop: impl Into<StopSequence>) -> Self {
        self.stop = Some(stop.into());
        self
    }
}

/// Text completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model ID.
    pub model: String,

    /// Prompt text.
    pub prompt: String,

    /// Whether the response is streamed. Set by the completions service.
    pub stream: bool,

    /// Temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Max tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Top P.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Frequency penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    /// Presence penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequence>,
}

impl CompletionRequest {
    /// Creates a request with model and prompt.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: false,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: None,
        }
    }

    /// Creates a request from model, prompt and options.
    pub fn with_options(
        model: impl Into<String>,
        prompt: impl Into<String>,
        options: &CompletionOptions,
    ) -> Self {
        Self {
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            frequency_penalty: options.frequency_penalty,
            presence_penalty: options.presence_penalty,
            stop: options.stop.clone(),
            ..Self::new(model, prompt)
        }
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

    /// Sets the stop sequence(s).
    pub fn stop(mut self, stop: impl Into<StopSequence>) -> Self {
        self.stop = Some(stop.into());
        self
    }

    /// Validates the request.
    pub fn validate(&self) -> InferraResult<()> {
        validate_model(&self.model)?;

        if self.prompt.trim().is_empty() {
            return Err(InferraError::validation_param(
                "Prompt cannot be empty",
                "prompt",
            ));
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

/// Completion choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    /// Choice index.
    pub index: u32,

    /// Generated text.
    #[serde(default)]
    pub text: String,

    /// Finish reason.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,

    /// Log probabilities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}

/// Text completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Response ID.
    pub id: String,

    /// Object type.
    #[serde(default)]
    pub object: String,

    /// Creation timestamp.
    pub created: i64,

    /// Model ID.
    pub model: String,

    /// Choices.
    pub choices: Vec<CompletionChoice>,

    /// Token usage.
    #[serde(default)]
    pub usage: Usage,
}

impl Completion {
    /// Gets the first choice text.
    pub fn text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.text.as_str())
    }
}

/// Streaming completion chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    /// Response ID.
    pub id: String,

    /// Object type.
    #[serde(default)]
    pub object: String,

    /// Creation timestamp.
    pub created: i64,

    /// Model ID.
    pub model: String,

    /// Choices.
    pub choices: Vec<CompletionChoice>,

    /// Usage (final chunk only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionChunk {
    /// Returns the first choice's text delta, or `""`.
    pub fn text(&self) -> &str {
        self.choices.first().map_or("", |c| c.text.as_str())
    }
}
