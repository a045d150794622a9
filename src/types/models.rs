//! Model table and endpoint paths.

use crate::errors::{InferraError, InferraResult};

/// Models served by Inferra with their price in USD per million tokens.
pub const AVAILABLE_MODELS: &[(&str, f64)] = &[
    ("meta-llama/llama-3.2-1b-instruct/fp-8", 0.015),
    ("meta-llama/llama-3.2-3b-instruct/fp-8", 0.03),
    ("meta-llama/llama-3.1-8b-instruct/fp-8", 0.045),
    ("meta-llama/llama-3.1-8b-instruct/fp-16", 0.05),
    ("mistralai/mistral-nemo-12b-instruct/fp-8", 0.10),
    ("meta-llama/llama-3.1-70b-instruct/fp-8", 0.30),
];

/// API endpoint paths, relative to the base URL.
pub mod endpoints {
    /// Chat completions.
    pub const CHAT: &str = "/chat/completions";
    /// Text completions.
    pub const COMPLETIONS: &str = "/completions";
    /// Batch jobs.
    pub const BATCH: &str = "/batch";
    /// Stored files.
    pub const FILES: &str = "/files";
}

/// Returns the price per million tokens for `model`.
pub fn model_price(model: &str) -> Option<f64> {
    AVAILABLE_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, price)| *price)
}

/// Returns true if `model` is in the model table.
pub fn is_available(model: &str) -> bool {
    model_price(model).is_some()
}

/// Rejects model identifiers that are not in the model table.
pub fn validate_model(model: &str) -> InferraResult<()> {
    if is_available(model) {
        return Ok(());
    }

    let known: Vec<&str> = AVAILABLE_MODELS.iter().map(|(name, _)| *name).collect();
    Err(InferraError::validation_param(
        format!(
            "Invalid model '{model}'. Available models: {}",
            known.join(", ")
        ),
        "model",
    ))
}
