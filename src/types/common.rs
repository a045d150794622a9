//! Common types shared across the Inferra API.

use serde::{Deserialize, Serialize};

/// Token usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Usage {
    /// Prompt tokens.
    pub prompt_tokens: u32,

    /// Completion tokens.
    pub completion_tokens: u32,

    /// Total tokens.
    pub total_tokens: u32,
}

/// Why generation stopped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop or stop sequence.
    Stop,
    /// Max tokens reached.
    Length,
    /// Content filter triggered.
    ContentFilter,
    /// Any reason this client does not know about.
    #[serde(other)]
    Other,
}

/// Pagination parameters for list endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    /// Maximum number of items to return.
    pub limit: u32,
    /// Return items after this ID.
    pub after: Option<String>,
}

impl ListParams {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 20;

    /// Sets the page size.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the cursor.
    pub fn after(mut self, after: impl Into<String>) -> Self {
        self.after = Some(after.into());
        self
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            after: None,
        }
    }
}

/// A list response. The API returns either a bare array or an object with a
/// `data` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListResponse<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListResponse<T> {
    pub(crate) fn into_items(self) -> Vec<T> {
        match self {
            ListResponse::Bare(items) | ListResponse::Wrapped { data: items } => items,
        }
    }
}
