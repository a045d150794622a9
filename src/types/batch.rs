//! Batch job types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default completion window for new batches.
pub const DEFAULT_COMPLETION_WINDOW: &str = "24h";

/// Batch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Input file is being validated.
    Validating,
    /// Requests are being processed.
    InProgress,
    /// Results are being prepared.
    Finalizing,
    /// Finished successfully.
    Completed,
    /// Failed.
    Failed,
    /// Cancellation requested.
    Cancelling,
    /// Cancelled.
    Cancelled,
    /// Completion window elapsed.
    Expired,
    /// Status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl BatchStatus {
    /// True once the batch can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchStatus::Completed
                | BatchStatus::Failed
                | BatchStatus::Cancelled
                | BatchStatus::Expired
        )
    }
}

/// Per-batch request counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequestCounts {
    /// Total requests.
    #[serde(default)]
    pub total: u32,
    /// Completed requests.
    #[serde(default)]
    pub completed: u32,
    /// Failed requests.
    #[serde(default)]
    pub failed: u32,
}

/// Batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Batch ID.
    pub id: String,

    /// Object type.
    #[serde(default)]
    pub object: String,

    /// Current status.
    pub status: BatchStatus,

    /// Input file ID.
    pub input_file_id: String,

    /// Output file ID, once results exist.
    #[serde(default)]
    pub output_file_id: Option<String>,

    /// Error file ID, if any request failed.
    #[serde(default)]
    pub error_file_id: Option<String>,

    /// Completion window.
    #[serde(default)]
    pub completion_window: String,

    /// Creation timestamp.
    pub created_at: i64,

    /// Processing start timestamp.
    #[serde(default)]
    pub in_progress_at: Option<i64>,

    /// Completion timestamp.
    #[serde(default)]
    pub completed_at: Option<i64>,

    /// Failure timestamp.
    #[serde(default)]
    pub failed_at: Option<i64>,

    /// Expiry timestamp.
    #[serde(default)]
    pub expired_at: Option<i64>,

    /// Request counters.
    #[serde(default)]
    pub request_counts: BatchRequestCounts,

    /// Caller metadata.
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl Batch {
    /// True once the batch reached a terminal status.
    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    /// Creation time.
    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created_at, 0)
    }

    /// When the batch completed, failed or expired.
    pub fn finished_time(&self) -> Option<DateTime<Utc>> {
        self.completed_at
            .or(self.failed_at)
            .or(self.expired_at)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Batch creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateBatchRequest {
    /// ID of an uploaded JSONL input file.
    pub input_file_id: String,

    /// Completion window.
    pub completion_window: String,

    /// Caller metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl CreateBatchRequest {
    /// Creates a request with the default completion window.
    pub fn new(input_file_id: impl Into<String>) -> Self {
        Self {
            input_file_id: input_file_id.into(),
            completion_window: DEFAULT_COMPLETION_WINDOW.to_string(),
            metadata: None,
        }
    }

    /// Sets the completion window.
    pub fn completion_window(mut self, window: impl Into<String>) -> Self {
        self.completion_window = window.into();
        self
    }

    /// Adds one metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}
