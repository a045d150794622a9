//! Batch jobs service.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;

use super::{require_id, resource_request, ServiceContext};
use crate::errors::{InferraError, InferraResult};
use crate::resilience::ResilienceOrchestrator;
use crate::transport::{HttpMethod, OutboundRequest, RequestPipeline};
use crate::types::batch::{Batch, CreateBatchRequest};
use crate::types::common::{ListParams, ListResponse};
use crate::types::models::endpoints;

/// Time between status checks in [`BatchService::wait_for_completion`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long [`BatchService::wait_for_completion`] waits in total.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Batch jobs service.
#[derive(Debug, Clone)]
pub struct BatchService {
    context: ServiceContext,
}

impl BatchService {
    /// Creates a new batch service.
    pub fn new(pipeline: Arc<RequestPipeline>, resilience: Arc<ResilienceOrchestrator>) -> Self {
        Self::from_context(ServiceContext::new(pipeline, resilience))
    }

    pub(crate) fn from_context(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Creates a batch from an uploaded input file.
    #[instrument(skip(self, request), fields(input_file_id = %request.input_file_id))]
    pub async fn create(&self, request: CreateBatchRequest) -> InferraResult<Batch> {
        require_id(&request.input_file_id, "input_file_id")?;
        if request.completion_window.trim().is_empty() {
            return Err(InferraError::validation_param(
                "completion_window cannot be empty",
                "completion_window",
            ));
        }

        let outbound = OutboundRequest::post(endpoints::BATCH).json(serde_json::to_value(&request)?);
        self.context.call_json(&outbound).await
    }

    /// Retrieves a batch.
    #[instrument(skip(self))]
    pub async fn retrieve(&self, batch_id: &str) -> InferraResult<Batch> {
        let outbound =
            resource_request(HttpMethod::Get, endpoints::BATCH, batch_id, "batch_id", "")?;
        self.context.call_json(&outbound).await
    }

    /// Lists batches.
    #[instrument(skip(self))]
    pub async fn list(&self, params: ListParams) -> InferraResult<Vec<Batch>> {
        let mut outbound = OutboundRequest::get(endpoints::BATCH).query("limit", params.limit);
        if let Some(after) = &params.after {
            outbound = outbound.query("after", after);
        }

        let list: ListResponse<Batch> = self.context.call_json(&outbound).await?;
        Ok(list.into_items())
    }

    /// Requests cancellation of a batch.
    #[instrument(skip(self))]
    pub async fn cancel(&self, batch_id: &str) -> InferraResult<Batch> {
        let outbound =
            resource_request(HttpMethod::Post, endpoints::BATCH, batch_id, "batch_id", "/cancel")?;
        self.context.call_json(&outbound).await
    }

    /// Polls until the batch is completed, failed, cancelled or expired,
    /// using [`DEFAULT_WAIT_TIMEOUT`] and [`DEFAULT_POLL_INTERVAL`].
    pub async fn wait_for_completion(&self, batch_id: &str) -> InferraResult<Batch> {
        self.wait_for_completion_with(batch_id, DEFAULT_WAIT_TIMEOUT, DEFAULT_POLL_INTERVAL)
            .await
    }

    /// Polls until the batch reaches a terminal status.
    ///
    /// Returns [`InferraError::PollTimeout`] once `timeout` has elapsed
    /// without a terminal status. Each status check goes through the usual
    /// retry policy.
    #[instrument(skip(self), fields(timeout_secs = timeout.as_secs(), poll_ms = poll_interval.as_millis()))]
    pub async fn wait_for_completion_with(
        &self,
        batch_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> InferraResult<Batch> {
        let started = Instant::now();

        loop {
            let batch = self.retrieve(batch_id).await?;
            if batch.is_done() {
                tracing::info!(status = ?batch.status, "Batch finished");
                return Ok(batch);
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(InferraError::PollTimeout {
                    batch_id: batch.id,
                    waited,
                });
            }

            tracing::debug!(status = ?batch.status, "Batch still running");
            tokio::time::sleep(poll_interval.min(timeout - waited)).await;
        }
    }
}
