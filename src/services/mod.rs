//! API service implementations.
//!
//! Every service validates its input first, then sends through the shared
//! [`RequestPipeline`] inside the shared [`ResilienceOrchestrator`], so each
//! attempt takes a token from the client's bucket before it goes out.

mod batch;
mod chat;
mod completions;
mod files;

pub use batch::{BatchService, DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT};
pub use chat::ChatService;
pub use completions::CompletionsService;
pub use files::FilesService;

use futures::{stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::errors::{InferraError, InferraResult};
use crate::resilience::ResilienceOrchestrator;
use crate::transport::{HttpMethod, OutboundRequest, RequestPipeline, ResponseBody};

/// Handles shared by every service.
#[derive(Clone)]
pub(crate) struct ServiceContext {
    pipeline: Arc<RequestPipeline>,
    resilience: Arc<ResilienceOrchestrator>,
}

impl ServiceContext {
    pub(crate) fn new(pipeline: Arc<RequestPipeline>, resilience: Arc<ResilienceOrchestrator>) -> Self {
        Self {
            pipeline,
            resilience,
        }
    }

    /// Sends `request` under the retry policy, one token per attempt.
    pub(crate) async fn call(&self, request: &OutboundRequest) -> InferraResult<ResponseBody> {
        let pipeline = &self.pipeline;
        self.resilience
            .execute(1, || pipeline.execute(request))
            .await
    }

    /// Sends `request` and deserializes the JSON body.
    pub(crate) async fn call_json<T: DeserializeOwned>(
        &self,
        request: &OutboundRequest,
    ) -> InferraResult<T> {
        self.call(request).await?.parse()
    }

    /// Sends every request and deserializes the bodies, in input order.
    ///
    /// At most one burst of requests is in flight. Each request first waits
    /// its turn for a token, so a batch larger than the bucket drains at the
    /// refill rate instead of spending its retries on local refusals. The
    /// first failure drops the requests still pending.
    pub(crate) async fn call_all<T: DeserializeOwned>(
        &self,
        requests: Vec<OutboundRequest>,
    ) -> InferraResult<Vec<T>> {
        let burst = self.resilience.rate_limiter().burst();
        let in_flight = usize::try_from(burst).unwrap_or(usize::MAX).max(1);
        let turn = &Mutex::new(());
        let pipeline = &self.pipeline;
        let resilience = &self.resilience;

        stream::iter(requests)
            .map(|request| async move {
                {
                    let _turn = turn.lock().await;
                    resilience.admit(1).await?;
                }
                resilience
                    .execute_admitted(1, || pipeline.execute(&request))
                    .await?
                    .parse::<T>()
            })
            .buffered(in_flight)
            .try_collect()
            .await
    }

    /// Sends `request` and runs `consume` on the body inside the same attempt,
    /// so a failure while reading the body re-issues the whole request.
    pub(crate) async fn call_and_consume<T, F, Fut>(
        &self,
        request: &OutboundRequest,
        consume: F,
    ) -> InferraResult<T>
    where
        F: Fn(ResponseBody) -> Fut,
        Fut: Future<Output = InferraResult<T>>,
    {
        let pipeline = &self.pipeline;
        let consume = &consume;
        self.resilience
            .execute(1, move || async move {
                let body = pipeline.execute(request).await?;
                consume(body).await
            })
            .await
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("pipeline", &self.pipeline)
            .field("resilience", &self.resilience)
            .finish()
    }
}

/// Rejects identifiers that are blank or would change the shape of the URL
/// they are spliced into.
pub(crate) fn require_id<'a>(id: &'a str, param: &str) -> InferraResult<&'a str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(InferraError::validation_param(
            format!("{param} cannot be empty"),
            param,
        ));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
    {
        return Err(InferraError::validation_param(
            format!("{param} contains invalid character {bad:?}"),
            param,
        ));
    }
    Ok(id)
}

/// Request for `{collection}/{id}{suffix}`.
///
/// Metrics see the templated `{collection}/{id}{suffix}` label, so polling
/// many resources does not grow the per-endpoint counters.
pub(crate) fn resource_request(
    method: HttpMethod,
    collection: &str,
    id: &str,
    param: &str,
    suffix: &str,
) -> InferraResult<OutboundRequest> {
    let id = require_id(id, param)?;
    Ok(OutboundRequest::new(method, format!("{collection}/{id}{suffix}"))
        .endpoint(format!("{collection}/{{id}}{suffix}")))
}
