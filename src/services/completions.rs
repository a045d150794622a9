//! Text completions service.

use std::sync::Arc;
use tracing::instrument;

use super::ServiceContext;
use crate::errors::InferraResult;
use crate::resilience::ResilienceOrchestrator;
use crate::transport::{EventStream, OutboundRequest, RequestPipeline};
use crate::types::completions::{Completion, CompletionChunk, CompletionOptions, CompletionRequest};
use crate::types::models::endpoints;

/// Text completions service.
#[derive(Debug, Clone)]
pub struct CompletionsService {
    context: ServiceContext,
}

impl CompletionsService {
    /// Creates a new completions service.
    pub fn new(pipeline: Arc<RequestPipeline>, resilience: Arc<ResilienceOrchestrator>) -> Self {
        Self::from_context(ServiceContext::new(pipeline, resilience))
    }

    pub(crate) fn from_context(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Creates a completion.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn create(&self, mut request: CompletionRequest) -> InferraResult<Completion> {
        request.validate()?;
        request.stream = false;

        let outbound =
            OutboundRequest::post(endpoints::COMPLETIONS).json(serde_json::to_value(&request)?);
        self.context.call_json(&outbound).await
    }

    /// Creates a streaming completion.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn create_stream(
        &self,
        mut request: CompletionRequest,
    ) -> InferraResult<EventStream<CompletionChunk>> {
        request.validate()?;
        request.stream = true;

        let outbound = OutboundRequest::post(endpoints::COMPLETIONS)
            .json(serde_json::to_value(&request)?)
            .streaming(true);
        let body = self.context.call(&outbound).await?;
        Ok(EventStream::from_bytes(body.into_stream()?))
    }

    /// Completes several prompts concurrently. Results follow prompt order.
    ///
    /// Prompts beyond the bucket's burst wait for refill instead of failing.
    #[instrument(skip(self, prompts, options))]
    pub async fn create_batch<I, P>(
        &self,
        model: &str,
        prompts: I,
        options: &CompletionOptions,
    ) -> InferraResult<Vec<Completion>>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let requests = prompts
            .into_iter()
            .map(|prompt| CompletionRequest::with_options(model, prompt, options))
            .collect::<Vec<_>>();

        let outbound = requests
            .iter()
            .map(|request| -> InferraResult<OutboundRequest> {
                request.validate()?;
                let body = serde_json::to_value(request)?;
                Ok(OutboundRequest::post(endpoints::COMPLETIONS).json(body))
            })
            .collect::<InferraResult<Vec<_>>>()?;

        self.context.call_all(outbound).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InferraError;
    use crate::mocks::{fixtures, MockResponse, MockTransport};
    use crate::services::test_support;
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn service(transport: &Arc<MockTransport>) -> CompletionsService {
        CompletionsService::from_context(test_support::context(transport))
    }

    #[tokio::test]
    async fn test_create_sends_stop_list() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_json(&fixtures::completion(" upon a time"));

        let request = CompletionRequest::new(fixtures::MODEL, "Once").stop(vec!["\n", "END"]);
        let completion = service(&transport).create(request).await.unwrap();

        assert_eq!(completion.text(), Some(" upon a time"));
        let body = transport.last_request().unwrap().json().unwrap();
        assert_eq!(body["stop"], json!(["\n", "END"]));
        assert_eq!(transport.last_request().unwrap().path, "/completions");
    }

    #[tokio::test]
    async fn test_create_stream_stops_at_sentinel() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::stream([
            "data: {\"id\":\"c\",\"created\":1,\"model\":\"m\",\"choices\":[{\"index\":0,\"text\":\"Hi\"}]}\n",
            "\n",
            "data: [DONE]\n",
            "data: {\"never\":\"parsed\"}\n",
        ]));

        let chunks: Vec<CompletionChunk> = service(&transport)
            .create_stream(CompletionRequest::new(fixtures::MODEL, "Say hi"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text(), "Hi");
    }

    #[tokio::test]
    async fn test_stream_decode_error_surfaces() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::stream(["data: {not json}\n"]));

        let result: Result<Vec<CompletionChunk>, _> = service(&transport)
            .create_stream(CompletionRequest::new(fixtures::MODEL, "Hi"))
            .await
            .unwrap()
            .try_collect()
            .await;

        assert!(matches!(result, Err(InferraError::Decode { .. })));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_create_batch_order() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_json(&fixtures::completion("a"));
        transport.queue_json(&fixtures::completion("b"));
        transport.queue_json(&fixtures::completion("c"));

        let results = service(&transport)
            .create_batch(fixtures::MODEL, ["1", "2", "3"], &CompletionOptions::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_batch_waits_for_refill_and_keeps_order() {
        let transport = Arc::new(MockTransport::new());
        for text in ["a", "b", "c", "d"] {
            transport.queue_json(&fixtures::completion(text));
        }
        let svc = CompletionsService::from_context(test_support::context_with(
            &transport,
            crate::resilience::RateLimiter::per_minute(30, Some(1)),
            None,
        ));

        let started = tokio::time::Instant::now();
        let results = svc
            .create_batch(fixtures::MODEL, ["1", "2", "3", "4"], &CompletionOptions::new())
            .await
            .unwrap();

        let texts: Vec<_> = results.iter().map(|c| c.text().unwrap_or_default()).collect();
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
        assert_eq!(started.elapsed(), std::time::Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_create_batch_rejects_blank_prompt() {
        let transport = Arc::new(MockTransport::new());

        let err = service(&transport)
            .create_batch(fixtures::MODEL, ["ok", " "], &CompletionOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, InferraError::Validation { .. }));
        assert_eq!(transport.request_count(), 0);
    }
}
