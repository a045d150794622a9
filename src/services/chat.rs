//! Chat completions service.

use std::sync::Arc;
use tracing::instrument;

use super::ServiceContext;
use crate::errors::InferraResult;
use crate::resilience::ResilienceOrchestrator;
use crate::transport::{EventStream, OutboundRequest, RequestPipeline};
use crate::types::chat::{ChatCompletion, ChatCompletionChunk, ChatOptions, ChatRequest, Message};
use crate::types::models::endpoints;

/// Chat completions service.
#[derive(Debug, Clone)]
pub struct ChatService {
    context: ServiceContext,
}

impl ChatService {
    /// Creates a new chat service.
    pub fn new(pipeline: Arc<RequestPipeline>, resilience: Arc<ResilienceOrchestrator>) -> Self {
        Self::from_context(ServiceContext::new(pipeline, resilience))
    }

    pub(crate) fn from_context(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Creates a chat completion.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn create(&self, mut request: ChatRequest) -> InferraResult<ChatCompletion> {
        request.validate()?;
        request.stream = false;

        let outbound = OutboundRequest::post(endpoints::CHAT).json(serde_json::to_value(&request)?);
        self.context.call_json(&outbound).await
    }

    /// Creates a streaming chat completion.
    ///
    /// Retries cover the request up to the first byte of the body. Once
    /// events are flowing, a failure ends the stream with an error.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn create_stream(
        &self,
        mut request: ChatRequest,
    ) -> InferraResult<EventStream<ChatCompletionChunk>> {
        request.validate()?;
        request.stream = true;

        let outbound = OutboundRequest::post(endpoints::CHAT)
            .json(serde_json::to_value(&request)?)
            .streaming(true);
        let body = self.context.call(&outbound).await?;
        Ok(EventStream::from_bytes(body.into_stream()?))
    }

    /// Runs one completion per conversation concurrently.
    ///
    /// Results are in input order. Every conversation is validated before
    /// any request is sent. Requests beyond the bucket's burst wait for
    /// refill instead of failing; the first error drops the rest.
    #[instrument(skip(self, conversations, options), fields(count = conversations.len()))]
    pub async fn create_many(
        &self,
        model: &str,
        conversations: Vec<Vec<Message>>,
        options: &ChatOptions,
    ) -> InferraResult<Vec<ChatCompletion>> {
        let requests = conversations
            .into_iter()
            .map(|messages| ChatRequest::with_options(model, messages, options))
            .collect::<Vec<_>>();

        let outbound = requests
            .iter()
            .map(|request| -> InferraResult<OutboundRequest> {
                request.validate()?;
                let body = serde_json::to_value(request)?;
                Ok(OutboundRequest::post(endpoints::CHAT).json(body))
            })
            .collect::<InferraResult<Vec<_>>>()?;

        self.context.call_all(outbound).await
    }
}
