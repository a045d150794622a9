//! Inferra API client.
//!
//! Provides the main client interface for interacting with the Inferra API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{ApiKeyAuth, AuthProvider};
use crate::config::{InferraConfig, InferraConfigBuilder};
use crate::errors::InferraResult;
use crate::observability::{DefaultMetricsCollector, MetricsCollector, RequestMetrics};
use crate::resilience::{RateLimiter, ResilienceOrchestrator, RetryConfig, RetryPolicy};
use crate::services::{
    BatchService, ChatService, CompletionsService, FilesService, ServiceContext,
};
use crate::transport::{HttpTransport, HttpTransportImpl, RequestPipeline};

/// The main Inferra client.
///
/// Every service shares one rate limiter, one request pipeline and one retry
/// policy, so the configured request rate bounds the client as a whole.
///
/// # Example
///
/// ```rust,no_run
/// use inferra_client::{ChatRequest, InferraClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = InferraClient::builder()
///         .api_key("your-api-key")
///         .build()?;
///
///     let request = ChatRequest::builder()
///         .model("meta-llama/llama-3.1-8b-instruct/fp-8")
///         .user("Hello!")
///         .build()?;
///
///     let response = client.chat().create(request).await?;
///     println!("{}", response.content().unwrap_or_default());
///
///     client.close().await;
///     Ok(())
/// }
/// ```
pub struct InferraClient {
    config: InferraConfig,
    pipeline: Arc<RequestPipeline>,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<dyn MetricsCollector>,
    chat_service: ChatService,
    completions_service: CompletionsService,
    batch_service: BatchService,
    files_service: FilesService,
}

impl InferraClient {
    /// Creates a new client builder.
    pub fn builder() -> InferraClientBuilder {
        InferraClientBuilder::new()
    }

    /// Creates a client from environment variables.
    ///
    /// Reads `INFERRA_API_KEY` and the optional `INFERRA_*` settings
    /// documented on [`InferraConfig::from_env`].
    pub fn from_env() -> InferraResult<Self> {
        let config = InferraConfig::from_env()?;
        InferraClientBuilder::from_config(config).build()
    }

    /// Creates a client from an API key.
    pub fn from_api_key(api_key: impl Into<String>) -> InferraResult<Self> {
        InferraClientBuilder::new().api_key(api_key).build()
    }

    /// Returns the chat service.
    pub fn chat(&self) -> &ChatService {
        &self.chat_service
    }

    /// Returns the completions service.
    pub fn completions(&self) -> &CompletionsService {
        &self.completions_service
    }

    /// Returns the batch service.
    pub fn batch(&self) -> &BatchService {
        &self.batch_service
    }

    /// Returns the files service.
    pub fn files(&self) -> &FilesService {
        &self.files_service
    }

    /// Returns the configuration.
    pub fn config(&self) -> &InferraConfig {
        &self.config
    }

    /// Returns the rate limiter shared by every service.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Returns a snapshot of the request metrics.
    pub fn metrics(&self) -> RequestMetrics {
        self.metrics.snapshot()
    }

    /// Releases the connection pool. Safe to call more than once; a request
    /// issued afterwards opens a new pool.
    pub async fn close(&self) {
        self.pipeline.close().await;
        tracing::debug!("Inferra client closed");
    }
}

impl std::fmt::Debug for InferraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferraClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for the Inferra client.
pub struct InferraClientBuilder {
    config_builder: InferraConfigBuilder,
    config: Option<InferraConfig>,
    transport: Option<Arc<dyn HttpTransport>>,
    auth: Option<Arc<dyn AuthProvider>>,
    retry_config: Option<RetryConfig>,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl InferraClientBuilder {
    /// Creates a new client builder.
    pub fn new() -> Self {
        Self {
            config_builder: InferraConfigBuilder::new(),
            config: None,
            transport: None,
            auth: None,
            retry_config: None,
            metrics: None,
        }
    }

    /// Creates a builder from a finished configuration. Configuration
    /// setters on the builder are ignored afterwards.
    pub fn from_config(config: InferraConfig) -> Self {
        Self {
            config: Some(config),
            ..Self::new()
        }
    }

    /// Sets the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.api_key(api_key);
        self
    }

    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(base_url);
        self
    }

    /// Sets the per-exchange timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Sets the maximum retry attempts. Ignored when
    /// [`InferraClientBuilder::retry_config`] is also given.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config_builder = self.config_builder.max_retries(retries);
        self
    }

    /// Sets the client-side request rate.
    pub fn requests_per_minute(mut self, rpm: u32) -> Self {
        self.config_builder = self.config_builder.requests_per_minute(rpm);
        self
    }

    /// Sets the token-bucket capacity.
    pub fn burst_size(mut self, burst: u32) -> Self {
        self.config_builder = self.config_builder.burst_size(burst);
        self
    }

    /// Adds a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.header(name, value);
        self
    }

    /// Sets a custom transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets a custom auth provider.
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Replaces the retry configuration, including its `max_retries`.
    ///
    /// Without it the policy uses [`RetryConfig`] defaults with
    /// `max_retries` from the client configuration.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    /// Sets a custom metrics collector.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the client.
    pub fn build(self) -> InferraResult<InferraClient> {
        self.build_with(&|name| std::env::var(name).ok())
    }

    /// Builds the client, resolving unset settings through `lookup`.
    pub(crate) fn build_with(
        self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> InferraResult<InferraClient> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_builder.build_with(lookup)?,
        };

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransportImpl::new(&config.base_url, config.timeout)),
        };

        let auth: Arc<dyn AuthProvider> = match self.auth {
            Some(a) => a,
            None => Arc::new(ApiKeyAuth::new(config.api_key().clone())),
        };
        auth.check()?;

        let metrics: Arc<dyn MetricsCollector> = match self.metrics {
            Some(m) => m,
            None => Arc::new(DefaultMetricsCollector::new()),
        };

        let headers: HashMap<String, String> = config.custom_headers.iter().cloned().collect();
        let pipeline = Arc::new(
            RequestPipeline::new(transport, auth)
                .with_headers(headers)
                .with_metrics(Arc::clone(&metrics)),
        );

        let rate_limiter = Arc::new(
            RateLimiter::per_minute(config.requests_per_minute, config.burst_size)
                .with_metrics(Arc::clone(&metrics)),
        );

        let retry_config = match self.retry_config {
            Some(retry_config) => {
                if retry_config.max_retries != config.max_retries {
                    tracing::warn!(
                        configured = config.max_retries,
                        effective = retry_config.max_retries,
                        "Retry configuration overrides max_retries"
                    );
                }
                retry_config
            }
            None => RetryConfig::new().max_retries(config.max_retries),
        };
        let retry_policy = RetryPolicy::new(retry_config).with_metrics(Arc::clone(&metrics));

        let resilience = Arc::new(ResilienceOrchestrator::with_parts(
            retry_policy,
            Arc::clone(&rate_limiter),
        ));
        let context = ServiceContext::new(Arc::clone(&pipeline), resilience);

        tracing::debug!(
            base_url = %config.base_url,
            requests_per_minute = config.requests_per_minute,
            max_retries = config.max_retries,
            "Inferra client built"
        );

        Ok(InferraClient {
            chat_service: ChatService::from_context(context.clone()),
            completions_service: CompletionsService::from_context(context.clone()),
            batch_service: BatchService::from_context(context.clone()),
            files_service: FilesService::from_context(context),
            config,
            pipeline,
            rate_limiter,
            metrics,
        })
    }
}

impl Default for InferraClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InferraClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferraClientBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
