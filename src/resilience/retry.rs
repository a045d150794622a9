//! Retry policy with capped exponential backoff.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::errors::{ErrorKind, InferraError};
use crate::observability::MetricsCollector;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single sleep.
    pub max_delay: Duration,
    /// Factor applied to the delay after every retry.
    pub multiplier: f64,
    /// Error kinds that are re-attempted. Anything else propagates at once.
    pub retry_on: HashSet<ErrorKind>,
    /// Whether to add up to 25% random jitter to computed delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            retry_on: ErrorKind::API.into_iter().collect(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the initial delay.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the multiplier.
    pub fn multiplier(mut self, mult: f64) -> Self {
        self.multiplier = mult;
        self
    }

    /// Replaces the set of retryable error kinds.
    pub fn retry_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    /// Sets whether to use jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Creates a configuration with no retries.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Retry combinator with exponential backoff.
///
/// Wraps a fallible async operation. The operation is invoked at most
/// `max_retries + 1` times. A rate-limit error carrying a wait hint replaces
/// the scheduled delay with that hint; every other retryable error uses the
/// schedule. After the last attempt the original error is returned unchanged.
pub struct RetryPolicy {
    config: RetryConfig,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl RetryPolicy {
    /// Creates a new retry policy.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    /// Creates a retry policy with default configuration.
    pub fn default_policy() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Records every retry in the given metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Returns true if `error` belongs to a retryable kind.
    pub fn should_retry(&self, error: &InferraError) -> bool {
        self.config.retry_on.contains(&error.kind())
    }

    /// Executes an operation with retries.
    #[instrument(skip(self, operation), fields(max_retries = self.config.max_retries))]
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, InferraError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, InferraError>>,
    {
        let mut attempt: u32 = 0;
        let mut delay = self.config.initial_delay.as_secs_f64();

        loop {
            let err = match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => err,
            };

            if !self.should_retry(&err) {
                return Err(err);
            }

            if attempt >= self.config.max_retries {
                tracing::warn!(
                    attempts = attempt + 1,
                    error = %err,
                    "Retries exhausted"
                );
                return Err(err);
            }

            // A server- or bucket-advertised wait replaces the schedule.
            if let Some(retry_after) = err.retry_after() {
                delay = retry_after.as_secs_f64();
            }

            let sleep_for = self.sleep_duration(delay);

            tracing::info!(
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = sleep_for.as_millis(),
                error = %err,
                "Retrying after error"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_retry(err.kind());
            }

            tokio::time::sleep(sleep_for).await;
            delay *= self.config.multiplier;
            attempt += 1;
        }
    }

    /// Caps `delay` (seconds) at `max_delay` and applies jitter when enabled.
    fn sleep_duration(&self, delay: f64) -> Duration {
        let capped = delay.min(self.config.max_delay.as_secs_f64()).max(0.0);
        let capped = if self.config.jitter {
            let jitter = rand::random::<f64>() * 0.25;
            (capped * (1.0 + jitter)).min(self.config.max_delay.as_secs_f64())
        } else {
            capped
        };
        Duration::try_from_secs_f64(capped).unwrap_or(self.config.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish()
    }
}
