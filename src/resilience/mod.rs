//! Resilience layer for the Inferra client.
//!
//! Provides the token-bucket rate limiter and the exponential-backoff retry
//! policy, plus an orchestrator that composes them so that every attempt
//! re-acquires from the bucket.

mod rate_limit;
mod retry;

pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use retry::{RetryConfig, RetryPolicy};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::InferraError;

/// Configuration for the resilience orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Rate limiter configuration.
    pub rate_limit: RateLimiterConfig,
}

/// Composes the shared rate limiter with a retry policy.
///
/// The retry policy wraps the whole attempt, so a retried call goes back
/// through [`RateLimiter::acquire`] each time.
pub struct ResilienceOrchestrator {
    retry_policy: RetryPolicy,
    rate_limiter: Arc<RateLimiter>,
}

impl ResilienceOrchestrator {
    /// Creates a new resilience orchestrator with its own rate limiter.
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            retry_policy: RetryPolicy::new(config.retry),
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
        }
    }

    /// Creates an orchestrator around an existing limiter and policy.
    pub fn with_parts(retry_policy: RetryPolicy, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            retry_policy,
            rate_limiter,
        }
    }

    /// Executes `operation` under the retry policy, acquiring `cost` tokens
    /// before every attempt.
    pub async fn execute<F, Fut, T>(&self, cost: u32, operation: F) -> Result<T, InferraError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, InferraError>>,
    {
        self.run(cost, false, operation).await
    }

    /// Waits until `cost` tokens have been debited, sleeping out every
    /// refusal. Fails at once when `cost` exceeds the bucket capacity.
    ///
    /// Pair with [`ResilienceOrchestrator::execute_admitted`], which does not
    /// debit again for the first attempt.
    pub async fn admit(&self, cost: u32) -> Result<(), InferraError> {
        if cost > self.rate_limiter.burst() {
            return self.rate_limiter.acquire(cost).await;
        }
        loop {
            match self.rate_limiter.acquire(cost).await {
                Err(InferraError::RateLimit {
                    retry_after: Some(wait),
                    ..
                }) => tokio::time::sleep(wait).await,
                other => return other,
            }
        }
    }

    /// Like [`ResilienceOrchestrator::execute`], for a call whose first
    /// attempt was paid for by [`ResilienceOrchestrator::admit`]. Retries
    /// acquire as usual.
    pub async fn execute_admitted<F, Fut, T>(
        &self,
        cost: u32,
        operation: F,
    ) -> Result<T, InferraError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, InferraError>>,
    {
        self.run(cost, true, operation).await
    }

    async fn run<F, Fut, T>(&self, cost: u32, prepaid: bool, operation: F) -> Result<T, InferraError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, InferraError>>,
    {
        let limiter = &self.rate_limiter;
        let operation = &operation;
        let prepaid = &AtomicBool::new(prepaid);
        self.retry_policy
            .execute(move || async move {
                if !prepaid.swap(false, Ordering::Relaxed) {
                    limiter.acquire(cost).await?;
                }
                operation().await
            })
            .await
    }

    /// Returns the shared rate limiter.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    /// Returns the retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Default for ResilienceOrchestrator {
    fn default() -> Self {
        Self::new(ResilienceConfig::default())
    }
}

impl std::fmt::Debug for ResilienceOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceOrchestrator")
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}
