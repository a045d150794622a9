//! Client-side rate limiting using a token bucket.
//!
//! Refill is lazy: each acquisition tops the bucket up from the monotonic
//! time elapsed since the previous one. The limiter never sleeps. A shortfall
//! is reported as a rate-limit error carrying the wait, and the retry policy
//! decides whether to wait it out.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::errors::{InferraError, InferraResult, RateLimitScope};
use crate::observability::MetricsCollector;

/// Configuration for the token bucket.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Sustained request rate.
    pub requests_per_minute: u32,
    /// Bucket capacity. Defaults to `requests_per_minute`.
    pub burst_size: Option<u32>,
}

impl RateLimiterConfig {
    /// Creates a configuration for the given sustained rate.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size: None,
        }
    }

    /// Sets the burst size.
    pub fn burst_size(mut self, burst_size: u32) -> Self {
        self.burst_size = Some(burst_size);
        self
    }

    fn burst(&self) -> u32 {
        self.burst_size.unwrap_or(self.requests_per_minute)
    }

    fn capacity(&self) -> f64 {
        f64::from(self.burst())
    }

    fn refill_rate(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60.0
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_REQUESTS_PER_MINUTE)
    }
}

/// Token bucket state.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Debits `cost` tokens, or returns the time until they would be available.
    fn try_consume(&mut self, cost: f64, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= cost {
            self.tokens -= cost;
            Ok(())
        } else {
            let needed = cost - self.tokens;
            Err(Duration::try_from_secs_f64(needed / self.refill_rate).unwrap_or(Duration::MAX))
        }
    }
}

/// Concurrency-safe token-bucket rate limiter.
///
/// One instance is owned by the client and shared by every API surface.
/// The lock covers only the refill arithmetic and the debit; no I/O happens
/// while it is held.
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    burst: u32,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl RateLimiter {
    /// Creates a new rate limiter. The bucket starts full.
    pub fn new(config: &RateLimiterConfig) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(config.capacity(), config.refill_rate())),
            burst: config.burst(),
            metrics: None,
        }
    }

    /// Counts every refused acquisition in the given collector.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Creates a limiter from a requests-per-minute rate and optional burst.
    pub fn per_minute(requests_per_minute: u32, burst_size: Option<u32>) -> Self {
        Self::new(&RateLimiterConfig {
            requests_per_minute,
            burst_size,
        })
    }

    /// Attempts to debit `cost` tokens.
    ///
    /// Returns immediately. When the bucket holds fewer than `cost` tokens the
    /// bucket is left untouched and an [`InferraError::RateLimit`] is returned
    /// whose `retry_after` is `(cost - tokens) / refill_rate`.
    pub async fn acquire(&self, cost: u32) -> InferraResult<()> {
        let outcome = {
            let mut bucket = self.bucket.lock().await;
            bucket.try_consume(f64::from(cost), Instant::now())
        };

        outcome.map_err(|wait| {
            tracing::debug!(cost, wait_ms = wait.as_millis(), "Local rate limit reached");
            if let Some(metrics) = &self.metrics {
                metrics.record_rate_limited();
            }
            InferraError::RateLimit {
                message: format!(
                    "Rate limit exceeded. Try again in {:.1} seconds.",
                    wait.as_secs_f64()
                ),
                retry_after: Some(wait),
                scope: RateLimitScope::Local,
            }
        })
    }

    /// Returns the tokens currently available, after applying refill.
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now());
        bucket.tokens
    }

    /// Returns the bucket capacity (burst size).
    pub async fn capacity(&self) -> f64 {
        self.bucket.lock().await.capacity
    }

    /// Returns the burst size as a whole number of requests.
    pub fn burst(&self) -> u32 {
        self.burst
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}
