//! Request metrics.
//!
//! The pipeline reports every classified exchange, the retry policy every
//! scheduled retry, and the token bucket every refused acquisition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::errors::ErrorKind;

/// Sink for client metrics.
pub trait MetricsCollector: Send + Sync {
    /// Records one classified exchange under its endpoint label, such as
    /// `/files/{id}`. `failure` is `None` for a 2xx.
    fn record_exchange(&self, endpoint: &str, failure: Option<ErrorKind>, latency: Duration);

    /// Records a retry scheduled after an error of `kind`.
    fn record_retry(&self, kind: ErrorKind);

    /// Records an acquisition refused by the local token bucket.
    fn record_rate_limited(&self);

    /// Returns everything recorded so far.
    fn snapshot(&self) -> RequestMetrics;

    /// Clears all counters.
    fn reset(&self);
}

/// Point-in-time view of the collected metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetrics {
    /// HTTP exchanges performed, retries included.
    pub exchanges: u64,
    /// Exchanges that returned 2xx.
    pub succeeded: u64,
    /// Summed exchange latency.
    pub latency: Duration,
    /// Retries scheduled by the retry policy.
    pub retries: u64,
    /// Acquisitions refused by the local token bucket.
    pub rate_limited: u64,
    /// Exchanges per endpoint label.
    pub by_endpoint: HashMap<String, u64>,
    /// Failed exchanges per error kind.
    pub failures: HashMap<ErrorKind, u64>,
}

impl RequestMetrics {
    /// Failed exchanges of any kind.
    pub fn failed(&self) -> u64 {
        self.failures.values().sum()
    }

    /// Failed exchanges of one kind.
    pub fn failures_of(&self, kind: ErrorKind) -> u64 {
        self.failures.get(&kind).copied().unwrap_or(0)
    }

    /// Mean latency per exchange, zero before the first one.
    pub fn mean_latency(&self) -> Duration {
        match u32::try_from(self.exchanges) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.latency / n,
            Err(_) => self.latency / u32::MAX,
        }
    }
}

#[derive(Debug, Default)]
struct Tallies {
    by_endpoint: HashMap<String, u64>,
    failures: HashMap<ErrorKind, u64>,
}

/// In-memory collector backed by atomics.
#[derive(Debug, Default)]
pub struct DefaultMetricsCollector {
    exchanges: AtomicU64,
    succeeded: AtomicU64,
    latency_micros: AtomicU64,
    retries: AtomicU64,
    rate_limited: AtomicU64,
    tallies: Mutex<Tallies>,
}

impl DefaultMetricsCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    fn tallies(&self) -> MutexGuard<'_, Tallies> {
        self.tallies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsCollector for DefaultMetricsCollector {
    fn record_exchange(&self, endpoint: &str, failure: Option<ErrorKind>, latency: Duration) {
        self.exchanges.fetch_add(1, Ordering::Relaxed);
        if failure.is_none() {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_micros.fetch_add(micros, Ordering::Relaxed);

        let mut tallies = self.tallies();
        *tallies.by_endpoint.entry(endpoint.to_string()).or_default() += 1;
        if let Some(kind) = failure {
            *tallies.failures.entry(kind).or_default() += 1;
        }
    }

    fn record_retry(&self, _kind: ErrorKind) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RequestMetrics {
        let tallies = self.tallies();
        RequestMetrics {
            exchanges: self.exchanges.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            latency: Duration::from_micros(self.latency_micros.load(Ordering::Relaxed)),
            retries: self.retries.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            by_endpoint: tallies.by_endpoint.clone(),
            failures: tallies.failures.clone(),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.exchanges,
            &self.succeeded,
            &self.latency_micros,
            &self.retries,
            &self.rate_limited,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.tallies() = Tallies::default();
    }
}
