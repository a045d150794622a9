//! Observability module for the Inferra client.
//!
//! Diagnostics are emitted as `tracing` events and spans. Exchange counts,
//! latency, retries and local rate-limit rejections are collected through a
//! [`MetricsCollector`] that the client shares with the pipeline, the retry
//! policy and the rate limiter.

mod logging;
mod metrics;

pub use logging::{init_tracing, redact, LogConfig, LogFormat, LogLevel};
pub use metrics::{DefaultMetricsCollector, MetricsCollector, RequestMetrics};
