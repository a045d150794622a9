//! Configuration module for the Inferra client.
//!
//! A configuration is fixed at construction time. It carries the endpoint,
//! the credential, the per-exchange timeout, the retry budget and the
//! client-side rate limit shared by every API surface.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use url::Url;

use crate::auth::key_hint;
use crate::errors::{InferraError, InferraResult};

/// Default base URL for the Inferra API.
pub const DEFAULT_BASE_URL: &str = "https://api.inferra.net/v1";

/// Default request timeout (60 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum retry attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default client-side request rate.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 500;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "INFERRA_API_KEY";

const MISSING_KEY_MESSAGE: &str =
    "API key must be provided or set in INFERRA_API_KEY environment variable";

/// Configuration for the Inferra client.
#[derive(Clone)]
pub struct InferraConfig {
    /// API key for authentication (stored securely).
    pub(crate) api_key: SecretString,
    /// Base URL for API requests, without a trailing slash.
    pub base_url: String,
    /// Timeout applied to every HTTP exchange.
    pub timeout: Duration,
    /// Maximum retry attempts after the first.
    pub max_retries: u32,
    /// Sustained client-side request rate.
    pub requests_per_minute: u32,
    /// Token-bucket capacity. Defaults to `requests_per_minute`.
    pub burst_size: Option<u32>,
    /// Custom headers to include in requests.
    pub custom_headers: Vec<(String, String)>,
}

impl InferraConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> InferraConfigBuilder {
        InferraConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `INFERRA_API_KEY` (required): API key for authentication
    /// - `INFERRA_BASE_URL` (optional): Custom base URL
    /// - `INFERRA_TIMEOUT` (optional): Request timeout in seconds
    /// - `INFERRA_MAX_RETRIES` (optional): Maximum retry attempts
    /// - `INFERRA_REQUESTS_PER_MINUTE` (optional): Client-side rate limit
    /// - `INFERRA_BURST_SIZE` (optional): Token-bucket capacity
    pub fn from_env() -> InferraResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> InferraResult<Self> {
        let mut builder = InferraConfigBuilder::new();

        if let Some(api_key) = lookup(API_KEY_ENV) {
            builder = builder.api_key(api_key);
        }

        if let Some(base_url) = lookup("INFERRA_BASE_URL") {
            builder = builder.base_url(base_url);
        }

        if let Some(secs) = parse_var::<f64>(&lookup, "INFERRA_TIMEOUT") {
            if let Ok(timeout) = Duration::try_from_secs_f64(secs) {
                builder = builder.timeout(timeout);
            }
        }

        if let Some(retries) = parse_var::<u32>(&lookup, "INFERRA_MAX_RETRIES") {
            builder = builder.max_retries(retries);
        }

        if let Some(rpm) = parse_var::<u32>(&lookup, "INFERRA_REQUESTS_PER_MINUTE") {
            builder = builder.requests_per_minute(rpm);
        }

        if let Some(burst) = parse_var::<u32>(&lookup, "INFERRA_BURST_SIZE") {
            builder = builder.burst_size(burst);
        }

        builder.build_with(&lookup)
    }

    /// Returns the API key (exposing the secret).
    pub(crate) fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    /// Returns the API key hint (last 4 characters) for debugging.
    pub fn api_key_hint(&self) -> String {
        key_hint(self.api_key.expose_secret())
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

impl std::fmt::Debug for InferraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferraConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("burst_size", &self.burst_size)
            .finish()
    }
}

/// Builder for `InferraConfig`.
#[derive(Default)]
pub struct InferraConfigBuilder {
    api_key: Option<SecretString>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    requests_per_minute: Option<u32>,
    burst_size: Option<u32>,
    custom_headers: Vec<(String, String)>,
}

impl InferraConfigBuilder {
    /// Creates a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. When unset, `INFERRA_API_KEY` is consulted at build time.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into()));
        self
    }

    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the maximum retry attempts.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the client-side request rate.
    pub fn requests_per_minute(mut self, requests_per_minute: u32) -> Self {
        self.requests_per_minute = Some(requests_per_minute);
        self
    }

    /// Sets the token-bucket capacity.
    pub fn burst_size(mut self, burst_size: u32) -> Self {
        self.burst_size = Some(burst_size);
        self
    }

    /// Adds a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> InferraResult<InferraConfig> {
        self.build_with(&|name| std::env::var(name).ok())
    }

    pub(crate) fn build_with(
        self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> InferraResult<InferraConfig> {
        let api_key = self
            .api_key
            .or_else(|| lookup(API_KEY_ENV).map(SecretString::new))
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| InferraError::Configuration {
                message: MISSING_KEY_MESSAGE.to_string(),
            })?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let parsed = Url::parse(&base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(InferraError::Configuration {
                message: format!("Base URL must use http or https, got {}", parsed.scheme()),
            });
        }
        if parsed.scheme() == "http" {
            tracing::warn!(base_url = %base_url, "Base URL does not use HTTPS");
        }

        let requests_per_minute = self
            .requests_per_minute
            .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE);
        if requests_per_minute == 0 {
            return Err(InferraError::Configuration {
                message: "requests_per_minute must be greater than 0".to_string(),
            });
        }

        if self.burst_size == Some(0) {
            return Err(InferraError::Configuration {
                message: "burst_size must be greater than 0".to_string(),
            });
        }

        Ok(InferraConfig {
            api_key,
            base_url,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            requests_per_minute,
            burst_size: self.burst_size,
            custom_headers: self.custom_headers,
        })
    }
}
