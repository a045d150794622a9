//! Request authentication.
//!
//! Inferra accepts a static API key sent as a bearer token.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;

use crate::errors::{InferraError, InferraResult};

const AUTHORIZATION: &str = "Authorization";

/// Supplies credentials for outbound requests.
///
/// The pipeline calls [`AuthProvider::authorize`] once per attempt, after
/// the default headers are in place.
pub trait AuthProvider: Send + Sync {
    /// Adds credentials to `headers`.
    fn authorize(&self, headers: &mut HashMap<String, String>);

    /// Rejects credentials that can never succeed. Called once at build time.
    fn check(&self) -> InferraResult<()>;
}

/// Bearer-token authentication with an Inferra API key.
pub struct ApiKeyAuth {
    key: SecretString,
}

impl ApiKeyAuth {
    /// Wraps an already secret key.
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }

    /// Wraps a plain key.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self::new(SecretString::new(key.into()))
    }

    /// Masked form of the key, safe for logs.
    pub fn key_hint(&self) -> String {
        key_hint(self.key.expose_secret())
    }
}

/// Masks all but the last four characters of a key.
pub(crate) fn key_hint(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = key.chars().skip(count - 4).collect();
    format!("...{tail}")
}

impl AuthProvider for ApiKeyAuth {
    fn authorize(&self, headers: &mut HashMap<String, String>) {
        let value = format!("Bearer {}", self.key.expose_secret());
        headers.insert(AUTHORIZATION.to_string(), value);
    }

    fn check(&self) -> InferraResult<()> {
        if self.key.expose_secret().trim().is_empty() {
            return Err(InferraError::Configuration {
                message: "API key cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKeyAuth({})", self.key_hint())
    }
}
