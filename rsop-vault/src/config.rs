//! Secrets service connection configuration.
//!
//! Loaded from the same environment variables the service's own CLI reads,
//! with defaults for a local development server.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Connection settings for the secrets service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Base address, e.g. `https://vault.example.com:8200`.
    pub address: String,

    /// Token sent as `X-Vault-Token`.
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Namespace sent as `X-Vault-Namespace`.
    pub namespace: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Retries after a transient failure.
    pub max_retries: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "https://127.0.0.1:8200".to_string(),
            token: None,
            namespace: None,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

impl VaultConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `VAULT_ADDR`: service address (default: https://127.0.0.1:8200)
    /// - `VAULT_TOKEN`: client token
    /// - `VAULT_NAMESPACE`: namespace
    /// - `VAULT_CLIENT_TIMEOUT`: request timeout in seconds, optionally
    ///   suffixed with `s` (default: 60)
    /// - `VAULT_MAX_RETRIES`: retries after a transient failure (default: 2)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            address: std::env::var("VAULT_ADDR").unwrap_or(default.address),
            token: std::env::var("VAULT_TOKEN").ok().filter(|s| !s.is_empty()),
            namespace: std::env::var("VAULT_NAMESPACE").ok().filter(|s| !s.is_empty()),
            timeout_secs: std::env::var("VAULT_CLIENT_TIMEOUT")
                .ok()
                .and_then(|s| s.trim_end_matches('s').parse().ok())
                .unwrap_or(default.timeout_secs),
            max_retries: std::env::var("VAULT_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_retries),
        }
    }

    /// Create a configuration for `address` with `token`.
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: Some(token.into()),
            ..Default::default()
        }
    }

    /// Get the request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build a full URL for an API path such as `sys/auth`.
    pub fn url(&self, path: &str) -> String {
        let base = self.address.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/v1/{}", base, path)
    }

    /// Validate that a token is configured.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("VAULT_TOKEN".to_string()))
    }

    /// Validate the address.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.address.starts_with("http://") || self.address.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "VAULT_ADDR".to_string(),
                message: format!("'{}' is not an http(s) address", self.address),
            });
        }
        Ok(())
    }
}
