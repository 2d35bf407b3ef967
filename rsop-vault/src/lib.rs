//! # RSoP Vault
//!
//! Secrets service integration for Resultant Set of Policy analysis.
//!
//! ## Overview
//!
//! The rsop-vault crate handles:
//! - **Client**: An HTTP client for the service's policy, auth mount and
//!   token endpoints, with retries on transient failures
//! - **Mirroring**: Downloading every policy and identity binding into the
//!   directory layout the change-impact analysis reads
//! - **Provider**: Resolving a token, token accessor or role path into an
//!   RSoP, reading policies from a local directory when available
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rsop_vault::{ReadthroughPolicyProvider, VaultClient, VaultConfig};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VaultConfig::from_env();
//!     let token = config.require_token()?.to_string();
//!     let provider = ReadthroughPolicyProvider::new(None, Some(VaultClient::new(config)?));
//!
//!     let rsop = provider.get_rsop(&token).await?;
//!     print!("{}", rsop.capability_map().to_policy_document());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod mirror;
pub mod provider;
pub mod retry;
pub mod source;

// Re-export main types for convenience
pub use client::VaultClient;
pub use config::{ConfigError, VaultConfig};
pub use error::{VaultError, VaultResult};
pub use mirror::{download_all, download_identities, download_policies, MirrorSummary};
pub use provider::{guess_auth_kind, AuthKind, ReadthroughPolicyProvider};
pub use retry::RetryConfig;
pub use source::{identity_endpoints, AuthMount, IdentityEndpoint, PolicySource};
