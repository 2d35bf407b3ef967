//! Repository layout and analysis settings.
//!
//! Configuration is loaded from environment variables with defaults matching
//! the layout written by the mirroring tooling.

use serde::{Deserialize, Serialize};

/// Default directory holding identity bindings.
pub const DEFAULT_IDENTITY_ROOT: &str = "auth";

/// Default directory holding policy documents.
pub const DEFAULT_POLICY_ROOT: &str = "sys/policies/acl";

/// Default number of identities evaluated at once during a tree walk.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Change-impact analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitOpsConfig {
    /// Repository-relative directory holding identity bindings.
    pub identity_root: String,

    /// Repository-relative directory holding policy documents.
    pub policy_root: String,

    /// Maximum identities evaluated concurrently.
    pub max_concurrency: usize,

    /// Revision to compare the working copy against. Resolved from the
    /// repository when unset.
    pub compare_ref: Option<String>,
}

impl Default for GitOpsConfig {
    fn default() -> Self {
        Self {
            identity_root: DEFAULT_IDENTITY_ROOT.to_string(),
            policy_root: DEFAULT_POLICY_ROOT.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            compare_ref: None,
        }
    }
}

impl GitOpsConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RSOP_IDENTITY_ROOT`: identity directory (default: auth)
    /// - `RSOP_POLICY_ROOT`: policy directory (default: sys/policies/acl)
    /// - `RSOP_MAX_CONCURRENCY`: tree-walk concurrency (default: 5)
    /// - `RSOP_COMPARE_REF`: comparison revision (default: resolved from git)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            identity_root: std::env::var("RSOP_IDENTITY_ROOT").unwrap_or(default.identity_root),
            policy_root: std::env::var("RSOP_POLICY_ROOT").unwrap_or(default.policy_root),
            max_concurrency: std::env::var("RSOP_MAX_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(default.max_concurrency),
            compare_ref: std::env::var("RSOP_COMPARE_REF").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Set the comparison revision.
    pub fn with_compare_ref(mut self, compare_ref: impl Into<String>) -> Self {
        self.compare_ref = Some(compare_ref.into());
        self
    }

    /// Repository path of a policy document.
    pub fn policy_path(&self, name: &str) -> String {
        format!("{}/{}", self.policy_root.trim_end_matches('/'), name)
    }
}
