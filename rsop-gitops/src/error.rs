//! Error types for change-impact analysis
//!
//! Errors are split into item-scoped failures, which spoil one identity's
//! differential but let the run continue, and run-wide failures, which abort.

use rsop_policy::PolicyError;
use thiserror::Error;

/// Change-impact analysis error types.
#[derive(Debug, Error)]
pub enum GitOpsError {
    /// A policy document failed to parse
    #[error("Policy parse error: {0}")]
    Policy(#[from] PolicyError),

    /// An identity binding is not a valid JSON document
    #[error("Invalid identity binding at '{path}': {message}")]
    InvalidBinding {
        /// Repository path of the binding
        path: String,
        /// Decoder message
        message: String,
    },

    /// A file does not exist at a revision
    #[error("File '{path}' not found at revision '{revision}'")]
    NotFound {
        /// Revision that was read
        revision: String,
        /// Repository path that was read
        path: String,
    },

    /// The identity root directory does not exist
    #[error("Identity directory '{0}' not found - wrong directory specified?")]
    IdentityRootMissing(String),

    /// No comparison revision could be determined
    #[error("Unable to determine a comparison revision: {0}")]
    NoComparisonRevision(String),

    /// The repository collaborator failed
    #[error("Repository error: {0}")]
    Repository(String),

    /// The caller cancelled the run
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for change-impact operations.
pub type GitOpsResult<T> = Result<T, GitOpsError>;

impl GitOpsError {
    /// Check if this error only affects the item being processed.
    ///
    /// Parse failures and missing policy files spoil a single identity's
    /// differential. Everything else aborts the run.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            GitOpsError::Policy(_) | GitOpsError::InvalidBinding { .. } | GitOpsError::NotFound { .. }
        )
    }

    /// Check if this is a missing-file error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitOpsError::NotFound { .. })
    }

    /// Get an error code for reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            GitOpsError::Policy(_) => "POLICY_PARSE_ERROR",
            GitOpsError::InvalidBinding { .. } => "BINDING_PARSE_ERROR",
            GitOpsError::NotFound { .. } => "NOT_FOUND",
            GitOpsError::IdentityRootMissing(_) => "IDENTITY_ROOT_MISSING",
            GitOpsError::NoComparisonRevision(_) => "NO_COMPARISON_REVISION",
            GitOpsError::Repository(_) => "REPOSITORY_ERROR",
            GitOpsError::Cancelled => "CANCELLED",
        }
    }
}
