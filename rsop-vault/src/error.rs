//! Error types for secrets service operations

use rsop_policy::PolicyError;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Secrets service client errors.
#[derive(Debug, Error)]
pub enum VaultError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The service returned an error response
    #[error("API error ({status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error body returned by the service
        message: String,
    },

    /// The response body did not have the expected shape
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Nothing exists at the requested path
    #[error("Not found: {0}")]
    NotFound(String),

    /// The token was rejected
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// No client was configured for an operation that needs one
    #[error("A secrets service client is required but not configured")]
    ClientRequired,

    /// Identities cannot be enumerated for this kind of auth mount
    #[error("Unknown paths for listing identities of mount '{mount}' with type '{kind}'")]
    UnknownMountType {
        /// Mount path
        mount: String,
        /// Mount type reported by the service
        kind: String,
    },

    /// The argument is not a token, accessor or role path
    #[error("Could not guess the auth kind of '{0}'")]
    UnrecognizedAuthThing(String),

    /// A role definition has no token policies
    #[error(".data.token_policies not present at role path '{0}'")]
    MissingTokenPolicies(String),

    /// A fetched or cached policy failed to parse
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// A local file operation failed
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for secrets service operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Wrap an I/O error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VaultError::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if the operation may succeed when retried.
    ///
    /// Transport failures and server-side errors are transient. Everything
    /// else is returned immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            VaultError::RequestFailed(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            VaultError::ApiError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Get an error code for reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            VaultError::RequestFailed(_) => "REQUEST_FAILED",
            VaultError::ApiError { .. } => "API_ERROR",
            VaultError::InvalidResponse(_) => "INVALID_RESPONSE",
            VaultError::NotFound(_) => "NOT_FOUND",
            VaultError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            VaultError::ClientRequired => "CLIENT_REQUIRED",
            VaultError::UnknownMountType { .. } => "UNKNOWN_MOUNT_TYPE",
            VaultError::UnrecognizedAuthThing(_) => "UNRECOGNIZED_AUTH_THING",
            VaultError::MissingTokenPolicies(_) => "MISSING_TOKEN_POLICIES",
            VaultError::Policy(_) => "POLICY_PARSE_ERROR",
            VaultError::Io { .. } => "IO_ERROR",
            VaultError::Config(_) => "CONFIG_ERROR",
        }
    }
}
