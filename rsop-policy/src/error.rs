//! Error types for policy parsing
//!
//! Parsing is the only fallible step in this crate. Resolution, diffing and
//! rendering are total functions.

use thiserror::Error;

/// Policy document parse errors.
///
/// Every variant names the policy being parsed so a caller processing many
/// documents can report the failing item and carry on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The document is not valid HCL
    #[error("Error parsing policy '{name}': {message}")]
    Syntax {
        /// Policy name assigned by the loader
        name: String,
        /// Parser message
        message: String,
    },

    /// The document has a top-level attribute or block other than `path`
    #[error("Unsupported top-level '{structure}' in policy '{name}'")]
    UnsupportedStructure {
        /// Policy name assigned by the loader
        name: String,
        /// Identifier of the offending attribute or block
        structure: String,
    },

    /// A `path` block without exactly one label
    #[error("Path block in policy '{name}' must have exactly one label")]
    InvalidPathLabel {
        /// Policy name assigned by the loader
        name: String,
    },

    /// A `path` block without a `capabilities` attribute
    #[error("Path '{path}' in policy '{name}' is missing capabilities")]
    MissingCapabilities {
        /// Policy name assigned by the loader
        name: String,
        /// Path of the rule
        path: String,
    },

    /// `capabilities` is not an array of string literals
    #[error("Capabilities for path '{path}' in policy '{name}' must be a list of strings")]
    InvalidCapabilities {
        /// Policy name assigned by the loader
        name: String,
        /// Path of the rule
        path: String,
    },
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

impl PolicyError {
    /// Name of the policy that failed to parse.
    pub fn policy_name(&self) -> &str {
        match self {
            PolicyError::Syntax { name, .. }
            | PolicyError::UnsupportedStructure { name, .. }
            | PolicyError::InvalidPathLabel { name }
            | PolicyError::MissingCapabilities { name, .. }
            | PolicyError::InvalidCapabilities { name, .. } => name,
        }
    }
}
