//! # Capabilities
//!
//! Defines the grant types a policy can attach to a path.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capabilities a policy path rule can grant.
///
/// The declaration order is the fixed display order used for deterministic
/// output. It carries no precedence meaning; precedence is handled by deny
/// collapse during resolution.
///
/// - **Create**: Write data to a path that does not exist yet
/// - **Read**: Read data at a path
/// - **Update**: Change data at an existing path
/// - **Delete**: Remove data at a path
/// - **List**: List the keys under a path
/// - **Sudo**: Access root-protected paths
/// - **Deny**: Disallow access, overriding every other grant
/// - **Subscribe**: Subscribe to events for a path
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Create data at a path.
    Create,

    /// Read data at a path.
    Read,

    /// Update data at a path.
    Update,

    /// Delete data at a path.
    Delete,

    /// List keys under a path.
    List,

    /// Access root-protected paths.
    Sudo,

    /// Deny all access to a path.
    ///
    /// A deny grant preempts every other capability on the same path.
    Deny,

    /// Subscribe to events for a path.
    Subscribe,
}

impl Capability {
    /// Get the string representation used in policy documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Create => "create",
            Capability::Read => "read",
            Capability::Update => "update",
            Capability::Delete => "delete",
            Capability::List => "list",
            Capability::Sudo => "sudo",
            Capability::Deny => "deny",
            Capability::Subscribe => "subscribe",
        }
    }

    /// Parse a capability from its policy document spelling.
    ///
    /// Policy documents are case-sensitive, so only the lowercase spelling is
    /// accepted.
    ///
    /// # Example
    ///
    /// ```
    /// use rsop_policy::Capability;
    ///
    /// assert_eq!(Capability::parse("read"), Some(Capability::Read));
    /// assert_eq!(Capability::parse("READ"), None);
    /// assert_eq!(Capability::parse("write"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Capability::Create),
            "read" => Some(Capability::Read),
            "update" => Some(Capability::Update),
            "delete" => Some(Capability::Delete),
            "list" => Some(Capability::List),
            "sudo" => Some(Capability::Sudo),
            "deny" => Some(Capability::Deny),
            "subscribe" => Some(Capability::Subscribe),
            _ => None,
        }
    }

    /// Get all capabilities in display order.
    pub fn all() -> Vec<Self> {
        vec![
            Capability::Create,
            Capability::Read,
            Capability::Update,
            Capability::Delete,
            Capability::List,
            Capability::Sudo,
            Capability::Deny,
            Capability::Subscribe,
        ]
    }

    /// Check if this capability is the deny override.
    pub fn is_deny(&self) -> bool {
        matches!(self, Capability::Deny)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_parsing() {
        for capability in Capability::all() {
            assert_eq!(Capability::parse(capability.as_str()), Some(capability));
        }
        assert_eq!(Capability::parse("patch"), None);
        assert_eq!(Capability::parse("Create"), None);
        assert_eq!(Capability::parse(""), None);
    }

    #[test]
    fn test_display_order() {
        let mut shuffled = vec![
            Capability::Subscribe,
            Capability::Deny,
            Capability::Read,
            Capability::Create,
            Capability::Sudo,
            Capability::List,
            Capability::Delete,
            Capability::Update,
        ];
        shuffled.sort();
        assert_eq!(shuffled, Capability::all());
    }

    #[test]
    fn test_serde_spelling() {
        let json = serde_json::to_string(&Capability::Subscribe).unwrap();
        assert_eq!(json, "\"subscribe\"");
        let parsed: Capability = serde_json::from_str("\"deny\"").unwrap();
        assert!(parsed.is_deny());
    }

    #[test]
    fn test_all_capabilities_count() {
        assert_eq!(Capability::all().len(), 8);
    }
}
