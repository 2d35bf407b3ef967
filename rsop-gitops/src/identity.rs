//! Identity bindings: which policies an auth role, group or user carries.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{GitOpsError, GitOpsResult};

/// The policy-bearing fields of an identity stored under `auth/`.
///
/// Other fields of the document are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityBinding {
    /// Policies attached directly.
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<String>,

    /// Policies attached to issued tokens.
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Vec::is_empty")]
    pub token_policies: Vec<String>,

    /// Policies a token may be issued with.
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Vec::is_empty")]
    pub allowed_policies: Vec<String>,
}

/// Service responses carry `null` for unset lists.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl IdentityBinding {
    /// Parse a binding document read from `path`.
    pub fn parse(data: &[u8], path: &str) -> GitOpsResult<Self> {
        serde_json::from_slice(data).map_err(|e| GitOpsError::InvalidBinding {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Every referenced policy name, sorted.
    ///
    /// The three fields are concatenated without deduplication, so a name
    /// listed twice is loaded, and counted, twice.
    ///
    /// # Example
    ///
    /// ```
    /// use rsop_gitops::IdentityBinding;
    ///
    /// let binding = IdentityBinding::parse(
    ///     br#"{"token_policies": ["b", "a"], "policies": ["a"]}"#,
    ///     "auth/token/roles/x",
    /// ).unwrap();
    /// assert_eq!(binding.all_policies(), vec!["a", "a", "b"]);
    /// ```
    pub fn all_policies(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .token_policies
            .iter()
            .chain(&self.allowed_policies)
            .chain(&self.policies)
            .cloned()
            .collect();
        all.sort();
        all
    }

    /// Check if any field references `policy`.
    pub fn references(&self, policy: &str) -> bool {
        self.token_policies
            .iter()
            .chain(&self.allowed_policies)
            .chain(&self.policies)
            .any(|name| name == policy)
    }

    /// Check if no policies are referenced.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty() && self.token_policies.is_empty() && self.allowed_policies.is_empty()
    }
}
