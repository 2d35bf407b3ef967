//! # Policies
//!
//! A policy is a named, ordered set of path rules. Documents are written in
//! HCL:
//!
//! ```hcl
//! path "secret/data/app/*" {
//!   capabilities = ["read", "list"]
//! }
//! ```
//!
//! The name is not part of the document; the loader assigns it.

use hcl::{Body, Expression, Structure};
use serde::Serialize;
use tracing::warn;

use crate::capability::Capability;
use crate::error::{PolicyError, PolicyResult};

/// A single `path` block of a policy.
///
/// Arguments other than `capabilities` (parameter constraints, wrapping TTLs,
/// control groups, ...) are kept verbatim in `other` but never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathRule {
    /// The path expression, opaque to this crate (globs and templates included).
    pub path: String,

    /// Granted capabilities in document order.
    pub capabilities: Vec<Capability>,

    /// Unrecognized arguments of the path block.
    #[serde(skip)]
    pub other: Body,
}

impl PathRule {
    /// Create a rule with no extra arguments.
    ///
    /// # Example
    ///
    /// ```
    /// use rsop_policy::{Capability, PathRule};
    ///
    /// let rule = PathRule::new("secret/*", [Capability::Read, Capability::List]);
    /// assert_eq!(rule.capabilities.len(), 2);
    /// ```
    pub fn new(path: impl Into<String>, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            path: path.into(),
            capabilities: capabilities.into_iter().collect(),
            other: Body::default(),
        }
    }
}

/// A named policy document.
///
/// Rules are always sorted ascending by path. Duplicate paths are legal and
/// are kept as separate rules in document order, so both contribute during
/// resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    name: String,
    rules: Vec<PathRule>,
}

impl Policy {
    /// Create a policy from rules, sorting them by path.
    pub fn new(name: impl Into<String>, mut rules: Vec<PathRule>) -> Self {
        // stable: duplicate paths keep document order
        rules.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            name: name.into(),
            rules,
        }
    }

    /// Parse a policy document and assign it a name.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] if the document is not valid HCL, contains
    /// anything but `path` blocks at the top level, or a path block lacks a
    /// well-formed `capabilities` list of known capabilities.
    ///
    /// # Example
    ///
    /// ```
    /// use rsop_policy::{Capability, Policy};
    ///
    /// let policy = Policy::parse(
    ///     r#"
    ///     path "b" { capabilities = ["read"] }
    ///     path "a" { capabilities = ["deny"] }
    ///     "#,
    ///     "example",
    /// ).unwrap();
    ///
    /// assert_eq!(policy.name(), "example");
    /// assert_eq!(policy.rules()[0].path, "a");
    /// assert_eq!(policy.rules()[0].capabilities, vec![Capability::Deny]);
    /// ```
    pub fn parse(document: &str, name: &str) -> PolicyResult<Self> {
        let body = hcl::parse(document).map_err(|e| PolicyError::Syntax {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        let mut rules = Vec::new();
        for structure in body.iter() {
            match structure {
                Structure::Block(block) if block.identifier() == "path" => {
                    let path = match block.labels() {
                        [label] => label.as_str().to_string(),
                        _ => {
                            return Err(PolicyError::InvalidPathLabel {
                                name: name.to_string(),
                            })
                        }
                    };
                    rules.push(parse_path_body(name, path, block.body())?);
                }
                Structure::Block(block) => {
                    return Err(PolicyError::UnsupportedStructure {
                        name: name.to_string(),
                        structure: block.identifier().to_string(),
                    });
                }
                Structure::Attribute(attribute) => {
                    return Err(PolicyError::UnsupportedStructure {
                        name: name.to_string(),
                        structure: attribute.key().to_string(),
                    });
                }
            }
        }

        Ok(Self::new(name, rules))
    }

    /// The name assigned by the loader.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path rules, sorted ascending by path.
    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }

    /// Check if the policy grants nothing at all.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn parse_path_body(name: &str, path: String, body: &Body) -> PolicyResult<PathRule> {
    let mut capabilities = None;
    let mut other = Vec::new();

    for structure in body.iter() {
        match structure {
            Structure::Attribute(attribute) if attribute.key() == "capabilities" => {
                capabilities = Some(parse_capabilities(name, &path, attribute.expr())?);
            }
            structure => other.push(structure.clone()),
        }
    }

    let capabilities = capabilities.ok_or_else(|| PolicyError::MissingCapabilities {
        name: name.to_string(),
        path: path.clone(),
    })?;

    Ok(PathRule {
        path,
        capabilities,
        other: other.into_iter().collect(),
    })
}

fn parse_capabilities(name: &str, path: &str, expr: &Expression) -> PolicyResult<Vec<Capability>> {
    let invalid = || PolicyError::InvalidCapabilities {
        name: name.to_string(),
        path: path.to_string(),
    };

    let Expression::Array(items) = expr else {
        return Err(invalid());
    };

    let mut capabilities = Vec::with_capacity(items.len());
    for item in items {
        let Expression::String(s) = item else {
            return Err(invalid());
        };
        match Capability::parse(s) {
            Some(capability) => capabilities.push(capability),
            None => warn!(policy = %name, path = %path, capability = %s, "Ignoring unknown capability"),
        }
    }
    Ok(capabilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KITCHEN_SINK: &str = r#"
path "secret/restricted" {
  capabilities = ["create"]
  allowed_parameters = {
    "foo" = []
    "bar" = ["zip", "zap"]
  }
}

path "auth/approle/role/my-role/secret-id" {
  capabilities = ["create", "update"]
  min_wrapping_ttl = "1s"
  max_wrapping_ttl = "90s"

  control_group {
    factor "ops_manager" {
      identity {
        group_names = ["managers"]
        approvals = 1
      }
    }
  }
}
"#;

    #[test]
    fn test_parse_kitchen_sink() {
        let policy = Policy::parse(KITCHEN_SINK, "kitchensink").unwrap();
        assert_eq!(policy.name(), "kitchensink");

        let rules: Vec<(&str, &[Capability])> = policy
            .rules()
            .iter()
            .map(|r| (r.path.as_str(), r.capabilities.as_slice()))
            .collect();
        assert_eq!(
            rules,
            vec![
                (
                    "auth/approle/role/my-role/secret-id",
                    &[Capability::Create, Capability::Update][..]
                ),
                ("secret/restricted", &[Capability::Create][..]),
            ]
        );

        // extra arguments are carried, not interpreted
        assert_ne!(policy.rules()[0].other, Body::default());
        assert_ne!(policy.rules()[1].other, Body::default());
    }

    #[test]
    fn test_parse_sorts_rules() {
        let policy = Policy::parse(
            r#"
            path "z" { capabilities = ["read"] }
            path "a/*" { capabilities = ["list"] }
            path "m" { capabilities = ["sudo"] }
            "#,
            "sorted",
        )
        .unwrap();

        let paths: Vec<&str> = policy.rules().iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a/*", "m", "z"]);
    }

    #[test]
    fn test_parse_keeps_duplicate_paths() {
        let policy = Policy::parse(
            r#"
            path "dup" { capabilities = ["read"] }
            path "other" { capabilities = ["list"] }
            path "dup" { capabilities = ["update"] }
            "#,
            "dups",
        )
        .unwrap();

        assert_eq!(policy.rules().len(), 3);
        assert_eq!(policy.rules()[0].capabilities, vec![Capability::Read]);
        assert_eq!(policy.rules()[1].capabilities, vec![Capability::Update]);
        assert_eq!(policy.rules()[2].path, "other");
    }

    #[test]
    fn test_parse_templated_path() {
        let policy = Policy::parse(
            r#"path "identity/entity/id/{{identity.entity.id}}" { capabilities = ["read"] }"#,
            "templated",
        )
        .unwrap();
        assert_eq!(policy.rules()[0].path, "identity/entity/id/{{identity.entity.id}}");
    }

    #[test]
    fn test_parse_empty_document() {
        let policy = Policy::parse("", "empty").unwrap();
        assert!(policy.is_empty());
    }

    #[test]
    fn test_parse_rejects_syntax_errors() {
        let err = Policy::parse(r#"path "x" { capabilities = ["read" "#, "broken").unwrap_err();
        assert!(matches!(err, PolicyError::Syntax { .. }));
        assert_eq!(err.policy_name(), "broken");
    }

    #[test]
    fn test_parse_skips_unknown_capability() {
        let policy = Policy::parse(r#"path "x" { capabilities = ["patch", "read", "write"] }"#, "newer").unwrap();
        assert_eq!(policy.rules().len(), 1);
        assert_eq!(policy.rules()[0].capabilities, vec![Capability::Read]);
    }

    #[test]
    fn test_parse_rejects_missing_capabilities() {
        let err = Policy::parse(r#"path "x" { max_wrapping_ttl = "1h" }"#, "bad").unwrap_err();
        assert!(matches!(err, PolicyError::MissingCapabilities { .. }));
    }

    #[test]
    fn test_parse_rejects_non_list_capabilities() {
        let err = Policy::parse(r#"path "x" { capabilities = "read" }"#, "bad").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidCapabilities { .. }));
    }

    #[test]
    fn test_parse_rejects_unknown_top_level() {
        let err = Policy::parse(r#"name = "nope""#, "bad").unwrap_err();
        assert!(matches!(err, PolicyError::UnsupportedStructure { .. }));

        let err = Policy::parse(r#"mount "x" { type = "kv" }"#, "bad").unwrap_err();
        assert!(matches!(err, PolicyError::UnsupportedStructure { .. }));
    }

    #[test]
    fn test_new_sorts_rules() {
        let policy = Policy::new(
            "manual",
            vec![
                PathRule::new("b", [Capability::Read]),
                PathRule::new("a", [Capability::List]),
            ],
        );
        assert_eq!(policy.rules()[0].path, "a");
    }
}
