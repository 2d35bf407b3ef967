//! # RSoP Policy
//!
//! Resultant Set of Policy (RSoP) analysis for a centralized secrets-management
//! service: "what can this identity actually do?"
//!
//! ## Overview
//!
//! The rsop-policy crate handles:
//! - **Capabilities**: The grant types a path rule can carry
//! - **Policies**: Named documents of path rules, parsed from HCL
//! - **Resolution**: Merging every policy bound to an identity into one
//!   capability map, with deny overriding everything else on a path
//! - **Differentials**: Added/removed grants between two capability maps
//! - **Rendering**: Annotated policy documents and markdown change tables
//!
//! ## Architecture
//!
//! ```text
//! Policy documents ──parse──→ Policy ─┐
//!                                     ├─→ Rsop ──resolve──→ CapabilityMap
//! Policy documents ──parse──→ Policy ─┘                          │
//!                                                                ▼
//!                                  CapabilityMap (before) ──diff──→ Differential
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use rsop_policy::{Capability, Policy, Rsop};
//!
//! let before = Rsop::new(vec![
//!     Policy::parse(r#"path "secret/*" { capabilities = ["read"] }"#, "reader").unwrap(),
//! ]);
//! let after = Rsop::new(vec![
//!     Policy::parse(r#"path "secret/*" { capabilities = ["read", "list"] }"#, "reader").unwrap(),
//! ]);
//!
//! let diff = before.capability_map().diff(&after.capability_map());
//! assert_eq!(diff.metrics().capability_changes, 1);
//! assert!(diff.removed.is_none());
//! assert_eq!(
//!     diff.added.unwrap().granted_by("secret/*", Capability::List),
//!     Some(&["reader".to_string()][..])
//! );
//! ```
//!
//! ## Deny Collapse
//!
//! On any path where deny is granted alongside other capabilities, only deny
//! survives in the capability map. The discarded grants are available from
//! [`Rsop::resolve`] as `preempted`.

pub mod capability;
pub mod diff;
pub mod error;
pub mod policy;
pub mod render;
pub mod rsop;

// Re-export main types for convenience
pub use capability::Capability;
pub use diff::{ChangeKind, DiffEntry, DiffMetrics, Differential};
pub use error::{PolicyError, PolicyResult};
pub use policy::{PathRule, Policy};
pub use rsop::{CapabilityMap, PathGrants, Resolution, Rsop};
