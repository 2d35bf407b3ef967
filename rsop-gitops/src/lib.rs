//! # RSoP GitOps
//!
//! Change-impact analysis for a repository that mirrors a secrets service's
//! identities and policies.
//!
//! ## Overview
//!
//! The rsop-gitops crate handles:
//! - **Classification**: Deciding whether a changed file is an identity
//!   binding or a policy document
//! - **Repository Access**: Reading files at a historical revision or from
//!   the working copy, through git or in memory
//! - **Propagation**: Finding every identity a change affects and computing
//!   its differential
//!
//! ## Repository Layout
//!
//! ```text
//! auth/<mount>/<endpoint>/<identity>   JSON identity bindings
//! sys/policies/acl/<policy>            HCL policy documents
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rsop_gitops::{analyze_changes, GitOpsConfig, GitRepository};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = GitRepository::new(".");
//!     let impact = analyze_changes(&repo, &GitOpsConfig::from_env(), CancellationToken::new()).await?;
//!
//!     for (path, diff) in &impact.report.differentials {
//!         println!("{}: {} change(s)", path, diff.metrics().capability_changes);
//!     }
//!     Ok(())
//! }
//! ```

pub mod change;
pub mod config;
pub mod error;
pub mod git;
pub mod identity;
pub mod propagate;
pub mod repository;

// Re-export main types for convenience
pub use change::{classify, parse_name_status, parse_name_status_z, ChangedFile, FileClass, Mutation};
pub use config::GitOpsConfig;
pub use error::{GitOpsError, GitOpsResult};
pub use git::GitRepository;
pub use identity::IdentityBinding;
pub use propagate::{
    analyze_changes, cancellable, ChangeImpact, ChangeImpactPropagator, ImpactReport, ItemFailure,
};
pub use repository::{MemoryRepository, Repository, Revision};
