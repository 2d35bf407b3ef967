//! # Changed Files
//!
//! Classification of changed repository files into identity bindings and
//! policies.
//!
//! The repository layout mirrors the secrets service's API paths:
//!
//! ```text
//! auth/<mount>/<endpoint>/<identity>   identity bindings (JSON)
//! sys/policies/acl/<policy>            policy documents (HCL)
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How a file changed between two revisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    /// Added or copied.
    Added,
    /// Deleted.
    Deleted,
    /// Modified in place.
    Modified,
}

impl Mutation {
    /// Map a `git diff --name-status` status code.
    ///
    /// Renames, type changes, unmerged and unknown statuses are not handled.
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "A" | "C" => Some(Mutation::Added),
            "D" => Some(Mutation::Deleted),
            "M" => Some(Mutation::Modified),
            _ => None,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mutation::Added => "added",
            Mutation::Deleted => "deleted",
            Mutation::Modified => "modified",
        }
    }
}

/// What a changed file represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileClass {
    /// An identity binding under `auth/`.
    Identity,
    /// A policy document in an `acl` directory.
    Policy,
    /// Anything else.
    Unclassified,
}

/// Classify a repository-relative path.
///
/// A path whose first segment is `auth` is an identity binding. Otherwise a
/// path whose containing directory is named `acl` is a policy. The two are
/// mutually exclusive and every path gets exactly one class.
///
/// # Example
///
/// ```
/// use rsop_gitops::{classify, FileClass};
///
/// assert_eq!(classify("auth/gcp/roles/r1"), FileClass::Identity);
/// assert_eq!(classify("sys/policies/acl/default"), FileClass::Policy);
/// assert_eq!(classify("secret/data/x"), FileClass::Unclassified);
/// ```
pub fn classify(path: &str) -> FileClass {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    if segments.next() == Some("auth") {
        return FileClass::Identity;
    }

    let parent = path.trim_end_matches('/').rsplit_once('/').map(|(dir, _)| dir);
    match parent.and_then(|dir| dir.rsplit('/').next()) {
        Some("acl") => FileClass::Policy,
        _ => FileClass::Unclassified,
    }
}

/// A file that changed between the comparison revision and the working copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangedFile {
    /// Repository-relative path, `/`-separated.
    pub path: String,
    /// How the file changed.
    pub mutation: Mutation,
    /// What the file represents.
    pub class: FileClass,
}

impl ChangedFile {
    /// Create a changed file, classifying its path.
    pub fn new(path: impl Into<String>, mutation: Mutation) -> Self {
        let path = path.into();
        let class = classify(&path);
        Self { path, mutation, class }
    }

    /// Check if this is an identity binding.
    pub fn is_identity(&self) -> bool {
        self.class == FileClass::Identity
    }

    /// Check if this is a policy document.
    pub fn is_policy(&self) -> bool {
        self.class == FileClass::Policy
    }

    /// Check if the file no longer exists.
    pub fn is_deleted(&self) -> bool {
        self.mutation == Mutation::Deleted
    }

    /// The file name, which for policies is the policy name.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Parse `git diff --name-status` output into changed files.
///
/// Lines with unhandled status codes are skipped with a warning, and
/// malformed lines are ignored.
pub fn parse_name_status(output: &str) -> Vec<(String, Mutation)> {
    let mut changes = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((status, path)) = line.split_once('\t') else {
            debug!(line = %line, "Ignoring unexpected name-status line");
            continue;
        };
        match Mutation::from_status(status) {
            Some(mutation) => changes.push((path.to_string(), mutation)),
            None => warn!(status = %status, path = %path, "Unhandled git file status, skipping"),
        }
    }
    changes
}

/// Parse `git diff --name-status -z` output into changed files.
///
/// Paths are taken verbatim, so names git would otherwise quote come through
/// unescaped. Copies are recorded under their destination path. Renames and
/// other unhandled status codes are skipped with a warning.
pub fn parse_name_status_z(output: &[u8]) -> Vec<(String, Mutation)> {
    let mut fields = output
        .split(|b| *b == 0)
        .filter(|field| !field.is_empty())
        .map(String::from_utf8_lossy);

    let mut changes = Vec::new();
    while let Some(status) = fields.next() {
        let paired = status.starts_with('R') || status.starts_with('C');
        let Some(mut path) = fields.next() else {
            debug!(status = %status, "Ignoring status without a path");
            break;
        };
        if paired {
            match fields.next() {
                Some(destination) => path = destination,
                None => break,
            }
        }
        let status = if status.starts_with('C') { "C" } else { &*status };
        match Mutation::from_status(status) {
            Some(mutation) => changes.push((path.into_owned(), mutation)),
            None => warn!(status = %status, path = %path, "Unhandled git file status, skipping"),
        }
    }
    changes
}
