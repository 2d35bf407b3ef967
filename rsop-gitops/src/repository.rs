//! Repository access
//!
//! This module provides the read-only repository abstraction the change-impact
//! analysis runs against, and an in-memory implementation.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

use crate::change::Mutation;
use crate::error::{GitOpsError, GitOpsResult};

/// A point in the repository's history to read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Revision {
    /// The working copy, including uncommitted edits.
    Working,
    /// A commit, branch, tag or any other revision expression.
    Commit(String),
}

impl Revision {
    /// Create a revision from a reference name.
    pub fn commit(reference: impl Into<String>) -> Self {
        Revision::Commit(reference.into())
    }

    /// Check if this is the working copy.
    pub fn is_working(&self) -> bool {
        matches!(self, Revision::Working)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Working => f.write_str("working"),
            Revision::Commit(reference) => f.write_str(reference),
        }
    }
}

/// Read-only access to a version-controlled repository.
///
/// Paths are repository-relative and `/`-separated.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Read a file's contents at a revision.
    ///
    /// Returns [`GitOpsError::NotFound`] if the file does not exist there.
    async fn read_file_at(&self, revision: &Revision, path: &str) -> GitOpsResult<Vec<u8>>;

    /// Recursively list the files under a directory at a revision, in lexical
    /// order.
    ///
    /// Returns [`GitOpsError::NotFound`] if the directory does not exist there.
    async fn list_files_at(&self, revision: &Revision, dir: &str) -> GitOpsResult<Vec<String>>;

    /// List files changed in the working copy relative to a base revision.
    async fn list_changed_files(&self, base: &str) -> GitOpsResult<Vec<(String, Mutation)>>;

    /// Determine the revision to compare the working copy against.
    ///
    /// An explicit reference wins. Otherwise the configured default branch is
    /// used, and failing that a best guess from the branch list.
    async fn default_comparison_revision(&self, explicit: Option<&str>) -> GitOpsResult<String>;
}

/// In-memory repository.
///
/// Suitable for tests and for embedding the analysis over data that does not
/// live in git.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    /// Files per revision.
    files: BTreeMap<Revision, BTreeMap<String, Vec<u8>>>,
    /// Changes reported for any base revision.
    changes: Vec<(String, Mutation)>,
    /// Default branch, if configured.
    default_branch: Option<String>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file at a revision.
    pub fn with_file(mut self, revision: Revision, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert_file(revision, path, contents);
        self
    }

    /// Record a change reported by `list_changed_files`.
    pub fn with_change(mut self, path: impl Into<String>, mutation: Mutation) -> Self {
        self.changes.push((path.into(), mutation));
        self
    }

    /// Set the default branch.
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = Some(branch.into());
        self
    }

    /// Add a file at a revision.
    pub fn insert_file(&mut self, revision: Revision, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files
            .entry(revision)
            .or_default()
            .insert(path.into(), contents.into());
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn read_file_at(&self, revision: &Revision, path: &str) -> GitOpsResult<Vec<u8>> {
        self.files
            .get(revision)
            .and_then(|files| files.get(path))
            .cloned()
            .ok_or_else(|| GitOpsError::NotFound {
                revision: revision.to_string(),
                path: path.to_string(),
            })
    }

    async fn list_files_at(&self, revision: &Revision, dir: &str) -> GitOpsResult<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let files: Vec<String> = self
            .files
            .get(revision)
            .into_iter()
            .flat_map(|files| files.keys())
            .filter(|path| path.starts_with(&prefix))
            .cloned()
            .collect();

        if files.is_empty() {
            return Err(GitOpsError::NotFound {
                revision: revision.to_string(),
                path: dir.to_string(),
            });
        }
        Ok(files)
    }

    async fn list_changed_files(&self, _base: &str) -> GitOpsResult<Vec<(String, Mutation)>> {
        Ok(self.changes.clone())
    }

    async fn default_comparison_revision(&self, explicit: Option<&str>) -> GitOpsResult<String> {
        if let Some(reference) = explicit.filter(|r| !r.is_empty()) {
            return Ok(reference.to_string());
        }
        self.default_branch
            .clone()
            .ok_or_else(|| GitOpsError::NoComparisonRevision("no default branch configured".to_string()))
    }
}
