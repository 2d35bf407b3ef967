//! Git-backed repository.
//!
//! Historical revisions are read by shelling out to the `git` binary. The
//! working revision is read straight from the filesystem so that uncommitted
//! edits are visible.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::change::{parse_name_status_z, Mutation};
use crate::error::{GitOpsError, GitOpsResult};
use crate::repository::{Repository, Revision};

/// Repository backed by a git checkout on disk.
///
/// # Example
///
/// ```rust,no_run
/// use rsop_gitops::{GitRepository, Repository, Revision};
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let repo = GitRepository::new(".");
///     let base = repo.default_comparison_revision(None).await?;
///     let policy = repo
///         .read_file_at(&Revision::Commit(base), "sys/policies/acl/default")
///         .await?;
///     println!("{}", String::from_utf8_lossy(&policy));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct GitRepository {
    /// Root of the checkout
    dir: PathBuf,

    /// Extra environment for every `git` invocation
    envs: Vec<(String, String)>,
}

impl GitRepository {
    /// Create a repository for the checkout at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            envs: Vec::new(),
        }
    }

    /// Set an environment variable for every `git` invocation, e.g.
    /// `GIT_CONFIG_GLOBAL` to isolate the checkout from user configuration.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Root of the checkout.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn git(&self, args: &[&str]) -> GitOpsResult<Output> {
        let output = Command::new("git")
            .args(["-c", "core.quotePath=false"])
            .args(args)
            .current_dir(&self.dir)
            .env("LC_ALL", "C")
            .env_remove("LANGUAGE")
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GitOpsError::Repository(format!("failed to run git {}: {}", args.join(" "), e)))?;
        debug!(args = ?args, status = %output.status, "git");
        Ok(output)
    }

    fn failure(args: &[&str], output: &Output) -> GitOpsError {
        GitOpsError::Repository(format!(
            "git {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }

    /// Whether `reference` names a commit.
    async fn commit_exists(&self, reference: &str) -> GitOpsResult<bool> {
        let object = format!("{}^{{commit}}", reference);
        let output = self.git(&["rev-parse", "--verify", "--quiet", object.as_str()]).await?;
        Ok(output.status.success())
    }

    async fn read_working_file(&self, path: &str) -> GitOpsResult<Vec<u8>> {
        match tokio::fs::read(self.dir.join(path)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(GitOpsError::NotFound {
                revision: Revision::Working.to_string(),
                path: path.to_string(),
            }),
            Err(e) => Err(GitOpsError::Repository(format!("failed to read '{}': {}", path, e))),
        }
    }

    async fn list_working_files(&self, dir: &str) -> GitOpsResult<Vec<String>> {
        let root = self.dir.join(dir);
        let exists = tokio::fs::try_exists(&root)
            .await
            .map_err(|e| GitOpsError::Repository(format!("failed to access '{}': {}", dir, e)))?;
        if !exists {
            return Err(GitOpsError::NotFound {
                revision: Revision::Working.to_string(),
                path: dir.to_string(),
            });
        }

        let base = self.dir.clone();
        let mut files = tokio::task::spawn_blocking(move || walk_files(&base, &root))
            .await
            .map_err(|e| GitOpsError::Repository(format!("directory walk failed: {}", e)))??;
        files.sort();
        Ok(files)
    }
}

/// Collect every regular file below `root` as a `/`-separated path relative
/// to `base`.
fn walk_files(base: &Path, root: &Path) -> GitOpsResult<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| GitOpsError::Repository(format!("directory walk failed: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(base)
            .map_err(|e| GitOpsError::Repository(e.to_string()))?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(segments.join("/"));
    }
    Ok(files)
}

/// Split NUL-terminated `-z` output into paths.
fn split_nul(output: &[u8]) -> Vec<String> {
    output
        .split(|b| *b == 0)
        .filter(|path| !path.is_empty())
        .map(|path| String::from_utf8_lossy(path).into_owned())
        .collect()
}

#[async_trait]
impl Repository for GitRepository {
    #[instrument(skip(self), fields(revision = %revision))]
    async fn read_file_at(&self, revision: &Revision, path: &str) -> GitOpsResult<Vec<u8>> {
        let reference = match revision {
            Revision::Working => return self.read_working_file(path).await,
            Revision::Commit(reference) => reference,
        };

        let object = format!("{}:{}", reference, path);
        let args = ["show", object.as_str()];
        let output = self.git(&args).await?;
        if output.status.success() {
            return Ok(output.stdout);
        }

        // the revision resolves, so the path is what is missing
        if self.commit_exists(reference).await? {
            return Err(GitOpsError::NotFound {
                revision: revision.to_string(),
                path: path.to_string(),
            });
        }
        Err(Self::failure(&args, &output))
    }

    #[instrument(skip(self), fields(revision = %revision))]
    async fn list_files_at(&self, revision: &Revision, dir: &str) -> GitOpsResult<Vec<String>> {
        let reference = match revision {
            Revision::Working => return self.list_working_files(dir).await,
            Revision::Commit(reference) => reference,
        };

        let args = ["ls-tree", "-r", "-z", "--name-only", reference.as_str(), "--", dir];
        let output = self.git(&args).await?;
        if !output.status.success() {
            return Err(Self::failure(&args, &output));
        }

        let mut files = split_nul(&output.stdout);
        if files.is_empty() {
            return Err(GitOpsError::NotFound {
                revision: revision.to_string(),
                path: dir.to_string(),
            });
        }
        files.sort();
        Ok(files)
    }

    #[instrument(skip(self))]
    async fn list_changed_files(&self, base: &str) -> GitOpsResult<Vec<(String, Mutation)>> {
        // renames are reported as a deletion plus an addition
        let args = ["diff", base, "--name-status", "--no-renames", "-z"];
        let output = self.git(&args).await?;
        if !output.status.success() {
            return Err(Self::failure(&args, &output));
        }

        let changes = parse_name_status_z(&output.stdout);
        debug!(count = changes.len(), "git diff {} --name-status", base);
        Ok(changes)
    }

    #[instrument(skip(self))]
    async fn default_comparison_revision(&self, explicit: Option<&str>) -> GitOpsResult<String> {
        if let Some(reference) = explicit.filter(|r| !r.is_empty()) {
            return Ok(reference.to_string());
        }

        let args = ["config", "init.defaultBranch"];
        let output = self.git(&args).await?;
        if output.status.success() {
            let configured = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !configured.is_empty() {
                return Ok(configured);
            }
        } else if output.status.code() != Some(1) {
            // exit status 1 means the key is unset
            return Err(Self::failure(&args, &output));
        }

        let args = ["branch"];
        let output = self.git(&args).await?;
        if !output.status.success() {
            return Err(Self::failure(&args, &output));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let guessed = stdout
            .trim()
            .lines()
            .last()
            .map(|line| line.trim_start_matches('*').trim().to_string())
            .filter(|branch| !branch.is_empty())
            .ok_or_else(|| GitOpsError::NoComparisonRevision("git branch output empty".to_string()))?;

        info!(branch = %guessed, "`git config init.defaultBranch` returned nothing, guessed default branch");
        Ok(guessed)
    }
}
