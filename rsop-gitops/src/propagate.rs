//! # Change-Impact Propagation
//!
//! Turns a set of changed files into per-identity differentials.
//!
//! An identity change is diffed directly. A policy change fans out to every
//! identity that references the policy: identities deleted in the change set
//! are read at the comparison revision, and every identity in the working
//! tree is scanned for a reference.
//!
//! Results are keyed by identity path. The first differential recorded for a
//! path is kept, so later passes never overwrite earlier ones.

use futures::stream::{self, StreamExt};
use rsop_policy::{CapabilityMap, Differential, Policy, Rsop};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::change::ChangedFile;
use crate::config::GitOpsConfig;
use crate::error::{GitOpsError, GitOpsResult};
use crate::identity::IdentityBinding;
use crate::repository::{Repository, Revision};

/// An item whose differential could not be computed.
#[derive(Debug)]
pub struct ItemFailure {
    /// Identity path the failure belongs to.
    pub path: String,
    /// What went wrong.
    pub error: GitOpsError,
}

/// Differentials produced by one propagation run.
#[derive(Debug, Default)]
pub struct ImpactReport {
    /// Differential per identity path, in lexical path order.
    pub differentials: BTreeMap<String, Differential>,

    /// Item-scoped failures, in the order they occurred.
    pub failures: Vec<ItemFailure>,
}

impl ImpactReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a differential unless the path already has one.
    ///
    /// Returns `true` if the differential was recorded.
    pub fn record(&mut self, path: impl Into<String>, diff: Differential) -> bool {
        let path = path.into();
        if self.contains(&path) {
            return false;
        }
        self.differentials.insert(path, diff);
        true
    }

    /// Record an item-scoped failure.
    pub fn fail(&mut self, path: impl Into<String>, error: GitOpsError) {
        let path = path.into();
        warn!(path = %path, error = %error, "Skipping identity");
        self.failures.push(ItemFailure { path, error });
    }

    /// Check if a path already has an outcome.
    pub fn contains(&self, path: &str) -> bool {
        self.differentials.contains_key(path) || self.failures.iter().any(|f| f.path == path)
    }

    /// Get the differential for a path.
    pub fn get(&self, path: &str) -> Option<&Differential> {
        self.differentials.get(path)
    }

    /// Check if every item was processed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of identities with a differential.
    pub fn len(&self) -> usize {
        self.differentials.len()
    }

    /// Check if no differentials were recorded.
    pub fn is_empty(&self) -> bool {
        self.differentials.is_empty()
    }

    fn merge(&mut self, other: ImpactReport) {
        for (path, diff) in other.differentials {
            self.record(path, diff);
        }
        for failure in other.failures {
            if !self.differentials.contains_key(&failure.path) {
                self.failures.push(failure);
            }
        }
    }
}

/// Run `operation` unless `cancel` fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> GitOpsResult<T>
where
    F: Future<Output = GitOpsResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GitOpsError::Cancelled),
        result = operation => result,
    }
}

/// Computes identity differentials between a comparison revision and the
/// working copy.
///
/// # Example
///
/// ```rust
/// use rsop_gitops::{
///     ChangeImpactPropagator, ChangedFile, GitOpsConfig, MemoryRepository, Mutation, Revision,
/// };
///
/// # tokio_test_block(async {
/// let main = Revision::commit("main");
/// let repo = MemoryRepository::new()
///     .with_file(main.clone(), "auth/token/roles/ci", r#"{"token_policies": ["deploy"]}"#)
///     .with_file(main.clone(), "sys/policies/acl/deploy", r#"path "a" { capabilities = ["read"] }"#)
///     .with_file(Revision::Working, "auth/token/roles/ci", r#"{"token_policies": ["deploy"]}"#)
///     .with_file(Revision::Working, "sys/policies/acl/deploy", r#"path "a" { capabilities = ["list"] }"#);
///
/// let config = GitOpsConfig::default();
/// let propagator = ChangeImpactPropagator::new(&repo, main, &config);
/// let report = propagator
///     .propagate(&[ChangedFile::new("sys/policies/acl/deploy", Mutation::Modified)])
///     .await
///     .unwrap();
///
/// assert_eq!(report.get("auth/token/roles/ci").unwrap().metrics().capability_changes, 2);
/// # });
/// # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct ChangeImpactPropagator<'a, R: Repository + ?Sized> {
    repo: &'a R,
    before: Revision,
    after: Revision,
    identity_root: String,
    policy_root: String,
    concurrency: usize,
    cancel: CancellationToken,
}

impl<'a, R: Repository + ?Sized> ChangeImpactPropagator<'a, R> {
    /// Create a propagator comparing `before` against the working copy.
    pub fn new(repo: &'a R, before: Revision, config: &GitOpsConfig) -> Self {
        Self {
            repo,
            before,
            after: Revision::Working,
            identity_root: config.identity_root.trim_end_matches('/').to_string(),
            policy_root: config.policy_root.trim_end_matches('/').to_string(),
            concurrency: config.max_concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Compare against `after` instead of the working copy.
    pub fn with_after(mut self, after: Revision) -> Self {
        self.after = after;
        self
    }

    /// Abort outstanding reads when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Compute the differential of every identity affected by `changes`.
    ///
    /// Each distinct path is processed once. Item-scoped failures are
    /// collected in the report; anything else aborts the run.
    #[instrument(skip_all, fields(before = %self.before, after = %self.after, changes = changes.len()))]
    pub async fn propagate(&self, changes: &[ChangedFile]) -> GitOpsResult<ImpactReport> {
        let mut report = ImpactReport::new();
        let mut seen = BTreeSet::new();

        for change in changes {
            if !seen.insert(change.path.as_str()) || report.contains(&change.path) {
                continue;
            }

            if change.is_identity() {
                info!(path = %change.path, "Processing identity change");
                match self.identity_differential(&change.path).await {
                    Ok(diff) => {
                        debug!(path = %change.path, diff = ?diff, "Computed differential");
                        report.record(change.path.clone(), diff);
                    }
                    Err(e) if e.is_item_scoped() => report.fail(change.path.clone(), e),
                    Err(e) => return Err(e),
                }
            } else if change.is_policy() {
                info!(path = %change.path, "Processing policy change");
                let fallout = self
                    .collect_policy_fallout(changes, change.file_name(), &report)
                    .await?;
                report.merge(fallout);
            } else {
                debug!(path = %change.path, "Ignoring unclassified change");
            }
        }

        Ok(report)
    }

    /// Compute the differential of a single identity between both revisions.
    ///
    /// A binding missing at either revision references no policies.
    #[instrument(skip(self))]
    pub async fn identity_differential(&self, path: &str) -> GitOpsResult<Differential> {
        let after = self.read_binding(path, &self.after).await?;
        self.differential_with(path, &after).await
    }

    /// Compute the differential of every identity referencing `policy`.
    ///
    /// Identities deleted in `changes` are evaluated first, at the comparison
    /// revision. Then every identity under the identity root is scanned in
    /// lexical order.
    #[instrument(skip(self, changes))]
    pub async fn policy_change_differentials(
        &self,
        changes: &[ChangedFile],
        policy: &str,
    ) -> GitOpsResult<ImpactReport> {
        self.collect_policy_fallout(changes, policy, &ImpactReport::new())
            .await
    }

    /// Load every policy `binding` references at `revision`.
    ///
    /// A policy missing from the working copy is skipped with a warning. A
    /// policy missing from a historical revision is an error.
    pub async fn load_rsop(&self, binding: &IdentityBinding, revision: &Revision) -> GitOpsResult<Rsop> {
        let names = binding.all_policies();
        let mut policies = Vec::with_capacity(names.len());
        for name in &names {
            let path = format!("{}/{}", self.policy_root, name);
            let data = match self.read(revision, &path).await {
                Ok(data) => data,
                Err(e) if e.is_not_found() && revision.is_working() => {
                    warn!(policy = %name, path = %path, "Referenced policy does not exist, treating as empty");
                    continue;
                }
                Err(e) => return Err(e),
            };
            policies.push(Policy::parse(&String::from_utf8_lossy(&data), name)?);
        }
        Ok(Rsop::new(policies))
    }

    async fn collect_policy_fallout(
        &self,
        changes: &[ChangedFile],
        policy: &str,
        known: &ImpactReport,
    ) -> GitOpsResult<ImpactReport> {
        let mut report = ImpactReport::new();

        // deleted identities are absent from the tree walk below
        for change in changes.iter().filter(|c| c.is_identity() && c.is_deleted()) {
            if known.contains(&change.path) || report.contains(&change.path) {
                continue;
            }
            match self.deleted_identity_differential(&change.path, policy).await {
                Ok(Some(diff)) => {
                    report.record(change.path.clone(), diff);
                }
                Ok(None) => {}
                Err(e) if e.is_item_scoped() => report.fail(change.path.clone(), e),
                Err(e) => return Err(e),
            }
        }

        let files = match self.list(&self.after, &self.identity_root).await {
            Ok(files) => files,
            Err(e) if e.is_not_found() => return Err(GitOpsError::IdentityRootMissing(self.identity_root.clone())),
            Err(e) => return Err(e),
        };
        let candidates: Vec<String> = files
            .into_iter()
            .filter(|path| !known.contains(path) && !report.contains(path))
            .collect();
        debug!(root = %self.identity_root, policy = %policy, candidates = candidates.len(), "Walking identities for policy matches");

        let mut outcomes = stream::iter(candidates)
            .map(move |path| async move {
                let outcome = self.candidate_differential(&path, policy).await;
                (path, outcome)
            })
            .buffered(self.concurrency);

        while let Some((path, outcome)) = outcomes.next().await {
            match outcome {
                Ok(Some(diff)) => {
                    report.record(path, diff);
                }
                Ok(None) => {}
                Err(e) if e.is_item_scoped() => report.fail(path, e),
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    async fn deleted_identity_differential(&self, path: &str, policy: &str) -> GitOpsResult<Option<Differential>> {
        let binding = self.read_binding(path, &self.before).await?;
        if !binding.references(policy) {
            return Ok(None);
        }
        let rsop = self.load_rsop(&binding, &self.before).await?;
        Ok(Some(Differential::deleted(rsop.capability_map())))
    }

    async fn candidate_differential(&self, path: &str, policy: &str) -> GitOpsResult<Option<Differential>> {
        let after = self.read_binding(path, &self.after).await?;
        if !after.references(policy) {
            return Ok(None);
        }
        self.differential_with(path, &after).await.map(Some)
    }

    async fn differential_with(&self, path: &str, after: &IdentityBinding) -> GitOpsResult<Differential> {
        let before = self.read_binding(path, &self.before).await?;
        let before_map: CapabilityMap = self.load_rsop(&before, &self.before).await?.capability_map();
        let after_map: CapabilityMap = self.load_rsop(after, &self.after).await?.capability_map();
        debug!(path = %path, before = ?before_map, after = ?after_map, "Resolved capability maps");
        Ok(before_map.diff(&after_map))
    }

    async fn read_binding(&self, path: &str, revision: &Revision) -> GitOpsResult<IdentityBinding> {
        match self.read(revision, path).await {
            Ok(data) => IdentityBinding::parse(&data, path),
            Err(e) if e.is_not_found() => {
                debug!(path = %path, revision = %revision, "Identity absent, treating as no policies");
                Ok(IdentityBinding::default())
            }
            Err(e) => Err(e),
        }
    }

    async fn read(&self, revision: &Revision, path: &str) -> GitOpsResult<Vec<u8>> {
        cancellable(&self.cancel, self.repo.read_file_at(revision, path)).await
    }

    async fn list(&self, revision: &Revision, dir: &str) -> GitOpsResult<Vec<String>> {
        cancellable(&self.cancel, self.repo.list_files_at(revision, dir)).await
    }
}

/// Outcome of analyzing a working copy against its comparison revision.
#[derive(Debug)]
pub struct ChangeImpact {
    /// The revision the working copy was compared against.
    pub compare_ref: String,
    /// Every change detected.
    pub changes: Vec<ChangedFile>,
    /// Per-identity differentials.
    pub report: ImpactReport,
}

/// Detect changes in the working copy and compute every affected identity's
/// differential.
///
/// The comparison revision is `config.compare_ref` when set, otherwise it is
/// resolved from the repository.
#[instrument(skip_all)]
pub async fn analyze_changes<R: Repository + ?Sized>(
    repo: &R,
    config: &GitOpsConfig,
    cancel: CancellationToken,
) -> GitOpsResult<ChangeImpact> {
    let compare_ref = cancellable(&cancel, repo.default_comparison_revision(config.compare_ref.as_deref())).await?;
    let changes: Vec<ChangedFile> = cancellable(&cancel, repo.list_changed_files(&compare_ref))
        .await?
        .into_iter()
        .map(|(path, mutation)| ChangedFile::new(path, mutation))
        .collect();
    info!(count = changes.len(), compare_ref = %compare_ref, "Detected changes to files");

    let report = ChangeImpactPropagator::new(repo, Revision::commit(compare_ref.clone()), config)
        .with_cancellation(cancel)
        .propagate(&changes)
        .await?;

    Ok(ChangeImpact {
        compare_ref,
        changes,
        report,
    })
}
