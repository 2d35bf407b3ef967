//! Mirroring a secrets service into a directory tree.
//!
//! The tree has the layout the change-impact analysis expects:
//!
//! ```text
//! <root>/auth/<mount>/<endpoint>/<identity>   JSON identity bindings
//! <root>/sys/policies/acl/<policy>            HCL policy documents
//! ```

use futures::stream::{self, TryStreamExt};
use rsop_gitops::{GitOpsConfig, IdentityBinding};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::error::{VaultError, VaultResult};
use crate::source::{AuthMount, IdentityEndpoint, PolicySource};

/// Maximum fetches in flight at once.
pub const MAX_CONCURRENT_FETCHES: usize = 5;

/// Counts of mirrored items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MirrorSummary {
    /// Identity bindings written.
    pub identities: usize,
    /// Policy documents written.
    pub policies: usize,
}

/// Mirror identities and policies under `root`, using the directories named
/// in `config`.
pub async fn download_all<S: PolicySource + ?Sized>(
    source: &S,
    root: &Path,
    config: &GitOpsConfig,
) -> VaultResult<MirrorSummary> {
    let identities = download_identities(source, &root.join(&config.identity_root)).await?;
    let policies = download_policies(source, &root.join(&config.policy_root)).await?;
    Ok(MirrorSummary { identities, policies })
}

/// Write every identity binding of every auth mount below `auth_dir`.
///
/// Fails before writing anything if a mount's type has no known identity
/// endpoints. Returns the number of identities listed.
#[instrument(skip(source))]
pub async fn download_identities<S: PolicySource + ?Sized>(source: &S, auth_dir: &Path) -> VaultResult<usize> {
    let mounts = source.list_identity_mounts().await?;
    let plan: Vec<(AuthMount, &'static [IdentityEndpoint])> = mounts
        .into_iter()
        .map(|mount| match mount.endpoints() {
            Some(endpoints) => Ok((mount, endpoints)),
            None => Err(VaultError::UnknownMountType {
                mount: mount.path.clone(),
                kind: mount.kind.clone(),
            }),
        })
        .collect::<VaultResult<_>>()?;

    let mut total = 0;
    for (mount, endpoints) in &plan {
        debug!(mount = %mount.path, kind = %mount.kind, "Mirroring auth mount");
        let mut count = 0;
        for endpoint in endpoints.iter() {
            let target_dir = auth_dir.join(&mount.path).join(endpoint.read);
            tokio::fs::create_dir_all(&target_dir)
                .await
                .map_err(|e| VaultError::io(&target_dir, e))?;

            let list_path = endpoint.list_path(&mount.path);
            let Some(names) = source.list_identities(&list_path).await? else {
                warn!(list_path = %list_path, "LIST returned nothing, skipping");
                continue;
            };

            let target_dir = target_dir.as_path();
            stream::iter(names.iter().map(Ok::<_, VaultError>))
                .try_for_each_concurrent(MAX_CONCURRENT_FETCHES, move |name| async move {
                    let read_path = endpoint.read_path(&mount.path, name);
                    debug!(read_path = %read_path, "Reading identity");
                    match source.fetch_identity(&read_path).await? {
                        Some(binding) => write_binding(&target_dir.join(name), &binding).await,
                        None => {
                            warn!(read_path = %read_path, "Listed identity disappeared, skipping");
                            Ok(())
                        }
                    }
                })
                .await?;
            count += names.len();
        }
        info!(mount = %format!("auth/{}", mount.path), count = count, "Downloaded all identities");
        total += count;
    }
    Ok(total)
}

/// Write every policy document to `policy_dir` and remove files there that
/// no longer name a policy.
///
/// Returns the number of policies written.
#[instrument(skip(source))]
pub async fn download_policies<S: PolicySource + ?Sized>(source: &S, policy_dir: &Path) -> VaultResult<usize> {
    let names = source.list_policy_names().await?;
    tokio::fs::create_dir_all(policy_dir)
        .await
        .map_err(|e| VaultError::io(policy_dir, e))?;

    stream::iter(names.iter().map(Ok::<_, VaultError>))
        .try_for_each_concurrent(MAX_CONCURRENT_FETCHES, move |name| async move {
            debug!(policy = %name, "Downloading policy");
            let document = source.fetch_policy(name).await?;
            let path = policy_dir.join(name);
            tokio::fs::write(&path, document)
                .await
                .map_err(|e| VaultError::io(&path, e))
        })
        .await?;
    info!(count = names.len(), "Downloaded all policies");

    remove_extraneous(policy_dir, &names).await?;
    Ok(names.len())
}

async fn write_binding(path: &Path, binding: &IdentityBinding) -> VaultResult<()> {
    let mut json = serde_json::to_string_pretty(binding).map_err(|e| VaultError::InvalidResponse(e.to_string()))?;
    json.push('\n');
    tokio::fs::write(path, json).await.map_err(|e| VaultError::io(path, e))
}

async fn remove_extraneous(policy_dir: &Path, names: &[String]) -> VaultResult<()> {
    let keep: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    let mut entries = tokio::fs::read_dir(policy_dir)
        .await
        .map_err(|e| VaultError::io(policy_dir, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| VaultError::io(policy_dir, e))?
    {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| VaultError::io(&path, e))?;
        if file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if !keep.contains(name.to_string_lossy().as_ref()) {
            info!(path = %path.display(), "Removing extraneous file");
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| VaultError::io(&path, e))?;
        }
    }
    Ok(())
}
