//! RSoP lookups against a live secrets service.
//!
//! Given a token, a token accessor or the path of a role definition, find the
//! policies it carries and load them into an [`Rsop`].

use rsop_policy::{Policy, Rsop};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

use crate::client::VaultClient;
use crate::error::{VaultError, VaultResult};

/// Token prefixes, current and legacy: service, batch and recovery tokens.
const TOKEN_PREFIXES: &[&str] = &["hvs.", "hvb.", "hvr.", "s.", "b.", "r."];

/// Length of a token accessor.
const ACCESSOR_LEN: usize = 24;

/// What a command line argument refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// A client token.
    Token,
    /// A token accessor.
    TokenAccessor,
    /// Probably an API path to a role definition.
    RolePath,
}

impl AuthKind {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthKind::Token => "token",
            AuthKind::TokenAccessor => "token_accessor",
            AuthKind::RolePath => "role_path",
        }
    }
}

/// Guess whether `thing` is a token, a token accessor or a role path.
///
/// # Example
///
/// ```
/// use rsop_vault::{guess_auth_kind, AuthKind};
///
/// assert_eq!(guess_auth_kind("hvs.CAESIJ").unwrap(), AuthKind::Token);
/// assert_eq!(guess_auth_kind("auth/gcp/role/ci").unwrap(), AuthKind::RolePath);
/// assert!(guess_auth_kind("ci").is_err());
/// ```
pub fn guess_auth_kind(thing: &str) -> VaultResult<AuthKind> {
    if TOKEN_PREFIXES.iter().any(|prefix| thing.starts_with(prefix)) {
        return Ok(AuthKind::Token);
    }
    if thing.len() == ACCESSOR_LEN && thing.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Ok(AuthKind::TokenAccessor);
    }
    if thing.contains('/') {
        return Ok(AuthKind::RolePath);
    }
    Err(VaultError::UnrecognizedAuthThing(thing.to_string()))
}

/// Policy loader that prefers a local directory of policy documents and falls
/// back to the secrets service, caching what it fetches.
#[derive(Debug, Clone, Default)]
pub struct ReadthroughPolicyProvider {
    offline_dir: Option<PathBuf>,
    client: Option<VaultClient>,
}

impl ReadthroughPolicyProvider {
    /// Create a provider.
    ///
    /// With neither a directory nor a client every lookup fails.
    pub fn new(offline_dir: Option<PathBuf>, client: Option<VaultClient>) -> Self {
        Self { offline_dir, client }
    }

    /// Local policy directory, if any.
    pub fn offline_dir(&self) -> Option<&Path> {
        self.offline_dir.as_deref()
    }

    /// Load and parse a policy.
    #[instrument(skip(self))]
    pub async fn get_policy(&self, name: &str) -> VaultResult<Policy> {
        if let Some(policy) = self.read_offline(name).await? {
            return Ok(policy);
        }

        let client = self.client.as_ref().ok_or(VaultError::ClientRequired)?;
        let document = client.read_policy(name).await?;
        let policy = Policy::parse(&document, name)?;

        if let Some(ref dir) = self.offline_dir {
            let path = dir.join(name);
            if let Err(e) = cache(&path, &document).await {
                warn!(path = %path.display(), error = %e, "Failed to cache policy");
            }
        }
        Ok(policy)
    }

    /// Build the RSoP of a token, token accessor or role path.
    #[instrument(skip_all)]
    pub async fn get_rsop(&self, thing: &str) -> VaultResult<Rsop> {
        let client = self.client.as_ref().ok_or(VaultError::ClientRequired)?;
        let kind = guess_auth_kind(thing)?;
        debug!(kind = kind.as_str(), "Guessed auth kind");

        let names = match kind {
            AuthKind::Token if client.token() == Some(thing) => client.lookup_self().await?,
            AuthKind::Token => client.lookup_token(thing).await?,
            AuthKind::TokenAccessor => client.lookup_accessor(thing).await?,
            AuthKind::RolePath => client
                .read_token_policies(thing)
                .await?
                .ok_or_else(|| VaultError::MissingTokenPolicies(thing.to_string()))?,
        };

        let mut policies = Vec::with_capacity(names.len());
        for name in &names {
            policies.push(self.get_policy(name).await?);
        }
        Ok(Rsop::new(policies))
    }

    async fn read_offline(&self, name: &str) -> VaultResult<Option<Policy>> {
        let Some(ref dir) = self.offline_dir else {
            return Ok(None);
        };
        let path = dir.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(document) => Ok(Some(Policy::parse(&document, name)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::io(path, e)),
        }
    }
}

async fn cache(path: &Path, document: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, document).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_tokens() {
        for token in ["hvs.abc", "hvb.abc", "hvr.abc", "s.abc", "b.abc", "r.abc"] {
            assert_eq!(guess_auth_kind(token).unwrap(), AuthKind::Token, "{}", token);
        }
    }

    #[test]
    fn test_guess_accessor() {
        assert_eq!(
            guess_auth_kind("ABCDEFGHIJKLmnopqrst1234").unwrap(),
            AuthKind::TokenAccessor
        );
        // 23 characters
        assert!(guess_auth_kind("ABCDEFGHIJKLmnopqrst123").is_err());
        // non-alphanumeric
        assert!(guess_auth_kind("ABCDEFGHIJKLmnopqrst123-").is_err());
    }

    #[test]
    fn test_guess_role_path() {
        assert_eq!(guess_auth_kind("auth/kubernetes/role/web").unwrap(), AuthKind::RolePath);
        assert!(matches!(
            guess_auth_kind("just-a-name"),
            Err(VaultError::UnrecognizedAuthThing(ref t)) if t == "just-a-name"
        ));
    }

    #[tokio::test]
    async fn test_offline_policy_without_client() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("reader"), r#"path "secret/*" { capabilities = ["read"] }"#).unwrap();

        let provider = ReadthroughPolicyProvider::new(Some(dir.path().to_path_buf()), None);
        let policy = provider.get_policy("reader").await.unwrap();
        assert_eq!(policy.name(), "reader");
        assert_eq!(policy.rules().len(), 1);

        assert!(matches!(
            provider.get_policy("missing").await,
            Err(VaultError::ClientRequired)
        ));
        assert!(matches!(
            provider.get_rsop("hvs.abc").await,
            Err(VaultError::ClientRequired)
        ));
    }

    #[tokio::test]
    async fn test_offline_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken"), "path {").unwrap();

        let provider = ReadthroughPolicyProvider::new(Some(dir.path().to_path_buf()), None);
        assert!(matches!(provider.get_policy("broken").await, Err(VaultError::Policy(_))));
    }
}
