//! End-to-end tests for the secrets service client, mirroring and provider.
//!
//! A wiremock server stands in for the service. Fixtures are created one at a
//! time through a process-wide lock that each fixture holds until dropped.

use rsop_gitops::{ChangeImpactPropagator, ChangedFile, GitOpsConfig, MemoryRepository, Mutation, Revision};
use rsop_policy::Capability;
use rsop_vault::{
    download_all, PolicySource, ReadthroughPolicyProvider, RetryConfig, VaultClient, VaultConfig, VaultError,
};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Mutex, MutexGuard};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT_TOKEN: &str = "hvs.root-token";

static SERVICE_LOCK: Mutex<()> = Mutex::const_new(());

/// A mock secrets service and a scratch directory.
struct TestVault {
    /// Mock service.
    server: MockServer,
    /// Scratch directory for mirrored files.
    dir: TempDir,
    /// Held for the fixture's lifetime.
    _guard: MutexGuard<'static, ()>,
}

impl TestVault {
    async fn start() -> Self {
        let guard = SERVICE_LOCK.lock().await;
        Self {
            server: MockServer::start().await,
            dir: tempfile::tempdir().unwrap(),
            _guard: guard,
        }
    }

    fn config(&self) -> VaultConfig {
        VaultConfig {
            namespace: Some("team".to_string()),
            timeout_secs: 5,
            max_retries: 0,
            ..VaultConfig::new(self.server.uri(), ROOT_TOKEN)
        }
    }

    fn client(&self) -> VaultClient {
        VaultClient::new(self.config()).unwrap()
    }

    async fn mount_policy(&self, name: &str, document: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/sys/policies/acl/{}", name)))
            .and(header("X-Vault-Token", ROOT_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "name": name, "policy": document }
            })))
            .mount(&self.server)
            .await;
    }

    async fn mount_list(&self, api_path: &str, keys: &[&str]) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/{}", api_path)))
            .and(query_param("list", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "keys": keys } })))
            .mount(&self.server)
            .await;
    }

    async fn mount_read(&self, api_path: &str, data: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/{}", api_path)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
            .mount(&self.server)
            .await;
    }
}

const READER: &str = r#"path "secret/*" { capabilities = ["read", "list"] }"#;
const DENY_ADMIN: &str = r#"path "secret/admin" { capabilities = ["deny"] }"#;

#[tokio::test]
async fn test_client_sends_token_and_namespace() {
    let vault = TestVault::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/policies/acl"))
        .and(query_param("list", "true"))
        .and(header("X-Vault-Token", ROOT_TOKEN))
        .and(header("X-Vault-Namespace", "team"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "keys": ["default", "reader"] }
        })))
        .expect(1)
        .mount(&vault.server)
        .await;

    let names = vault.client().list_policy_names().await.unwrap();
    assert_eq!(names, vec!["default", "reader"]);
}

#[tokio::test]
async fn test_list_not_found_is_empty() {
    let vault = TestVault::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/auth/gcp/roles"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errors": [] })))
        .mount(&vault.server)
        .await;

    assert!(vault.client().list_identities("auth/gcp/roles").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_token() {
    let vault = TestVault::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/auth"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "errors": ["permission denied"] })))
        .mount(&vault.server)
        .await;

    let err = vault.client().list_identity_mounts().await.unwrap_err();
    assert!(matches!(err, VaultError::AuthenticationFailed));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let vault = TestVault::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/policies/acl/flaky"))
        .respond_with(ResponseTemplate::new(503).set_body_string("standby"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&vault.server)
        .await;
    vault.mount_policy("flaky", READER).await;

    let client = vault.client().with_retry(RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential_base: 2.0,
    });
    assert_eq!(client.fetch_policy("flaky").await.unwrap(), READER);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let vault = TestVault::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/policies/acl/bad"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid path"))
        .expect(1)
        .mount(&vault.server)
        .await;

    let client = vault.client().with_retry(RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential_base: 2.0,
    });
    let err = client.fetch_policy("bad").await.unwrap_err();
    assert!(matches!(err, VaultError::ApiError { status: 400, .. }));
}

#[tokio::test]
async fn test_mirror_then_analyze() {
    let vault = TestVault::start().await;
    vault
        .mount_read(
            "sys/auth",
            json!({
                "gcp/": { "type": "gcp", "accessor": "auth_gcp_1" },
                "token/": { "type": "token", "accessor": "auth_token_1" }
            }),
        )
        .await;
    vault.mount_list("auth/gcp/roles", &["ci"]).await;
    vault
        .mount_read(
            "auth/gcp/role/ci",
            json!({ "bound_service_accounts": ["ci@example"], "token_policies": ["reader"], "policies": null }),
        )
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/auth/token/roles"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&vault.server)
        .await;
    vault.mount_list("sys/policies/acl", &["default", "reader"]).await;
    vault.mount_policy("default", "").await;
    vault.mount_policy("reader", READER).await;

    let config = GitOpsConfig::default();
    let summary = download_all(&vault.client(), vault.dir.path(), &config).await.unwrap();
    assert_eq!(summary.identities, 1);
    assert_eq!(summary.policies, 2);

    let binding = std::fs::read(vault.dir.path().join("auth/gcp/role/ci")).unwrap();
    let reader = std::fs::read(vault.dir.path().join("sys/policies/acl/reader")).unwrap();

    // the mirrored files feed straight into the change-impact analysis
    let main = Revision::commit("main");
    let repo = MemoryRepository::new()
        .with_file(main.clone(), "auth/gcp/role/ci", binding.clone())
        .with_file(main, "sys/policies/acl/reader", r#"path "secret/*" { capabilities = ["read"] }"#)
        .with_file(Revision::Working, "auth/gcp/role/ci", binding)
        .with_file(Revision::Working, "sys/policies/acl/reader", reader);
    let report = ChangeImpactPropagator::new(&repo, Revision::commit("main"), &config)
        .propagate(&[ChangedFile::new("sys/policies/acl/reader", Mutation::Modified)])
        .await
        .unwrap();

    let diff = report.get("auth/gcp/role/ci").unwrap();
    assert_eq!(diff.metrics().capability_changes, 1);
    assert!(diff
        .added
        .as_ref()
        .unwrap()
        .granted_by("secret/*", Capability::List)
        .is_some());
}

#[tokio::test]
async fn test_rsop_for_own_token() {
    let vault = TestVault::start().await;
    vault
        .mount_read("auth/token/lookup-self", json!({ "policies": ["reader", "deny-admin"] }))
        .await;
    vault.mount_policy("reader", READER).await;
    vault.mount_policy("deny-admin", DENY_ADMIN).await;

    let cache = vault.dir.path().join("cache");
    let provider = ReadthroughPolicyProvider::new(Some(cache.clone()), Some(vault.client()));
    let rsop = provider.get_rsop(ROOT_TOKEN).await.unwrap();

    assert_eq!(rsop.policy_names(), vec!["deny-admin", "reader"]);
    let map = rsop.capability_map();
    assert_eq!(map.granted_by("secret/admin", Capability::Deny), Some(&["deny-admin".to_string()][..]));
    assert!(map.granted_by("secret/*", Capability::Read).is_some());

    // fetched policies were cached
    assert_eq!(std::fs::read_to_string(cache.join("reader")).unwrap(), READER);
}

#[tokio::test]
async fn test_rsop_for_other_token_and_accessor() {
    let vault = TestVault::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token/lookup"))
        .and(body_json(json!({ "token": "hvs.other" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "policies": ["reader"] }
        })))
        .expect(1)
        .mount(&vault.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token/lookup-accessor"))
        .and(body_json(json!({ "accessor": "ABCDEFGHIJKLmnopqrst1234" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "policies": ["default"] }
        })))
        .expect(1)
        .mount(&vault.server)
        .await;
    vault.mount_policy("reader", READER).await;
    vault.mount_policy("default", "").await;

    let provider = ReadthroughPolicyProvider::new(None, Some(vault.client()));
    let rsop = provider.get_rsop("hvs.other").await.unwrap();
    assert_eq!(rsop.policy_names(), vec!["reader"]);

    let rsop = provider.get_rsop("ABCDEFGHIJKLmnopqrst1234").await.unwrap();
    assert_eq!(rsop.policy_names(), vec!["default"]);
    assert!(rsop.capability_map().is_empty());
}

#[tokio::test]
async fn test_rsop_for_role_path() {
    let vault = TestVault::start().await;
    vault
        .mount_read("auth/kubernetes/role/web", json!({ "token_policies": ["reader"] }))
        .await;
    vault
        .mount_read("auth/kubernetes/role/bare", json!({ "bound_service_account_names": ["web"] }))
        .await;
    vault.mount_policy("reader", READER).await;

    let provider = ReadthroughPolicyProvider::new(None, Some(vault.client()));
    let rsop = provider.get_rsop("auth/kubernetes/role/web").await.unwrap();
    assert_eq!(rsop.policy_names(), vec!["reader"]);

    let err = provider.get_rsop("auth/kubernetes/role/bare").await.unwrap_err();
    assert!(matches!(err, VaultError::MissingTokenPolicies(_)));
}
