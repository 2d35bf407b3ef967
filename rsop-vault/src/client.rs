//! Secrets service HTTP client.
//!
//! Speaks the service's `/v1` JSON API: every response wraps its payload in a
//! `data` object, and listing is a `GET` with `?list=true`.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use rsop_gitops::IdentityBinding;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, error, instrument, warn};

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::retry::{with_retry_if, RetryConfig};
use crate::source::{AuthMount, PolicySource};

/// Response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PolicyData {
    policy: String,
}

#[derive(Debug, Deserialize)]
struct MountData {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    #[serde(default)]
    policies: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RoleData {
    #[serde(default)]
    token_policies: Option<Vec<String>>,
}

/// Secrets service client.
///
/// # Example
///
/// ```rust,no_run
/// use rsop_vault::{VaultClient, VaultConfig};
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let client = VaultClient::new(VaultConfig::from_env())?;
///     for name in client.list_policies().await? {
///         println!("{}", name);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct VaultClient {
    /// HTTP client instance.
    client: Client,

    /// Connection settings.
    config: VaultConfig,

    /// Retry behavior for transient failures.
    retry: RetryConfig,
}

impl VaultClient {
    /// Create a new client.
    pub fn new(config: VaultConfig) -> VaultResult<Self> {
        config.validate()?;
        let client = Client::builder().timeout(config.timeout()).build()?;
        let retry = RetryConfig::with_retries(config.max_retries);

        Ok(Self { client, config, retry })
    }

    /// Create a client configured from the environment.
    pub fn from_env() -> VaultResult<Self> {
        Self::new(VaultConfig::from_env())
    }

    /// Replace the retry behavior.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The token requests are made with.
    pub fn token(&self) -> Option<&str> {
        self.config.token.as_deref()
    }

    /// Connection settings.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Names of every ACL policy.
    #[instrument(skip(self))]
    pub async fn list_policies(&self) -> VaultResult<Vec<String>> {
        Ok(self.list("sys/policies/acl").await?.unwrap_or_default())
    }

    /// Raw document of an ACL policy.
    #[instrument(skip(self))]
    pub async fn read_policy(&self, name: &str) -> VaultResult<String> {
        let data: PolicyData = self
            .read(&format!("sys/policies/acl/{}", name))
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("policy '{}'", name)))?;
        Ok(data.policy)
    }

    /// Every enabled auth mount, ordered by path.
    #[instrument(skip(self))]
    pub async fn list_auth_mounts(&self) -> VaultResult<Vec<AuthMount>> {
        let mounts: BTreeMap<String, MountData> = self
            .read("sys/auth")
            .await?
            .ok_or_else(|| VaultError::InvalidResponse("sys/auth returned no data".to_string()))?;
        Ok(mounts
            .into_iter()
            .map(|(path, mount)| AuthMount::new(path, mount.kind))
            .collect())
    }

    /// Policies of the client's own token.
    #[instrument(skip(self))]
    pub async fn lookup_self(&self) -> VaultResult<Vec<String>> {
        let data: TokenData = self
            .read("auth/token/lookup-self")
            .await?
            .ok_or_else(|| VaultError::InvalidResponse("token lookup returned no data".to_string()))?;
        Ok(data.policies.unwrap_or_default())
    }

    /// Policies of another token. Needs a privileged client token.
    #[instrument(skip_all)]
    pub async fn lookup_token(&self, token: &str) -> VaultResult<Vec<String>> {
        let data: TokenData = self
            .write("auth/token/lookup", &json!({ "token": token }))
            .await?
            .ok_or_else(|| VaultError::NotFound("token".to_string()))?;
        Ok(data.policies.unwrap_or_default())
    }

    /// Policies of the token behind an accessor.
    #[instrument(skip(self))]
    pub async fn lookup_accessor(&self, accessor: &str) -> VaultResult<Vec<String>> {
        let data: TokenData = self
            .write("auth/token/lookup-accessor", &json!({ "accessor": accessor }))
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("accessor '{}'", accessor)))?;
        Ok(data.policies.unwrap_or_default())
    }

    /// `token_policies` of a role definition, or `None` if the role has none.
    #[instrument(skip(self))]
    pub async fn read_token_policies(&self, role_path: &str) -> VaultResult<Option<Vec<String>>> {
        let data: RoleData = self
            .read(role_path)
            .await?
            .ok_or_else(|| VaultError::NotFound(role_path.to_string()))?;
        Ok(data.token_policies)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut request = self.client.request(method, self.config.url(path));
        if let Some(ref token) = self.config.token {
            request = request.header("X-Vault-Token", token);
        }
        if let Some(ref namespace) = self.config.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }
        request
    }

    async fn read<T: DeserializeOwned>(&self, path: &str) -> VaultResult<Option<T>> {
        self.send(Method::GET, path, false, None).await
    }

    async fn list(&self, path: &str) -> VaultResult<Option<Vec<String>>> {
        let data: Option<ListData> = self.send(Method::GET, path, true, None).await?;
        Ok(data.map(|d| d.keys))
    }

    async fn write<T: DeserializeOwned>(&self, path: &str, body: &Value) -> VaultResult<Option<T>> {
        self.send(Method::POST, path, false, Some(body)).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        list: bool,
        body: Option<&Value>,
    ) -> VaultResult<Option<T>> {
        with_retry_if(
            &self.retry,
            || {
                debug!(method = %method, path = %path, list = list, "Sending request");
                let mut request = self.request(method.clone(), path);
                if list {
                    request = request.query(&[("list", "true")]);
                }
                if let Some(body) = body {
                    request = request.json(body);
                }
                async move {
                    let response = request.send().await?;
                    self.handle_response(response).await
                }
            },
            VaultError::is_retryable,
        )
        .await
    }

    async fn handle_response<T>(&self, response: reqwest::Response) -> VaultResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            error!(status = status.as_u16(), "Secrets service rejected the token");
            return Err(VaultError::AuthenticationFailed);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Secrets service API error ({}): {}", status.as_u16(), message);
            return Err(VaultError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| VaultError::InvalidResponse(e.to_string()))?;
        Ok(Some(envelope.data))
    }
}

#[async_trait]
impl PolicySource for VaultClient {
    async fn list_policy_names(&self) -> VaultResult<Vec<String>> {
        self.list_policies().await
    }

    async fn fetch_policy(&self, name: &str) -> VaultResult<String> {
        self.read_policy(name).await
    }

    async fn list_identity_mounts(&self) -> VaultResult<Vec<AuthMount>> {
        self.list_auth_mounts().await
    }

    async fn list_identities(&self, list_path: &str) -> VaultResult<Option<Vec<String>>> {
        self.list(list_path).await
    }

    async fn fetch_identity(&self, read_path: &str) -> VaultResult<Option<IdentityBinding>> {
        self.read(read_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_address() {
        let config = VaultConfig {
            address: "localhost:8200".to_string(),
            ..Default::default()
        };
        assert!(matches!(VaultClient::new(config), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_retry_follows_config() {
        let config = VaultConfig {
            max_retries: 4,
            ..VaultConfig::new("http://127.0.0.1:8200", "root")
        };
        let client = VaultClient::new(config).unwrap();
        assert_eq!(client.retry.max_attempts, 5);
        assert_eq!(client.token(), Some("root"));
    }

    #[test]
    fn test_envelope_shapes() {
        let mounts: Envelope<BTreeMap<String, MountData>> = serde_json::from_str(
            r#"{"data": {"token/": {"type": "token", "accessor": "a"}, "gcp/": {"type": "gcp"}}}"#,
        )
        .unwrap();
        assert_eq!(mounts.data["gcp/"].kind, "gcp");

        let token: Envelope<TokenData> =
            serde_json::from_str(r#"{"data": {"policies": ["default", "root"], "ttl": 0}}"#).unwrap();
        assert_eq!(token.data.policies.unwrap(), vec!["default", "root"]);

        let role: Envelope<RoleData> = serde_json::from_str(r#"{"data": {"bound_audiences": []}}"#).unwrap();
        assert!(role.data.token_policies.is_none());
    }
}
