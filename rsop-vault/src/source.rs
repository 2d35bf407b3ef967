//! Policy source abstraction.
//!
//! A policy source serves policy documents and the identities of each auth
//! mount. The mirroring tooling reads from one to populate a repository.

use async_trait::async_trait;
use rsop_gitops::IdentityBinding;
use serde::{Deserialize, Serialize};

use crate::error::VaultResult;

/// An enabled auth method.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuthMount {
    /// Mount path without the trailing slash, e.g. `gcp` or `team/oidc`.
    pub path: String,
    /// Auth method type, e.g. `gcp`.
    pub kind: String,
}

impl AuthMount {
    /// Create a mount description.
    pub fn new(path: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            path: path.into().trim_end_matches('/').to_string(),
            kind: kind.into(),
        }
    }

    /// Endpoints to enumerate for this mount, if its type is known.
    pub fn endpoints(&self) -> Option<&'static [IdentityEndpoint]> {
        identity_endpoints(&self.kind)
    }
}

/// Where a mount lists its identities and where it reads each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityEndpoint {
    /// Endpoint listed for identity names.
    pub list: &'static str,
    /// Endpoint an identity is read from, by appending its name.
    pub read: &'static str,
}

impl IdentityEndpoint {
    /// API path listed for identity names, e.g. `auth/gcp/roles`.
    pub fn list_path(&self, mount: &str) -> String {
        format!("auth/{}/{}", mount, self.list)
    }

    /// API path an identity is read from, e.g. `auth/gcp/role/ci`.
    pub fn read_path(&self, mount: &str, name: &str) -> String {
        format!("auth/{}/{}/{}", mount, self.read, name)
    }
}

const ROLES: &[IdentityEndpoint] = &[IdentityEndpoint {
    list: "roles",
    read: "role",
}];
const ROLE: &[IdentityEndpoint] = &[IdentityEndpoint {
    list: "role",
    read: "role",
}];
const GROUPS: &[IdentityEndpoint] = &[IdentityEndpoint {
    list: "groups",
    read: "groups",
}];
const GROUPS_AND_USERS: &[IdentityEndpoint] = &[
    IdentityEndpoint {
        list: "groups",
        read: "groups",
    },
    IdentityEndpoint {
        list: "users",
        read: "users",
    },
];
const USERS: &[IdentityEndpoint] = &[IdentityEndpoint {
    list: "users",
    read: "users",
}];
const TOKEN_ROLES: &[IdentityEndpoint] = &[IdentityEndpoint {
    list: "roles",
    read: "roles",
}];

/// Identity endpoints for an auth method type.
pub fn identity_endpoints(kind: &str) -> Option<&'static [IdentityEndpoint]> {
    match kind {
        "aws" | "gcp" => Some(ROLES),
        "azure" | "kubernetes" | "oidc" | "oci" | "saml" => Some(ROLE),
        "kerberos" => Some(GROUPS),
        "ldap" | "okta" => Some(GROUPS_AND_USERS),
        "radius" => Some(USERS),
        "token" => Some(TOKEN_ROLES),
        _ => None,
    }
}

/// Read-only access to the policies and identities of a secrets service.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Names of every ACL policy.
    async fn list_policy_names(&self) -> VaultResult<Vec<String>>;

    /// Raw document of a policy.
    async fn fetch_policy(&self, name: &str) -> VaultResult<String>;

    /// Every enabled auth mount, ordered by path.
    async fn list_identity_mounts(&self) -> VaultResult<Vec<AuthMount>>;

    /// Identity names under `list_path`, or `None` if there is nothing to
    /// list.
    async fn list_identities(&self, list_path: &str) -> VaultResult<Option<Vec<String>>>;

    /// Binding of the identity at `read_path`, or `None` if it does not exist.
    async fn fetch_identity(&self, read_path: &str) -> VaultResult<Option<IdentityBinding>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_table() {
        assert_eq!(identity_endpoints("gcp"), Some(ROLES));
        assert_eq!(identity_endpoints("kubernetes"), Some(ROLE));
        assert_eq!(identity_endpoints("okta").map(|e| e.len()), Some(2));
        assert_eq!(identity_endpoints("radius"), Some(USERS));
        assert!(identity_endpoints("userpass").is_none());
        assert!(identity_endpoints("cert").is_none());
    }

    #[test]
    fn test_endpoint_paths() {
        let mount = AuthMount::new("team/gcp/", "gcp");
        assert_eq!(mount.path, "team/gcp");

        let endpoint = mount.endpoints().unwrap()[0];
        assert_eq!(endpoint.list_path(&mount.path), "auth/team/gcp/roles");
        assert_eq!(endpoint.read_path(&mount.path, "ci"), "auth/team/gcp/role/ci");
    }
}
