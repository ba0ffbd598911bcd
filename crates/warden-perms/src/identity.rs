//! Resolved caller identities and well-known principals.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The root user. Always passes filtering and authorization.
pub const ROOT_ID: &str = "59f1f6e6f0a22200126638d8";
pub const ROOT_NAME: &str = "root";

/// The administrators role.
pub const ADMINS_ID: &str = "5a1702fa245d9013697656fb";
pub const ADMINS_NAME: &str = "admins";

/// The role every user belongs to.
pub const USERS_ID: &str = "5a17f157c4815318c8536c21";
pub const USERS_NAME: &str = "users";

/// Name of the workflow role and the workflow execution user.
pub const WORKFLOW_NAME: &str = "workflow";

/// Role names that only root may create or delete (case-insensitive).
pub const RESERVED_ROLE_NAMES: [&str; 3] = [USERS_NAME, ADMINS_NAME, WORKFLOW_NAME];

/// User names that only root may create or delete (exact match).
pub const RESERVED_USER_NAMES: [&str; 1] = [WORKFLOW_NAME];

/// A role the identity belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<RoleRef>,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            username: username.into(),
            roles: Vec::new(),
        }
    }

    /// Add a role membership.
    pub fn with_role(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.roles.push(RoleRef {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    pub fn root() -> Self {
        Self::new(ROOT_ID, ROOT_NAME, ROOT_NAME)
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    /// The subject id followed by every role id.
    pub fn identity_ids(&self) -> Vec<&str> {
        std::iter::once(self.id.as_str())
            .chain(self.roles.iter().map(|role| role.id.as_str()))
            .collect()
    }

    pub fn has_role(&self, id: &str) -> bool {
        self.roles.iter().any(|role| role.id == id)
    }
}

/// Resolves an opaque token into an identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Fails with [`PermsError::Unauthenticated`](crate::PermsError::Unauthenticated)
    /// when the token is not valid.
    async fn verify(&self, token: &str) -> Result<Identity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ids() {
        let identity = Identity::new("u1", "Alice", "alice")
            .with_role(USERS_ID, USERS_NAME)
            .with_role("r2", "editors");
        assert_eq!(identity.identity_ids(), vec!["u1", USERS_ID, "r2"]);
        assert!(identity.has_role("r2"));
        assert!(!identity.is_root());
        assert!(Identity::root().is_root());
    }

    #[test]
    fn test_identity_json_shape() {
        let identity: Identity = serde_json::from_value(serde_json::json!({
            "_id": "u1", "name": "Alice", "username": "alice",
            "roles": [{"_id": "r1", "name": "users"}]
        }))
        .unwrap();
        assert_eq!(identity.roles[0].id, "r1");
    }
}
