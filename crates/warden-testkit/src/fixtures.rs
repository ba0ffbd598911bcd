//! Test fixtures and helpers.
//!
//! A gateway over an in-memory store with field encryption enabled, a few
//! well-known identities, and a token verifier that knows them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;
use warden::{Gateway, GatewayConfig, Role};
use warden_core::Document;
use warden_perms::{
    ChaChaFieldCipher, FieldCipher, Identity, IdentityVerifier, PermsError, ADMINS_ID,
    ADMINS_NAME, USERS_ID, USERS_NAME,
};
use warden_store::{DocumentStore, MemoryStore, StoreError, WriteConcern};

/// A random 24-character hex id.
pub fn random_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// An ordinary user in the users role.
pub fn alice() -> Identity {
    Identity::new("a11ce0000000000000000001", "Alice", "alice").with_role(USERS_ID, USERS_NAME)
}

/// Another ordinary user in the users role.
pub fn bob() -> Identity {
    Identity::new("b0b000000000000000000002", "Bob", "bob").with_role(USERS_ID, USERS_NAME)
}

/// A member of the admins role.
pub fn admin() -> Identity {
    Identity::new("ad31n0000000000000000003", "Admin", "admin")
        .with_role(USERS_ID, USERS_NAME)
        .with_role(ADMINS_ID, ADMINS_NAME)
}

/// Verifies tokens against a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, identity: Identity) -> Self {
        self.tokens.insert(token.to_string(), identity);
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> warden_perms::Result<Identity> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| PermsError::Unauthenticated("unknown token".into()))
    }
}

/// A gateway wired to an in-memory store, with direct access to the store
/// for inspecting stored forms.
pub struct TestFixture {
    pub store: MemoryStore,
    pub gateway: Gateway<MemoryStore>,
    pub cipher: Arc<ChaChaFieldCipher>,
}

impl TestFixture {
    /// Create a fixture with the default configuration.
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    /// Create a fixture with a random encryption secret.
    pub fn with_config(config: GatewayConfig) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::with_secret(config, &secret)
    }

    /// Create a fixture whose cipher is derived from `secret`.
    pub fn with_secret(config: GatewayConfig, secret: &[u8]) -> Self {
        let store = MemoryStore::new();
        let cipher = Arc::new(ChaChaFieldCipher::from_secret(secret));
        let verifier = StaticVerifier::new()
            .with_token("alice-token", alice())
            .with_token("bob-token", bob())
            .with_token("admin-token", admin());
        let gateway = Gateway::new(store.clone(), config)
            .with_cipher(Arc::clone(&cipher) as Arc<dyn FieldCipher>)
            .with_verifier(Arc::new(verifier));
        Self {
            store,
            gateway,
            cipher,
        }
    }

    /// Store the built-in users role, so new users can be registered.
    pub async fn seed_users_role(&self) -> Result<(), StoreError> {
        let role = Role::new(USERS_ID, USERS_NAME);
        self.store
            .insert_one("users", role.as_document().clone(), WriteConcern::default())
            .await?;
        Ok(())
    }

    /// Stored documents of `collection`, bypassing the gateway.
    pub fn raw(&self, collection: &str) -> Vec<Document> {
        self.store.documents(collection).unwrap_or_default()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
