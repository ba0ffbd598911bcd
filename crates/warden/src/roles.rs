//! Role membership, consulted when a user entity is created.

use std::sync::Arc;

use async_trait::async_trait;
use warden_core::{id_filter, Document, Filter, Value};
use warden_perms::RoleRef;
use warden_store::{DocumentStore, LazyStore, StoreConnector, StoreExt, WriteConcern};

use crate::error::{GatewayError, Result};

/// Collection holding users and roles.
pub const USERS_COLLECTION: &str = "users";

const MEMBERS_FIELD: &str = "members";

/// A role document.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    doc: Document,
}

impl Role {
    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    /// A new role document with no members.
    pub fn new(id: &str, name: &str) -> Self {
        let mut doc = Document::new();
        doc.insert("_id".into(), Value::from(id));
        doc.insert("_type".into(), Value::from("role"));
        doc.insert("name".into(), Value::from(name));
        doc.insert(MEMBERS_FIELD.into(), Value::Array(Vec::new()));
        Self { doc }
    }

    pub fn id(&self) -> Option<String> {
        self.doc.get("_id").and_then(Value::id_string)
    }

    pub fn name(&self) -> Option<&str> {
        self.doc.get("name").and_then(Value::as_str)
    }

    pub fn members(&self) -> Vec<RoleRef> {
        self.doc
            .get(MEMBERS_FIELD)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_document)
                    .filter_map(|member| {
                        Some(RoleRef {
                            id: member.get("_id").and_then(Value::id_string)?,
                            name: member
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_member(&self, id: &str) -> bool {
        self.members().iter().any(|member| member.id == id)
    }

    /// Add a member. Returns false when it was already present.
    pub fn add_member(&mut self, id: &str, name: &str) -> bool {
        if self.has_member(id) {
            return false;
        }
        let mut member = Document::new();
        member.insert("_id".into(), Value::from(id));
        member.insert("name".into(), Value::from(name));

        let members = self
            .doc
            .entry(MEMBERS_FIELD.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !matches!(members, Value::Array(_)) {
            *members = Value::Array(Vec::new());
        }
        if let Value::Array(items) = members {
            items.push(Value::Document(member));
        }
        true
    }

    pub fn as_document(&self) -> &Document {
        &self.doc
    }
}

/// Lookup and persistence of roles.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>>;
    async fn save(&self, role: &Role) -> Result<()>;
}

/// Keeps roles as `_type: "role"` documents in the users collection.
///
/// Access is trusted: role membership changes are a side effect of an
/// already authorized write.
pub struct DocumentRoleStore<C: StoreConnector> {
    store: Arc<LazyStore<C>>,
}

impl<C: StoreConnector> DocumentRoleStore<C> {
    pub fn new(store: Arc<LazyStore<C>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<C: StoreConnector> RoleStore for DocumentRoleStore<C> {
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>> {
        let store = self.store.get().await?;
        let filter = Filter::and(vec![Filter::eq("_type", "role"), Filter::eq("name", name)]);
        Ok(store
            .find_one(USERS_COLLECTION, &filter)
            .await?
            .map(Role::from_document))
    }

    async fn save(&self, role: &Role) -> Result<()> {
        let id = role
            .id()
            .ok_or_else(|| GatewayError::InvalidArgument("role has no _id".into()))?;
        let store = self.store.get().await?;
        let outcome = store
            .replace_one(
                USERS_COLLECTION,
                &id_filter(&id),
                role.as_document().clone(),
                WriteConcern::default(),
            )
            .await?;
        if outcome.matched == 0 {
            store
                .insert_one(USERS_COLLECTION, role.as_document().clone(), WriteConcern::default())
                .await?;
        }
        Ok(())
    }
}
