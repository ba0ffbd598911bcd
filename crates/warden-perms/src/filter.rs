//! Permission filters: query fragments that restrict a read or write to the
//! documents an identity holds the required rights on.

use std::sync::Arc;

use warden_core::{Document, Filter, ObjectId, Predicate, Value};

use crate::authorize::{authorize, Action};
use crate::error::Result;
use crate::identity::Identity;
use crate::rights::{required_bits, Right};

/// Collection holding binary-file metadata.
pub const FILES_COLLECTION: &str = "fs.files";

/// Where a collection keeps its ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclLocation {
    /// Top-level `_acl`, plus `value._acl` for wrapped documents.
    Entity,
    /// `metadata._acl`, used by binary-file metadata.
    FileMetadata,
}

impl AclLocation {
    pub fn for_collection(collection: &str) -> Self {
        if collection == FILES_COLLECTION {
            AclLocation::FileMetadata
        } else {
            AclLocation::Entity
        }
    }

    pub const fn path(self) -> &'static str {
        match self {
            AclLocation::Entity => "_acl",
            AclLocation::FileMetadata => "metadata._acl",
        }
    }
}

/// Builds the store-side fragment for an access check.
///
/// The default builder relies on bitwise predicates. Stores without them can
/// supply a different strategy.
pub trait AccessFilterBuilder: Send + Sync {
    fn build(&self, identity: &Identity, location: AclLocation, rights: &[Right]) -> Filter;
}

/// Matches ACEs with `$bitsAllSet` over the rights mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitmaskFilterBuilder;

impl AccessFilterBuilder for BitmaskFilterBuilder {
    fn build(&self, identity: &Identity, location: AclLocation, rights: &[Right]) -> Filter {
        let bits = required_bits(rights);
        let grantees: Vec<Value> = identity
            .identity_ids()
            .into_iter()
            .map(|id| Value::String(id.to_string()))
            .collect();

        let entry = |path: &str| {
            Filter::field(
                path,
                Predicate::ElemMatch(Box::new(Filter::And(vec![
                    Filter::field("rights", Predicate::BitsAllSet(bits.clone())),
                    Filter::eq("deny", false),
                    Filter::field("_id", Predicate::In(grantees.clone())),
                ]))),
            )
        };

        let mut alternatives = vec![entry(location.path())];
        if location == AclLocation::Entity {
            alternatives.push(entry("value._acl"));
        }
        // A subject can always read its own identity and role documents.
        if matches!(rights, [Right::Read]) {
            alternatives.push(Filter::field("_id", Predicate::In(self_ids(identity))));
        }
        Filter::Or(alternatives)
    }
}

fn self_ids(identity: &Identity) -> Vec<Value> {
    let mut ids = Vec::new();
    for id in identity.identity_ids() {
        ids.push(Value::String(id.to_string()));
        if let Some(oid) = ObjectId::parse_str(id) {
            ids.push(Value::ObjectId(oid));
        }
    }
    ids
}

/// Access policy: the bypass switch, the root rule, and the filter builder.
#[derive(Clone)]
pub struct AccessControl {
    bypass: bool,
    builder: Arc<dyn AccessFilterBuilder>,
}

impl AccessControl {
    pub fn new(bypass: bool) -> Self {
        Self {
            bypass,
            builder: Arc::new(BitmaskFilterBuilder),
        }
    }

    pub fn with_builder(mut self, builder: Arc<dyn AccessFilterBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn bypass(&self) -> bool {
        self.bypass
    }

    /// Whether `identity` skips every check.
    pub fn is_trusted(&self, identity: &Identity) -> bool {
        self.bypass || identity.is_root()
    }

    /// Fragment restricting a query on `collection` to documents where
    /// `identity` holds `rights`.
    pub fn filter(&self, identity: &Identity, collection: &str, rights: &[Right]) -> Filter {
        if self.is_trusted(identity) {
            return Filter::All;
        }
        self.builder
            .build(identity, AclLocation::for_collection(collection), rights)
    }

    /// Structural authorization for an in-process action.
    pub fn authorize(&self, identity: &Identity, entity: &Document, action: Action) -> Result<()> {
        if self.bypass {
            return Ok(());
        }
        authorize(identity, entity, action)
    }
}

impl Default for AccessControl {
    fn default() -> Self {
        Self::new(false)
    }
}

impl std::fmt::Debug for AccessControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControl")
            .field("bypass", &self.bypass)
            .finish_non_exhaustive()
    }
}
