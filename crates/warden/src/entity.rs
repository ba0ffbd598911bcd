//! Entity metadata: resource defaults, actor stamps, and the policy for
//! carrying underscore fields forward across full updates.

use chrono::{DateTime, Utc};
use warden_core::{Document, Value};
use warden_perms::{Acl, Identity, RightsMask, ADMINS_ID, ADMINS_NAME};

use crate::error::{GatewayError, Result};

pub const TYPE_FIELD: &str = "_type";
pub const ACL_FIELD: &str = "_acl";
pub const VERSION_FIELD: &str = "_version";
pub const CREATED_FIELD: &str = "_created";
pub const CREATED_BY_FIELD: &str = "_createdby";
pub const CREATED_BY_ID_FIELD: &str = "_createdbyid";
pub const MODIFIED_FIELD: &str = "_modified";
pub const MODIFIED_BY_FIELD: &str = "_modifiedby";
pub const MODIFIED_BY_ID_FIELD: &str = "_modifiedbyid";

/// Transient reason for a change. Moved into history, never persisted.
pub const UPDATE_REASON_FIELD: &str = "_updatereason";

/// `_type` given to entities that declare none.
pub const DEFAULT_TYPE: &str = "unknown";

/// What a full update does with an underscore field of the prior version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataPolicy {
    /// Always copied from the prior version.
    Preserve,
    /// Ignored; the pipeline stamps a fresh value.
    Restamp,
    /// Copied when the new document lacks it; an explicit null removes it.
    CarryForward,
}

const METADATA_POLICY: [(&str, MetadataPolicy); 6] = [
    (CREATED_FIELD, MetadataPolicy::Preserve),
    (CREATED_BY_FIELD, MetadataPolicy::Preserve),
    (CREATED_BY_ID_FIELD, MetadataPolicy::Preserve),
    (MODIFIED_FIELD, MetadataPolicy::Restamp),
    (MODIFIED_BY_FIELD, MetadataPolicy::Restamp),
    (MODIFIED_BY_ID_FIELD, MetadataPolicy::Restamp),
];

/// Policy for `field`, or `None` for ordinary (non-underscore) fields.
pub fn metadata_policy(field: &str) -> Option<MetadataPolicy> {
    if !field.starts_with('_') {
        return None;
    }
    let policy = METADATA_POLICY
        .iter()
        .find(|(name, _)| *name == field)
        .map_or(MetadataPolicy::CarryForward, |(_, policy)| *policy);
    Some(policy)
}

/// Merge the metadata of `prior` into `item` according to [`metadata_policy`].
pub fn merge_metadata(prior: &Document, item: &mut Document) {
    for (field, value) in prior {
        match metadata_policy(field) {
            None | Some(MetadataPolicy::Restamp) => {}
            Some(MetadataPolicy::Preserve) => {
                item.insert(field.clone(), value.clone());
            }
            Some(MetadataPolicy::CarryForward) => match item.get(field) {
                None => {
                    item.insert(field.clone(), value.clone());
                }
                Some(Value::Null) => {
                    item.remove(field);
                }
                Some(_) => {}
            },
        }
    }
}

/// Who changed an entity, and when.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamp {
    pub at: DateTime<Utc>,
    pub by: String,
    pub by_id: String,
}

impl Stamp {
    pub fn now(identity: &Identity) -> Self {
        Self {
            at: warden_core::value::now(),
            by: identity.name.clone(),
            by_id: identity.id.clone(),
        }
    }

    pub fn write_created(&self, doc: &mut Document) {
        self.write(doc, CREATED_FIELD, CREATED_BY_FIELD, CREATED_BY_ID_FIELD);
    }

    pub fn write_modified(&self, doc: &mut Document) {
        self.write(doc, MODIFIED_FIELD, MODIFIED_BY_FIELD, MODIFIED_BY_ID_FIELD);
    }

    fn write(&self, doc: &mut Document, at: &str, by: &str, by_id: &str) {
        doc.insert(at.to_string(), Value::Date(self.at));
        doc.insert(by.to_string(), Value::String(self.by.clone()));
        doc.insert(by_id.to_string(), Value::String(self.by_id.clone()));
    }
}

/// Apply resource defaults and return the normalized ACL.
///
/// A missing `_type` becomes [`DEFAULT_TYPE`] and is lower-cased. A missing
/// ACL becomes empty, and an empty ACL grants the admins role full control.
/// String rights masks are normalized to integers.
pub fn ensure_resource(doc: &mut Document) -> Result<Acl> {
    let kind = match doc.get(TYPE_FIELD) {
        None | Some(Value::Null) => DEFAULT_TYPE.to_string(),
        Some(Value::String(kind)) => kind.to_lowercase(),
        Some(other) => {
            return Err(GatewayError::InvalidArgument(format!(
                "_type cannot be a {}",
                other.type_name()
            )))
        }
    };
    doc.insert(TYPE_FIELD.to_string(), Value::String(kind));

    let mut acl = Acl::from_value(doc.get(ACL_FIELD).unwrap_or(&Value::Null))?;
    if acl.is_empty() {
        acl.add_right(ADMINS_ID, ADMINS_NAME, RightsMask::FULL_CONTROL);
    }
    doc.insert(ACL_FIELD.to_string(), acl.to_value());
    Ok(acl)
}

/// Grant `identity` full control unless it already has an entry.
/// Returns whether the ACL changed.
pub fn ensure_owner(doc: &mut Document, acl: &mut Acl, identity: &Identity) -> bool {
    if acl.find(&identity.id).is_some() {
        return false;
    }
    acl.add_right(&identity.id, &identity.name, RightsMask::FULL_CONTROL);
    doc.insert(ACL_FIELD.to_string(), acl.to_value());
    true
}

/// Display name used in log events.
pub fn display_name(doc: &Document) -> &str {
    doc.get("name")
        .or_else(|| doc.get("_name"))
        .and_then(Value::as_str)
        .unwrap_or("")
}

pub fn version_of(doc: &Document) -> Option<i64> {
    doc.get(VERSION_FIELD).and_then(Value::as_i64)
}
