//! Structural authorization rules that ACL bits cannot express.

use warden_core::{Document, Value};

use crate::error::{PermsError, Result};
use crate::identity::{
    Identity, ADMINS_ID, ADMINS_NAME, RESERVED_ROLE_NAMES, RESERVED_USER_NAMES, ROOT_ID,
    ROOT_NAME, USERS_ID, USERS_NAME,
};

/// An in-process action needing authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub const fn name(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// System entities whose name is pinned.
const PINNED_NAMES: [(&str, &str); 3] = [
    (ROOT_ID, ROOT_NAME),
    (ADMINS_ID, ADMINS_NAME),
    (USERS_ID, USERS_NAME),
];

/// Check `identity` may perform `action` on `entity`.
///
/// Rules, first match wins:
/// 1. root is always allowed;
/// 2. non-root callers cannot create or delete the reserved roles or the
///    workflow user;
/// 3. the root user and the admins and users roles cannot be renamed;
/// 4. owners (by `userid` or `user`) are allowed;
/// 5. a subject may act on its own document, except delete it;
/// 6. anything else is allowed, leaving row access to the access filter.
pub fn authorize(identity: &Identity, entity: &Document, action: Action) -> Result<()> {
    if identity.is_root() {
        return Ok(());
    }

    let kind = text(entity, "_type");
    let name = text(entity, "name");
    let id = entity.get("_id").and_then(Value::id_string);

    if matches!(action, Action::Create | Action::Delete) {
        if kind == Some("role") {
            if let Some(name) = name {
                let lowered = name.to_lowercase();
                if RESERVED_ROLE_NAMES.contains(&lowered.as_str()) {
                    return Err(denied(identity, action, format!("role '{}' is reserved", name)));
                }
            }
        }
        if kind == Some("user") && name.map_or(false, |n| RESERVED_USER_NAMES.contains(&n)) {
            return Err(denied(identity, action, "the workflow user is reserved".into()));
        }
    }

    if action == Action::Update {
        if let Some(id) = id.as_deref() {
            for (pinned_id, pinned_name) in PINNED_NAMES {
                let renamed = name.map_or(true, |n| n.to_lowercase() != pinned_name);
                if id == pinned_id && renamed {
                    return Err(denied(
                        identity,
                        action,
                        format!("'{}' cannot be renamed", pinned_name),
                    ));
                }
            }
        }
    }

    let userid = entity.get("userid").and_then(Value::id_string);
    let owns = userid.as_deref() == Some(identity.username.as_str())
        || userid.as_deref() == Some(identity.id.as_str())
        || text(entity, "user") == Some(identity.username.as_str());
    if owns {
        return Ok(());
    }

    if id.as_deref() == Some(identity.id.as_str()) && action == Action::Delete {
        tracing::error!(subject = %identity.id, "refusing self-deletion");
        return Err(PermsError::PermissionDenied(
            "a subject cannot delete itself".into(),
        ));
    }

    Ok(())
}

fn text<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str)
}

fn denied(identity: &Identity, action: Action, reason: String) -> PermsError {
    tracing::warn!(subject = %identity.id, action = action.name(), %reason, "authorization denied");
    PermsError::PermissionDenied(reason)
}
