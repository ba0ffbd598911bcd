//! Access-control entries and lists.

use warden_core::{Document, Value};

use crate::error::{PermsError, Result};
use crate::rights::{required_bits, Right, RightsMask};

/// One grant (or denial) to a user or role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    /// Grantee id.
    pub id: String,
    /// Grantee display name.
    pub name: String,
    pub rights: RightsMask,
    pub deny: bool,
}

impl Ace {
    pub fn grant(id: impl Into<String>, name: impl Into<String>, rights: RightsMask) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rights,
            deny: false,
        }
    }

    pub fn full_control(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::grant(id, name, RightsMask::FULL_CONTROL)
    }

    /// Parse the stored `{_id, name, rights, deny}` form.
    pub fn from_value(value: &Value) -> Result<Self> {
        let doc = value
            .as_document()
            .ok_or_else(|| PermsError::InvalidAcl(format!("ace cannot be a {}", value.type_name())))?;
        let id = doc
            .get("_id")
            .and_then(Value::id_string)
            .ok_or_else(|| PermsError::InvalidAcl("ace is missing _id".into()))?;
        let name = doc
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let rights = match doc.get("rights") {
            Some(rights) => RightsMask::from_value(rights)?,
            None => RightsMask::NONE,
        };
        let deny = doc.get("deny").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self {
            id,
            name,
            rights,
            deny,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut doc = Document::new();
        doc.insert("_id".into(), Value::String(self.id.clone()));
        doc.insert("name".into(), Value::String(self.name.clone()));
        doc.insert("rights".into(), self.rights.to_value());
        doc.insert("deny".into(), Value::Bool(self.deny));
        Value::Document(doc)
    }
}

/// An ordered access-control list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Acl(Vec<Ace>);

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<Ace>) -> Self {
        Self(entries)
    }

    /// Parse a stored list. A missing or null list is empty.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Array(items) => items
                .iter()
                .map(Ace::from_value)
                .collect::<Result<Vec<_>>>()
                .map(Self),
            other => Err(PermsError::InvalidAcl(format!(
                "acl cannot be a {}",
                other.type_name()
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.0.iter().map(Ace::to_value).collect())
    }

    pub fn entries(&self) -> &[Ace] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ace> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Ace> {
        self.0.iter().find(|ace| ace.id == id)
    }

    /// Grant rights to `id`, merging into its existing entry if present.
    pub fn add_right(&mut self, id: &str, name: &str, rights: RightsMask) {
        match self.0.iter_mut().find(|ace| ace.id == id) {
            Some(ace) => ace.rights = ace.rights.union(rights),
            None => self.0.push(Ace::grant(id, name, rights)),
        }
    }

    /// In-process check equivalent to the bitmask access filter.
    pub fn permits(&self, identity_ids: &[&str], rights: &[Right]) -> bool {
        let bits = required_bits(rights);
        self.0.iter().any(|ace| {
            !ace.deny && identity_ids.contains(&ace.id.as_str()) && ace.rights.has_bits(&bits)
        })
    }
}

impl FromIterator<Ace> for Acl {
    fn from_iter<I: IntoIterator<Item = Ace>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
