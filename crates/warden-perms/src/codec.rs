//! Field encryption codec.
//!
//! A document lists the top-level fields to protect in `_encrypt`. Each listed
//! field holding a non-empty string is sealed on write and opened on read.
//! Failures are logged per field and the field keeps its original value.

use std::sync::Arc;

use warden_core::{Document, Value};

use crate::crypto::FieldCipher;

/// Field listing the names to encrypt.
pub const ENCRYPT_FIELD: &str = "_encrypt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Seal,
    Open,
}

/// Applies a [`FieldCipher`] to the fields a document declares.
#[derive(Clone)]
pub struct FieldCodec {
    cipher: Arc<dyn FieldCipher>,
}

impl FieldCodec {
    pub fn new(cipher: Arc<dyn FieldCipher>) -> Self {
        Self { cipher }
    }

    /// Field names listed in `_encrypt`. Non-string entries are ignored.
    pub fn declared_fields(doc: &Document) -> Vec<String> {
        match doc.get(ENCRYPT_FIELD) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        }
    }

    /// Encrypt declared fields in place.
    pub fn seal(&self, doc: &mut Document) {
        let fields = Self::declared_fields(doc);
        self.apply(&fields, doc, Direction::Seal);
    }

    /// Decrypt declared fields in place.
    pub fn open(&self, doc: &mut Document) {
        let fields = Self::declared_fields(doc);
        self.apply(&fields, doc, Direction::Open);
    }

    /// Encrypt `fields` in a document that does not carry its own list,
    /// such as the field-set of a patch.
    pub fn seal_fields(&self, fields: &[String], target: &mut Document) {
        self.apply(fields, target, Direction::Seal);
    }

    /// Decrypt `fields` in a document that does not carry its own list.
    pub fn open_fields(&self, fields: &[String], target: &mut Document) {
        self.apply(fields, target, Direction::Open);
    }

    fn apply(&self, fields: &[String], doc: &mut Document, direction: Direction) {
        for field in fields {
            let Some(Value::String(text)) = doc.get_mut(field) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            let result = match direction {
                Direction::Seal => self.cipher.encrypt(text),
                Direction::Open => self.cipher.decrypt(text),
            };
            match result {
                Ok(converted) => *text = converted,
                Err(e) => {
                    tracing::error!(field = %field, direction = ?direction, error = %e, "field codec failed");
                }
            }
        }
    }
}

impl std::fmt::Debug for FieldCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCodec").finish_non_exhaustive()
    }
}
