//! # Warden Core
//!
//! Pure primitives for Warden: store-native documents, filters and patches,
//! query translation, and structural diff.
//!
//! This crate contains no I/O and no policy. It describes what a document
//! store is asked to do and how caller JSON maps onto it.
//!
//! ## Key Types
//!
//! - [`Value`] / [`Document`] - The store-native value model
//! - [`ObjectId`] - 12-byte native document identifier
//! - [`Filter`] / [`Update`] - Store-native filter and patch expressions
//! - [`Delta`] - Structural difference between two snapshots
//!
//! ## Translation
//!
//! Caller JSON enters through the [`translate`] module, which revives dates
//! and regex sentinels, expands identifier matches, and escapes dotted keys.

pub mod diff;
pub mod error;
pub mod query;
pub mod translate;
pub mod value;

pub use diff::{diff, diff_documents, ArrayChange, ArrayDelta, Delta};
pub use error::{CoreError, QueryError};
pub use query::{sort_documents, Filter, Pattern, Predicate, Projection, SortKey, Update};
pub use translate::{
    decode_document, encode_document, encode_update, id_filter, id_filter_on, translate_document,
    translate_filter, translate_projection, translate_sort, translate_update, JsonInput, ID_FIELD,
};
pub use value::{document_from_json, document_to_json, Document, ObjectId, Value};
