//! # Warden Store
//!
//! Storage abstraction for Warden documents.
//!
//! The store knows nothing about permissions or encryption. It persists
//! documents per collection, evaluates translated filters and patches, and
//! passes write concerns through. Two implementations are provided:
//!
//! - [`SqliteStore`]: durable, bundled SQLite
//! - [`MemoryStore`]: in process, for tests and embedding

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::{SqliteConnector, SqliteStore};
pub use traits::{
    apply_find_options, Acknowledgment, DeleteOutcome, DocumentStore, FindOptions, InsertOutcome,
    LazyStore, StoreConnector, StoreExt, UpdateOutcome, WriteConcern,
};
