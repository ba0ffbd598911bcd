//! Error types for the store module.

use thiserror::Error;
use warden_core::QueryError;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Document body serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A document with this identifier already exists.
    #[error("duplicate key in {collection}: {id}")]
    DuplicateKey { collection: String, id: String },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A patch could not be applied to a stored document.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Malformed acknowledgment or journal settings.
    #[error("invalid write concern: {0}")]
    InvalidWriteConcern(String),

    /// The store reported a write as unacknowledged.
    #[error("{operation} was not acknowledged")]
    Unacknowledged { operation: String },

    /// A single-document write matched several documents.
    #[error("expected at most one match, found {0}")]
    UnexpectedMatchCount(u64),

    /// A collection refused the operation.
    #[error("collection unavailable: {0}")]
    Unavailable(String),

    /// A lock guarding the store was poisoned.
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    /// A blocking task failed to complete.
    #[error("blocking task failed: {0}")]
    Task(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
