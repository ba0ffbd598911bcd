//! Error types for Warden core.

use thiserror::Error;

/// Errors raised while translating caller filters and patches.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a document, got {0}")]
    NotADocument(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("invalid operand for {op}: {reason}")]
    InvalidOperand { op: String, reason: String },

    #[error("invalid regex /{pattern}/: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("invalid update: {0}")]
    InvalidUpdate(String),
}

/// Errors raised by pure document computations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("delta does not apply: {0}")]
    DeltaMismatch(String),

    #[error("malformed delta: {0}")]
    MalformedDelta(String),

    #[error("query error: {0}")]
    Query(#[from] QueryError),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
