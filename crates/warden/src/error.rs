//! Error types for the mutation pipeline.

use thiserror::Error;
use warden_core::QueryError;
use warden_perms::PermsError;
use warden_store::StoreError;

/// Errors returned by [`Gateway`](crate::Gateway) operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The lookup, update or delete predicate matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// An authorization rule or the access filter excluded the caller.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Null item or id, ambiguous upsert match, malformed filter or write concern.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying store failed or did not acknowledge a write.
    #[error("operation failed: {0}")]
    OperationFailed(#[source] StoreError),
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidWriteConcern(_) | StoreError::Query(_) => {
                GatewayError::InvalidArgument(e.to_string())
            }
            other => GatewayError::OperationFailed(other),
        }
    }
}

impl From<QueryError> for GatewayError {
    fn from(e: QueryError) -> Self {
        GatewayError::InvalidArgument(e.to_string())
    }
}

impl From<PermsError> for GatewayError {
    fn from(e: PermsError) -> Self {
        match e {
            PermsError::PermissionDenied(_) | PermsError::Unauthenticated(_) => {
                GatewayError::AccessDenied(e.to_string())
            }
            PermsError::InvalidAcl(_)
            | PermsError::EncryptionError(_)
            | PermsError::DecryptionError(_) => GatewayError::InvalidArgument(e.to_string()),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
