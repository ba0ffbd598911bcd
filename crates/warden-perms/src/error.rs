//! Error types for the permissions module.

use thiserror::Error;

/// Errors that can occur during permission operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The token did not resolve to an identity.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// An ACL or ACE could not be read.
    #[error("invalid acl: {0}")]
    InvalidAcl(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption error.
    #[error("decryption error: {0}")]
    DecryptionError(String),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
