//! Common error types for StrataVault.

use thiserror::Error;

/// Top-level error type for StrataVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Item, parent, or share link does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Ownership or share-level check failed.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed name, self-move, or otherwise invalid request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation requires a state the item is not in (e.g. purge on a live item).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Storage quota or similar limit exceeded.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Storage backend responded with an error status.
    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// Network-level failure reaching a backend.
    #[error("Network error: {0}")]
    Network(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unexpected backend or database failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry can reasonably be expected to succeed.
    ///
    /// Network failures, I/O failures, and 5xx backend responses are
    /// transient. In the 4xx range only request-timeout (408) and
    /// too-many-requests (429) qualify; every other client error is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) | Error::Io(_) => true,
            Error::Backend { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
