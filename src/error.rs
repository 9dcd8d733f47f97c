//! Status taxonomy returned across the protocol surface.
//!
//! Backend-raised conditions are translated into these kinds at the router
//! boundary; raw backend errors never cross it.

use thiserror::Error;

/// Result alias used across the protocol surface.
pub type VfsResult<T> = Result<T, VfsError>;

#[derive(Debug, Error)]
pub enum VfsError {
    /// Authorization failure or backend refusal.
    #[error("access denied")]
    AccessDenied,

    /// The path (file or directory) does not exist.
    #[error("not found")]
    NotFound,

    /// A parent component of the path does not exist.
    #[error("path not found")]
    PathNotFound,

    #[error("already exists")]
    AlreadyExists,

    /// File-vs-directory mismatch.
    #[error("wrong entry type")]
    WrongType,

    /// Directory delete precondition failed.
    #[error("directory not empty")]
    NotEmpty,

    /// Storage reported no space during write/flush/set-length.
    #[error("disk full")]
    DiskFull,

    /// Storage-layer failure; dirty state is kept and retryable.
    #[error("i/o failure: {0}")]
    IoFailure(String),

    /// Malformed request, e.g. an oversized buffer.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Operation is deliberately not supported (security descriptors,
    /// alternate streams).
    #[error("unsupported operation")]
    Unsupported,

    /// Unexpected, unclassified failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VfsError {
    /// Whether the error denotes a missing path of either flavor.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound | VfsError::PathNotFound)
    }
}
