//! Error types for the boardsync replication core

use thiserror::Error;

/// Main error type for boardsync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Board was not found in storage
    #[error("Board not found: {0}")]
    BoardNotFound(String),

    /// Thread was not found in storage
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    /// A row with the same primary key already exists
    ///
    /// Kept distinct from [`SyncError::Storage`] so callers can treat an
    /// idempotent re-insert differently from a real storage failure.
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Error during storage operations
    #[error("Storage error: {0}")]
    Storage(String),

    /// Signature verification failed
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    /// Network-related error (peer unreachable, send failed)
    #[error("Network error: {0}")]
    Network(String),
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;
