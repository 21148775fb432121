//! Error types for logd-storage
//!
//! This module defines the error types used throughout the storage crate.

use logd_core::CoreError;
use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error while preparing the database location
    #[error("I/O error: {0}")]
    Io(String),

    /// The embedded database reported a failure
    #[error("Database error: {0}")]
    Database(String),

    /// A stored value was written by an unknown format version
    #[error("unsupported event version: {0}")]
    UnsupportedVersion(u8),

    /// A stored key does not have the `name ∥ 0x00 ∥ id` layout
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// A stored value is too short or otherwise undecodable
    #[error("Malformed value: {0}")]
    MalformedValue(String),

    /// A timestamp cannot be represented as unsigned nanoseconds since the epoch
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The store has been closed
    #[error("Store is closed")]
    Closed,

    /// Identifier or log name failure
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StorageError {
    /// Create a new MalformedKey error
    pub fn malformed_key(message: impl Into<String>) -> Self {
        Self::MalformedKey(message.into())
    }

    /// Create a new MalformedValue error
    pub fn malformed_value(message: impl Into<String>) -> Self {
        Self::MalformedValue(message.into())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

macro_rules! database_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StorageError {
                fn from(err: $ty) -> Self {
                    StorageError::Database(err.to_string())
                }
            }
        )*
    };
}

database_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
