//! Error types for logd-core

use thiserror::Error;

/// Errors produced by the core types
#[derive(Debug, Error)]
pub enum CoreError {
    /// The system random source failed while minting an ID
    #[error("Entropy source failed: {0}")]
    Entropy(String),

    /// A textual event ID could not be decoded
    #[error("Invalid event ID: {0}")]
    InvalidId(String),

    /// A serialized cursor could not be decoded
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// A log name is empty or contains a NUL byte
    #[error("Invalid log name: {0:?}")]
    InvalidLogName(String),
}

impl CoreError {
    /// Create a new InvalidId error
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId(message.into())
    }

    /// Create a new InvalidCursor error
    pub fn invalid_cursor(message: impl Into<String>) -> Self {
        Self::InvalidCursor(message.into())
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
