//! Error types for the collector

use logd_core::CoreError;
use logd_storage::StorageError;
use thiserror::Error;

/// Errors returned by [`crate::Agent::send`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// The inbox is at capacity; the action was not queued
    #[error("agent inbox full")]
    InboxFull,

    /// The agent has shut down; the action never ran
    #[error("agent cancelled")]
    Cancelled,
}

/// Errors that can occur in collector operations
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Log name is empty or contains a NUL byte
    #[error("invalid log name: {0:?}")]
    InvalidLogName(String),

    /// No source path was given for a log
    #[error("log source path is required for {0:?}")]
    MissingSource(String),

    /// A log with this name is already registered
    #[error("already have log {0:?}")]
    DuplicateLog(String),

    /// Requested page size is out of range
    #[error("limit {limit} is out of range 1..={max}")]
    InvalidLimit { limit: usize, max: usize },

    /// An event timestamp falls outside the storable range (1970 to 2262)
    #[error("timestamp {0} cannot be stored")]
    InvalidTimestamp(String),

    /// A cursor string could not be decoded
    #[error("parsing cursor: {0}")]
    InvalidCursor(String),

    /// Reading a source or writing the state file failed
    #[error("IO error: {0}")]
    Io(String),

    /// A stream worker stopped with an error
    #[error("worker {log:?}: {message}")]
    Worker { log: String, message: String },

    /// The collector state file could not be encoded or decoded
    #[error("state file: {0}")]
    State(String),

    /// Operation called before `start` or after `stop`
    #[error("collector not started")]
    NotStarted,

    /// `start` called twice
    #[error("collector already started")]
    AlreadyStarted,

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The single-writer agent rejected the operation
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl CollectorError {
    /// Create a new Io error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new Worker error
    pub fn worker(log: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Worker {
            log: log.into(),
            message: message.to_string(),
        }
    }

    /// True for errors caused by caller input rather than system failure
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidLogName(_)
                | Self::MissingSource(_)
                | Self::DuplicateLog(_)
                | Self::InvalidLimit { .. }
                | Self::InvalidCursor(_)
                | Self::InvalidTimestamp(_)
        )
    }
}

impl From<CoreError> for CollectorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidLogName(name) => Self::InvalidLogName(name),
            CoreError::InvalidCursor(msg) | CoreError::InvalidId(msg) => Self::InvalidCursor(msg),
            CoreError::Entropy(msg) => Self::Io(msg),
        }
    }
}

impl From<std::io::Error> for CollectorError {
    fn from(err: std::io::Error) -> Self {
        CollectorError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CollectorError {
    fn from(err: serde_json::Error) -> Self {
        CollectorError::State(err.to_string())
    }
}

/// Result type alias for collector operations
pub type CollectorResult<T> = Result<T, CollectorError>;
