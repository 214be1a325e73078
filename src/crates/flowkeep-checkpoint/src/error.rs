//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint not found
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Append rejected because it does not extend the thread's log by exactly one step
    #[error("Checkpoint conflict on thread '{thread_id}': expected step {expected}, got {actual}")]
    Conflict {
        thread_id: String,
        expected: u64,
        actual: u64,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid checkpoint
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    /// Whether this error is a rejected concurrent or out-of-order append
    pub fn is_conflict(&self) -> bool {
        matches!(self, CheckpointError::Conflict { .. })
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for CheckpointError {
    fn from(err: sqlx::Error) -> Self {
        CheckpointError::Storage(err.to_string())
    }
}
