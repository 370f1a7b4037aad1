//! Errors reported by the entry lifecycle service

use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced to callers of [`crate::LogbookService`]
///
/// Telemetry problems never appear here; they are logged and the operation
/// carries on without the data.
#[derive(Error, Debug)]
pub enum LogbookError {
    /// The submission was rejected before anything was written
    #[error("{0}")]
    Validation(String),

    /// No entry with this id
    #[error("Entry {0} not found")]
    NotFound(i64),

    /// The entry existed but its row could not be removed
    #[error("Entry {0} could not be deleted")]
    DeleteFailed(i64),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration could not be read
    #[error("Configuration error: {0:#}")]
    Config(#[from] anyhow::Error),
}

impl LogbookError {
    pub fn validation(message: impl Into<String>) -> Self {
        LogbookError::Validation(message.into())
    }
}

/// Result type for lifecycle operations
pub type LogbookResult<T> = Result<T, LogbookError>;
