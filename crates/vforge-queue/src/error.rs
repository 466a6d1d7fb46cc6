//! Queue error types.

use std::path::PathBuf;

use thiserror::Error;
use vforge_models::ValidationError;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid session id: {0}")]
    InvalidSession(String),

    #[error("Corrupt job record at {path}: {message}")]
    CorruptRecord { path: PathBuf, message: String },

    #[error("In-flight record is gone or held by another claim: {0}")]
    LeaseLost(PathBuf),

    #[error("Invalid job: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn corrupt(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::CorruptRecord {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn is_lease_lost(&self) -> bool {
        matches!(self, QueueError::LeaseLost(_))
    }

    /// The claimed record could not be parsed and has been discarded.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, QueueError::CorruptRecord { .. })
    }
}
