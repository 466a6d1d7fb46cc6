//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job: {0}")]
    Validation(#[from] vforge_models::ValidationError),

    #[error("Media error: {0}")]
    Media(#[from] vforge_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vforge_queue::QueueError),
}

impl WorkerError {
    /// Whether the error is caused by the job's own record or parameters.
    ///
    /// Such errors fail the job without running anything.
    pub fn is_job_input(&self) -> bool {
        match self {
            WorkerError::Validation(_) => true,
            WorkerError::Media(e) => e.is_validation(),
            _ => false,
        }
    }
}
