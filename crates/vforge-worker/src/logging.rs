//! Structured job logging utilities.
//!
//! Every lifecycle event of a job carries the same `job_id`, `session_id`
//! and `operation` fields so one job can be followed through the logs.

use tracing::{error, info, warn, Span};
use vforge_models::{JobId, JobRecord};

/// Operation label for records that only carry prebuilt arguments.
pub const PREBUILT_OPERATION: &str = "prebuilt";

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    session_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    pub fn new(job_id: &JobId, session_id: &str, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            session_id: session_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Create a logger from a loaded record.
    pub fn for_record(record: &JobRecord, session_id: &str) -> Self {
        Self::new(
            &record.job_id,
            session_id,
            record.operation.as_deref().unwrap_or(PREBUILT_OPERATION),
        )
    }

    /// Log the start of a job.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log a progress update during job execution.
    pub fn log_progress(&self, progress: u8) {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation,
            progress,
            "Job progress: {}%", progress
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    /// Log an error during job execution.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    /// Log the completion of a job.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = %self.operation
        )
    }
}
