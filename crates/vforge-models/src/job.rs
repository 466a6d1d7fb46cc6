//! Job records as persisted in a session's queue directories.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ValidationError, ValidationResult};
use crate::operation::OperationRequest;

/// Unique identifier for a job within a session's queue namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new short job ID (`job-` followed by 8 hex characters).
    pub fn new() -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self(format!("job-{}", &uuid[..8]))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Placeholder for a record read without an id.
    pub fn unassigned() -> Self {
        Self(String::new())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle status.
///
/// A status string this crate does not know reads as `Queued`; the worker
/// overwrites it on claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
    #[default]
    #[serde(other)]
    Queued,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One persisted unit of work.
///
/// Fields this crate does not know about are kept in `extra` so that every
/// rewrite of the record carries the collaborator's original fields forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Collaborators may omit this; the queue fills it from the file name
    #[serde(default = "JobId::unassigned")]
    pub job_id: JobId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Operation kind as written by the collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    /// Operation-specific parameters, validated lazily via [`JobRecord::request`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,

    #[serde(default)]
    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Last liveness signal from the claimant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<DateTime<Utc>>,

    /// Materialized executable arguments; immutable once set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Working directory for the executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Advisory completion estimate (0-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    /// Exit code once terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,

    /// Captured executable output lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,

    /// Number of times this job was requeued after a lease expired
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,

    /// Identifies the claim currently holding the in-flight record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_token: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl JobRecord {
    /// Create a queued record for a validated request.
    pub fn queued(
        session_id: impl Into<String>,
        request: OperationRequest,
        output_filename: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let (operation, params) = request.into_parts();
        Self {
            job_id: JobId::new(),
            session_id: Some(session_id.into()),
            operation: Some(operation),
            params: Some(params),
            output_filename: Some(output_filename.into()),
            status: JobStatus::Queued,
            created_at: Some(now),
            started_at: None,
            finished_at: None,
            heartbeat_at: None,
            args: None,
            cwd: None,
            progress: None,
            code: None,
            logs: None,
            attempts: 0,
            claim_token: None,
            extra: Map::new(),
        }
    }

    /// Parse the record's `operation` / `params` pair into a typed request.
    pub fn request(&self) -> ValidationResult<OperationRequest> {
        let operation = self
            .operation
            .as_deref()
            .ok_or(ValidationError::MissingOperation)?;
        OperationRequest::from_parts(operation, self.params.as_ref())
    }

    /// Use `fallback` as the id when the record was written without one.
    pub fn ensure_job_id(&mut self, fallback: &str) {
        if self.job_id.is_empty() {
            self.job_id = JobId::from_string(fallback);
        }
    }

    /// Mark the record as claimed and running.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        self.heartbeat_at = Some(now);
    }

    /// Update progress, clamped to 100.
    pub fn set_progress(&mut self, progress: u8) {
        self.status = JobStatus::Processing;
        self.progress = Some(progress.min(100));
    }

    /// Record a liveness signal.
    pub fn record_heartbeat(&mut self, now: DateTime<Utc>) {
        self.heartbeat_at = Some(now);
    }

    /// Build the terminal record for a finished run.
    pub fn finish(
        mut self,
        success: bool,
        code: i32,
        logs: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        self.status = if success {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        if success {
            self.progress = Some(100);
        }
        self.code = Some(code);
        self.logs = Some(logs);
        self.finished_at = Some(now);
        self
    }

    /// Return the record to the queue after its lease expired.
    pub fn requeue(&mut self) {
        self.status = JobStatus::Queued;
        self.progress = None;
        self.started_at = None;
        self.heartbeat_at = None;
        self.claim_token = None;
        self.attempts += 1;
    }

    /// Copy of the record without the potentially large `logs` field.
    pub fn without_logs(&self) -> Self {
        Self {
            logs: None,
            ..self.clone()
        }
    }
}
