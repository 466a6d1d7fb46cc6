//! File-backed job queue.
//!
//! Each pending job is a `<job>.json` file in its session's `queue/`
//! directory. A worker claims a job by renaming it to `<job>.processing`;
//! the rename is atomic, so exactly one of any number of concurrent claimants
//! wins. The claimant then stamps a token into the in-flight record and every
//! later write checks it, so a claim that was reaped and handed to another
//! worker cannot keep writing. Finished records are written to `completed/`
//! or `failed/`.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vforge_models::{JobRecord, OperationRequest};

use crate::error::{QueueError, QueueResult};
use crate::layout::{
    has_extension, is_plain_name, record_path, StorageLayout, IN_FLIGHT_EXT,
    QUEUED_EXT, REAPING_EXT,
};
use crate::store::{read_json, remove_if_exists, touch, write_json_atomic};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Directory containing `sessions/`
    pub storage_root: PathBuf,
    /// In-flight records untouched for this long are reaped
    pub lease_timeout: Duration,
    /// Runs allowed per job before an expired lease fails it
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./storage"),
            lease_timeout: Duration::from_secs(900), // 15 minutes
            max_attempts: 2,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            storage_root: std::env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./storage")),
            lease_timeout: Duration::from_secs(
                std::env::var("WORKER_LEASE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(900),
            ),
            max_attempts: std::env::var("WORKER_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(2),
        }
    }
}

/// A pending record found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub session_id: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl QueueEntry {
    /// File name without extension; normally the job id.
    pub fn base_name(&self) -> String {
        base_name(&self.path)
    }
}

/// A record this worker owns after a successful claim.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub session_id: String,
    pub base_name: String,
    pub in_flight: PathBuf,
    /// Written into the record by [`FileQueue::load`]
    pub token: String,
}

/// The part of an in-flight record needed to check ownership.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimOwner {
    #[serde(default)]
    claim_token: Option<String>,
}

/// Where a looked-up record currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobLocation {
    Completed,
    Failed,
    InFlight,
    Queued,
}

/// Result of a status lookup.
#[derive(Debug, Clone)]
pub struct JobLookup {
    pub session_id: String,
    pub location: JobLocation,
    pub record: JobRecord,
}

/// File-backed queue over a [`StorageLayout`].
#[derive(Debug, Clone)]
pub struct FileQueue {
    layout: StorageLayout,
}

impl FileQueue {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Create from a storage root.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(StorageLayout::new(root))
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Working directory for a session's executable runs.
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.layout.session_dir(session_id)
    }

    /// All pending records across sessions, oldest modification first.
    pub async fn discover(&self) -> QueueResult<Vec<QueueEntry>> {
        let mut entries = Vec::new();

        for session_id in self.layout.session_ids().await? {
            let queue_dir = self.layout.queue_dir(&session_id);
            let mut dir = match tokio::fs::read_dir(&queue_dir).await {
                Ok(dir) => dir,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = dir.next_entry().await? {
                let path = entry.path();
                if !has_extension(&path, QUEUED_EXT) {
                    continue;
                }
                // Claimed by someone else between listing and stat.
                let Ok(metadata) = entry.metadata().await else {
                    continue;
                };
                if !metadata.is_file() {
                    continue;
                }
                entries.push(QueueEntry {
                    session_id: session_id.clone(),
                    path,
                    modified: metadata.modified()?,
                });
            }
        }

        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(entries)
    }

    /// Take exclusive ownership of `entry` by renaming it in-flight.
    ///
    /// Returns `Ok(None)` when another worker got there first.
    pub async fn claim(&self, entry: &QueueEntry) -> QueueResult<Option<ClaimedJob>> {
        let base_name = entry.base_name();
        let in_flight = entry.path.with_extension(IN_FLIGHT_EXT);

        match tokio::fs::rename(&entry.path, &in_flight).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(session_id = %entry.session_id, job = %base_name, "Lost claim race");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        // The rename keeps the queued file's mtime, which would make a job
        // that sat in the backlog look like an expired lease.
        match touch(&in_flight).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(session_id = %entry.session_id, job = %base_name, "Claim reaped before lease refresh");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        debug!(session_id = %entry.session_id, job = %base_name, "Claimed job");
        Ok(Some(ClaimedJob {
            session_id: entry.session_id.clone(),
            base_name,
            in_flight,
            token: Uuid::new_v4().simple().to_string(),
        }))
    }

    /// Parse a claimed record and stamp it with the claim's token.
    ///
    /// A record without a `jobId` takes the file's base name. A record that
    /// cannot be parsed is deleted and reported as
    /// [`QueueError::CorruptRecord`]; no terminal record is written for it.
    pub async fn load(&self, claimed: &ClaimedJob) -> QueueResult<JobRecord> {
        let mut record = match read_json::<JobRecord>(&claimed.in_flight).await {
            Ok(record) => record,
            Err(QueueError::Json(e)) => {
                error!(
                    session_id = %claimed.session_id,
                    path = %claimed.in_flight.display(),
                    error = %e,
                    "Discarding unparseable job record"
                );
                if let Err(rm) = remove_if_exists(&claimed.in_flight).await {
                    warn!(path = %claimed.in_flight.display(), error = %rm, "Failed to delete corrupt record");
                }
                return Err(QueueError::corrupt(&claimed.in_flight, e));
            }
            Err(e) => return Err(e),
        };

        record.ensure_job_id(&claimed.base_name);
        record.claim_token = Some(claimed.token.clone());
        write_json_atomic(&claimed.in_flight, &record).await?;
        Ok(record)
    }

    /// Rewrite the in-flight record (progress, heartbeat).
    ///
    /// Fails with [`QueueError::LeaseLost`] once the record was finalized,
    /// reaped or claimed again by someone else.
    pub async fn write_in_flight(&self, claimed: &ClaimedJob, record: &JobRecord) -> QueueResult<()> {
        self.check_owner(claimed).await?;
        write_json_atomic(&claimed.in_flight, record).await
    }

    /// Persist the terminal record and drop the in-flight file.
    ///
    /// The record's status picks `completed/` or `failed/`. Nothing is
    /// written when the claim no longer owns the in-flight record. Failing to
    /// delete the in-flight file is logged and otherwise ignored.
    pub async fn finalize(&self, claimed: &ClaimedJob, record: &JobRecord) -> QueueResult<PathBuf> {
        self.check_owner(claimed).await?;
        let path = self
            .write_terminal(&claimed.session_id, &claimed.base_name, record)
            .await?;

        if let Err(e) = remove_if_exists(&claimed.in_flight).await {
            warn!(
                path = %claimed.in_flight.display(),
                error = %e,
                "Failed to remove in-flight record after finalize"
            );
        }

        info!(
            job_id = %record.job_id,
            session_id = %claimed.session_id,
            status = %record.status,
            path = %path.display(),
            "Job finalized"
        );
        Ok(path)
    }

    async fn check_owner(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        let lost = || QueueError::LeaseLost(claimed.in_flight.clone());
        let owner = match read_json::<ClaimOwner>(&claimed.in_flight).await {
            Ok(owner) => owner,
            Err(QueueError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Err(lost()),
            Err(e) => return Err(e),
        };
        if owner.claim_token.as_deref() != Some(claimed.token.as_str()) {
            return Err(lost());
        }
        Ok(())
    }

    pub(crate) async fn write_terminal(
        &self,
        session_id: &str,
        base_name: &str,
        record: &JobRecord,
    ) -> QueueResult<PathBuf> {
        let dir = self.layout.terminal_dir(session_id, record.status);
        tokio::fs::create_dir_all(&dir).await?;
        let path = record_path(&dir, base_name, QUEUED_EXT);
        write_json_atomic(&path, record).await?;
        Ok(path)
    }

    /// Locate a job by id.
    ///
    /// Per session the record is looked for in completed, failed, in-flight
    /// and queued order. With `include_logs == false` the `logs` field is
    /// stripped.
    pub async fn find_job(&self, job_id: &str, include_logs: bool) -> QueueResult<Option<JobLookup>> {
        if !is_plain_name(job_id) {
            return Ok(None);
        }

        for session_id in self.layout.session_ids().await? {
            let queue_dir = self.layout.queue_dir(&session_id);
            let candidates = [
                (JobLocation::Completed, record_path(&self.layout.completed_dir(&session_id), job_id, QUEUED_EXT)),
                (JobLocation::Failed, record_path(&self.layout.failed_dir(&session_id), job_id, QUEUED_EXT)),
                (JobLocation::InFlight, record_path(&queue_dir, job_id, IN_FLIGHT_EXT)),
                (JobLocation::InFlight, record_path(&queue_dir, job_id, REAPING_EXT)),
                (JobLocation::Queued, record_path(&queue_dir, job_id, QUEUED_EXT)),
            ];

            for (location, path) in candidates {
                let mut record = match read_json::<JobRecord>(&path).await {
                    Ok(record) => record,
                    Err(QueueError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable job record");
                        continue;
                    }
                };
                record.ensure_job_id(job_id);
                let record = if include_logs { record } else { record.without_logs() };
                return Ok(Some(JobLookup {
                    session_id,
                    location,
                    record,
                }));
            }
        }

        Ok(None)
    }

    /// Write a new queued record for `request` into a session's queue.
    pub async fn enqueue(
        &self,
        session_id: &str,
        request: OperationRequest,
        output_filename: &str,
    ) -> QueueResult<JobRecord> {
        request.validate()?;
        let session_dir = self.layout.ensure_session(session_id).await?;

        let record = JobRecord::queued(session_id, request, output_filename, Utc::now());
        let path = record_path(&self.layout.queue_dir(session_id), record.job_id.as_str(), QUEUED_EXT);
        write_json_atomic(&path, &record).await?;

        info!(
            job_id = %record.job_id,
            session_id,
            operation = record.operation.as_deref().unwrap_or_default(),
            session_dir = %session_dir.display(),
            "Enqueued job"
        );
        Ok(record)
    }
}

pub(crate) fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
