//! Lease expiry for in-flight jobs.
//!
//! A claimant keeps its lease alive by rewriting the in-flight record, which
//! refreshes the file's modification time. Records left untouched for longer
//! than the lease timeout belong to a worker that died; the reaper returns
//! them to the queue or, once their attempts are used up, fails them.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{error, info, warn};
use vforge_models::{JobId, JobRecord};

use crate::error::{QueueError, QueueResult};
use crate::layout::{has_extension, record_path, IN_FLIGHT_EXT, QUEUED_EXT, REAPING_EXT};
use crate::queue::{base_name, FileQueue};
use crate::store::{read_json, remove_if_exists, touch, write_json_atomic};

/// Exit code recorded for a job failed by lease expiry.
pub const LEASE_EXPIRED_CODE: i32 = -2;

/// What a reaper pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub requeued: Vec<JobId>,
    pub failed: Vec<JobId>,
    /// Expired records that could not be parsed and were deleted
    pub discarded: Vec<PathBuf>,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty() && self.discarded.is_empty()
    }
}

/// Requeues or fails in-flight jobs whose lease expired.
#[derive(Debug, Clone)]
pub struct LeaseReaper {
    queue: FileQueue,
    lease_timeout: Duration,
    max_attempts: u32,
}

impl LeaseReaper {
    pub fn new(queue: FileQueue, lease_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            queue,
            lease_timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Reap every in-flight record last touched before `now - lease_timeout`.
    ///
    /// Reaping records left half-done by a reaper that died are picked up the
    /// same way. A record that fails to reap is logged and skipped; the rest
    /// of the pass goes on.
    pub async fn reap(&self, now: SystemTime) -> QueueResult<ReapReport> {
        let mut report = ReapReport::default();
        let Some(deadline) = now.checked_sub(self.lease_timeout) else {
            return Ok(report);
        };

        for session_id in self.queue.layout().session_ids().await? {
            let queue_dir = self.queue.layout().queue_dir(&session_id);
            let expired = match expired_records(&queue_dir, deadline).await {
                Ok(expired) => expired,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Skipping unreadable queue directory");
                    continue;
                }
            };

            for path in expired {
                if let Err(e) = self.reap_one(&session_id, &path, &mut report).await {
                    error!(session_id = %session_id, path = %path.display(), error = %e, "Failed to reap expired record");
                }
            }
        }

        if !report.is_empty() {
            info!(
                requeued = report.requeued.len(),
                failed = report.failed.len(),
                discarded = report.discarded.len(),
                "Lease reaper pass finished"
            );
        }
        Ok(report)
    }

    async fn reap_one(&self, session_id: &str, path: &Path, report: &mut ReapReport) -> QueueResult<()> {
        let in_flight = path.with_extension(IN_FLIGHT_EXT);
        let reaping = path.with_extension(REAPING_EXT);

        // An old reaping record lost its reaper. Moving it back lets the
        // rename below decide who takes it over.
        if has_extension(path, REAPING_EXT) && !take(path, &in_flight).await? {
            return Ok(());
        }
        // Same exclusion as a claim: only one reaper wins the rename.
        if !take(&in_flight, &reaping).await? {
            return Ok(());
        }
        touch(&reaping).await?;

        let base = base_name(&reaping);
        let mut record = match read_json::<JobRecord>(&reaping).await {
            Ok(record) => record,
            Err(QueueError::Json(e)) => {
                error!(path = %reaping.display(), error = %e, "Discarding unparseable expired record");
                remove_if_exists(&reaping).await?;
                report.discarded.push(in_flight);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        record.ensure_job_id(&base);

        if record.attempts + 1 >= self.max_attempts {
            self.expire(session_id, &base, record, report).await?;
            remove_if_exists(&reaping).await?;
        } else {
            self.requeue(session_id, &base, &reaping, record, report).await?;
        }
        Ok(())
    }

    /// Rewrite the held record as queued, then move it back in one rename.
    async fn requeue(
        &self,
        session_id: &str,
        base: &str,
        reaping: &Path,
        mut record: JobRecord,
        report: &mut ReapReport,
    ) -> QueueResult<()> {
        record.requeue();
        write_json_atomic(reaping, &record).await?;
        let path = record_path(&self.queue.layout().queue_dir(session_id), base, QUEUED_EXT);
        tokio::fs::rename(reaping, &path).await?;

        warn!(
            job_id = %record.job_id,
            session_id,
            attempts = record.attempts,
            "Lease expired, job requeued"
        );
        report.requeued.push(record.job_id);
        Ok(())
    }

    async fn expire(
        &self,
        session_id: &str,
        base: &str,
        record: JobRecord,
        report: &mut ReapReport,
    ) -> QueueResult<()> {
        let mut logs = record.logs.clone().unwrap_or_default();
        logs.push(format!(
            "lease expired: no heartbeat for {}s after {} attempt(s)",
            self.lease_timeout.as_secs(),
            record.attempts + 1
        ));
        let failed = record.finish(false, LEASE_EXPIRED_CODE, logs, Utc::now());
        self.queue.write_terminal(session_id, base, &failed).await?;

        warn!(
            job_id = %failed.job_id,
            session_id,
            attempts = failed.attempts,
            "Lease expired, job failed"
        );
        report.failed.push(failed.job_id);
        Ok(())
    }
}

/// In-flight and reaping records in `queue_dir` last modified before `deadline`.
async fn expired_records(queue_dir: &Path, deadline: SystemTime) -> std::io::Result<Vec<PathBuf>> {
    let mut dir = match tokio::fs::read_dir(queue_dir).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut expired = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if !has_extension(&path, IN_FLIGHT_EXT) && !has_extension(&path, REAPING_EXT) {
            continue;
        }
        let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
            continue;
        };
        if modified <= deadline {
            expired.push(path);
        }
    }
    Ok(expired)
}

/// Rename `from` to `to`; `false` when `from` is already gone.
async fn take(from: &Path, to: &Path) -> QueueResult<bool> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
