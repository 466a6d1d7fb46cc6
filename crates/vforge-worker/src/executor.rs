//! Job executor.
//!
//! Each tick claims at most one job and drives it to a terminal record:
//! claim, resolve arguments, run the executable, finalize.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, Instrument};

use vforge_media::{
    build_command, check_ffmpeg, check_ffprobe, probe_video, Artifact, BuildContext,
    FfmpegRunner, ProgressMonitor, VideoInfo, SIGNAL_EXIT_CODE, SPAWN_FAILURE_CODE,
};
use vforge_models::{JobId, JobRecord, OperationRequest, ValidationError};
use vforge_queue::layout::{is_plain_name, OUTPUT_DIR};
use vforge_queue::{ClaimedJob, FileQueue, LeaseReaper, QueueError};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::scheduler::TickTask;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No claimable job
    Idle,
    Completed(JobId),
    Failed(JobId),
    /// The claimed record could not be parsed and was deleted
    Discarded(PathBuf),
    /// The job was reaped and handed to another claim before it finished
    LeaseLost(JobId),
}

/// Arguments and side files for one run.
#[derive(Debug)]
struct PreparedRun {
    args: Vec<String>,
    artifacts: Vec<Artifact>,
    target_secs: Option<f64>,
}

/// Job executor that processes jobs from the file queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: FileQueue,
    reaper: LeaseReaper,
    runner: FfmpegRunner,
    last_reap: Option<Instant>,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig) -> Self {
        let queue = FileQueue::open(config.queue.storage_root.clone());
        let reaper = LeaseReaper::new(
            queue.clone(),
            config.queue.lease_timeout,
            config.queue.max_attempts,
        );
        let runner = FfmpegRunner::new(config.ffmpeg_bin.clone());

        Self {
            config,
            queue,
            reaper,
            runner,
            last_reap: None,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn queue(&self) -> &FileQueue {
        &self.queue
    }

    /// Log whether the media executables can be located.
    ///
    /// A missing executable does not stop the worker; jobs then fail with a
    /// spawn error until it is installed.
    pub fn check_executables(&self) -> bool {
        let ffmpeg = match check_ffmpeg(&self.config.ffmpeg_bin) {
            Ok(path) => {
                info!(path = %path.display(), "Found ffmpeg");
                true
            }
            Err(e) => {
                error!(error = %e, "ffmpeg is not available, jobs will fail until it is installed");
                false
            }
        };
        let ffprobe = match check_ffprobe(&self.config.ffprobe_bin) {
            Ok(path) => {
                info!(path = %path.display(), "Found ffprobe");
                true
            }
            Err(e) => {
                error!(error = %e, "ffprobe is not available, progress and overlay sizing are degraded");
                false
            }
        };
        ffmpeg && ffprobe
    }

    /// Run one scheduler tick.
    ///
    /// Errors are queue-level I/O failures; anything caused by the job itself
    /// ends up in its terminal record instead.
    pub async fn tick(&mut self) -> WorkerResult<TickOutcome> {
        self.reap_if_due().await;

        let Some(claimed) = self.claim_next().await? else {
            return Ok(TickOutcome::Idle);
        };

        let record = match self.queue.load(&claimed).await {
            Ok(record) => record,
            Err(e) if e.is_corrupt() => {
                metrics::record_discarded();
                return Ok(TickOutcome::Discarded(claimed.in_flight));
            }
            Err(e) => return Err(e.into()),
        };

        let logger = JobLogger::for_record(&record, &claimed.session_id);
        let span = logger.create_span();
        self.execute(claimed, record, logger).instrument(span).await
    }

    async fn reap_if_due(&mut self) {
        if self
            .last_reap
            .is_some_and(|at| at.elapsed() < self.config.reap_interval)
        {
            return;
        }
        self.last_reap = Some(Instant::now());

        match self.reaper.reap(SystemTime::now()).await {
            Ok(report) => metrics::record_reap(&report),
            Err(e) => error!(error = %e, "Lease reaper pass failed"),
        }
    }

    /// Claim the oldest job another worker has not taken yet.
    async fn claim_next(&self) -> WorkerResult<Option<ClaimedJob>> {
        for entry in self.queue.discover().await? {
            if let Some(claimed) = self.queue.claim(&entry).await? {
                return Ok(Some(claimed));
            }
        }
        Ok(None)
    }

    async fn execute(
        &self,
        claimed: ClaimedJob,
        mut record: JobRecord,
        logger: JobLogger,
    ) -> WorkerResult<TickOutcome> {
        let operation = logger.operation().to_string();
        metrics::record_job_claimed(&operation);

        record.start(Utc::now());
        logger.log_start(&format!("attempt {}", record.attempts + 1));

        let session_dir = self.queue.session_dir(&claimed.session_id);
        let cwd = record
            .cwd
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| session_dir.clone());

        let prepared = match self.prepare(&record, &session_dir).await {
            Ok(prepared) => prepared,
            Err(e) => {
                if e.is_job_input() {
                    logger.log_warning(&e.to_string());
                } else {
                    logger.log_error(&e.to_string());
                }
                return self
                    .fail_without_run(&claimed, record, &logger, &operation, "invalid", e.to_string())
                    .await;
            }
        };

        let artifacts = match write_artifacts(&cwd, &prepared.artifacts).await {
            Ok(paths) => paths,
            Err(e) => {
                let message = format!("failed to write job artifact: {e}");
                logger.log_error(&message);
                return self
                    .fail_without_run(&claimed, record, &logger, &operation, "artifact", message)
                    .await;
            }
        };

        record.args = Some(prepared.args.clone());
        if record.cwd.is_none() {
            record.cwd = Some(cwd.display().to_string());
        }
        if let Err(e) = self.queue.write_in_flight(&claimed, &record).await {
            remove_artifacts(&artifacts).await;
            if e.is_lease_lost() {
                logger.log_warning("lease lost before the run started");
                return Ok(TickOutcome::LeaseLost(record.job_id));
            }
            return Err(e.into());
        }

        let (monitor, progress_rx) = ProgressMonitor::channel(prepared.target_secs);
        let tracker = tokio::spawn(
            track_progress(
                self.queue.clone(),
                claimed.clone(),
                record.clone(),
                progress_rx,
                self.config.heartbeat_interval,
                logger.clone(),
            )
            .in_current_span(),
        );

        // The monitor's sender is dropped when the run returns, which ends the tracker.
        let outcome = self.runner.run(&prepared.args, &cwd, Some(monitor)).await;
        let record = match tracker.await {
            Ok(tracked) => tracked,
            Err(e) => {
                logger.log_warning(&format!("progress tracker stopped: {e}"));
                record
            }
        };

        remove_artifacts(&artifacts).await;
        metrics::record_ffmpeg_duration(&operation, outcome.elapsed.as_secs_f64());

        let success = outcome.success();
        let code = outcome.code;
        let record = record.finish(success, code, outcome.logs, Utc::now());
        if !self.finalize(&claimed, &record, &logger).await? {
            return Ok(TickOutcome::LeaseLost(record.job_id));
        }

        if success {
            logger.log_completion(&format!(
                "output {}",
                record.output_filename.as_deref().unwrap_or("-")
            ));
            metrics::record_job_completed(&operation);
            Ok(TickOutcome::Completed(record.job_id))
        } else {
            logger.log_error(&format!("exit code {code}"));
            let reason = match code {
                SPAWN_FAILURE_CODE => "spawn",
                SIGNAL_EXIT_CODE => "killed",
                _ => "exit",
            };
            metrics::record_job_failed(&operation, reason);
            Ok(TickOutcome::Failed(record.job_id))
        }
    }

    /// Resolve the argument list, side files and progress target of a job.
    async fn prepare(&self, record: &JobRecord, session_dir: &Path) -> WorkerResult<PreparedRun> {
        // Prebuilt arguments run unchanged; a recognizable operation only
        // feeds progress estimation.
        if let Some(args) = &record.args {
            let target_secs = match record.request() {
                Ok(request) => self.target_duration(&request, session_dir).await,
                Err(_) => None,
            };
            return Ok(PreparedRun {
                args: args.clone(),
                artifacts: Vec::new(),
                target_secs,
            });
        }

        let request = record.request()?;
        request.validate()?;
        let output_filename = record
            .output_filename
            .as_deref()
            .ok_or_else(|| ValidationError::invalid_value("outputFilename", "missing"))?;

        let probe = match request.declared_duration() {
            Some(_) => None,
            None => self.probe_source(&request, session_dir).await,
        };
        let ctx = BuildContext::with_source_resolution(probe.as_ref().and_then(VideoInfo::resolution));
        let plan = build_command(&request, output_filename, &ctx)?;

        Ok(PreparedRun {
            args: plan.args,
            artifacts: plan.artifacts,
            target_secs: request
                .declared_duration()
                .or_else(|| probe.map(|info| info.duration)),
        })
    }

    async fn target_duration(&self, request: &OperationRequest, session_dir: &Path) -> Option<f64> {
        match request.declared_duration() {
            Some(secs) => Some(secs),
            None => self
                .probe_source(request, session_dir)
                .await
                .map(|info| info.duration),
        }
    }

    async fn probe_source(&self, request: &OperationRequest, session_dir: &Path) -> Option<VideoInfo> {
        let video = request.source_video()?;
        if !is_plain_name(video) {
            return None;
        }
        let path = session_dir.join(OUTPUT_DIR).join(video);
        match probe_video(&self.config.ffprobe_bin, &path).await {
            Ok(info) => Some(info),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Source probe failed");
                None
            }
        }
    }

    async fn fail_without_run(
        &self,
        claimed: &ClaimedJob,
        record: JobRecord,
        logger: &JobLogger,
        operation: &str,
        reason: &str,
        message: String,
    ) -> WorkerResult<TickOutcome> {
        let record = record.finish(false, SPAWN_FAILURE_CODE, vec![message], Utc::now());
        if !self.finalize(claimed, &record, logger).await? {
            return Ok(TickOutcome::LeaseLost(record.job_id));
        }
        metrics::record_job_failed(operation, reason);
        Ok(TickOutcome::Failed(record.job_id))
    }

    /// Write the terminal record. `false` when another claim owns the job now.
    async fn finalize(&self, claimed: &ClaimedJob, record: &JobRecord, logger: &JobLogger) -> WorkerResult<bool> {
        match self.queue.finalize(claimed, record).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_lease_lost() => {
                logger.log_warning("lease lost, result dropped");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TickTask for JobExecutor {
    async fn run_tick(&mut self) {
        match self.tick().await {
            Ok(TickOutcome::Idle) => {}
            Ok(outcome) => debug!(?outcome, "Tick finished"),
            Err(e) => error!(error = %e, "Worker tick failed"),
        }
    }
}

/// Keep the in-flight record current while the executable runs.
///
/// Rewrites on every new progress value and at least once per `heartbeat`.
/// Returns the last record state once the progress channel closes.
async fn track_progress(
    queue: FileQueue,
    claimed: ClaimedJob,
    mut record: JobRecord,
    mut progress: mpsc::UnboundedReceiver<u8>,
    heartbeat: Duration,
    logger: JobLogger,
) -> JobRecord {
    let mut heartbeat =
        tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut lease_lost = false;

    loop {
        tokio::select! {
            value = progress.recv() => match value {
                Some(pct) if record.progress != Some(pct) => {
                    record.set_progress(pct);
                    logger.log_progress(pct);
                }
                Some(_) => continue,
                None => break,
            },
            _ = heartbeat.tick() => {}
        }

        if lease_lost {
            continue;
        }
        record.record_heartbeat(Utc::now());
        match queue.write_in_flight(&claimed, &record).await {
            Ok(()) => {}
            Err(QueueError::LeaseLost(path)) => {
                logger.log_warning(&format!("lost in-flight record {}", path.display()));
                lease_lost = true;
            }
            Err(e) => logger.log_warning(&format!("failed to update in-flight record: {e}")),
        }
    }

    record
}

async fn write_artifacts(cwd: &Path, artifacts: &[Artifact]) -> std::io::Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = cwd.join(&artifact.path);
        let result = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &artifact.bytes).await
        }
        .await;

        if let Err(e) = result {
            written.push(path);
            remove_artifacts(&written).await;
            return Err(e);
        }
        written.push(path);
    }
    Ok(written)
}

/// Best-effort removal.
async fn remove_artifacts(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %path.display(), error = %e, "Failed to remove job artifact"),
        }
    }
}
