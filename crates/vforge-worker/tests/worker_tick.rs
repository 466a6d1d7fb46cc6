//! End-to-end worker ticks against a stub executable.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde_json::json;
use tempfile::TempDir;

use vforge_media::SIGNAL_EXIT_CODE;
use vforge_models::{
    AddAudioParams, JobId, JobStatus, OperationRequest, OverlayPosition, OverlayStyle,
    TextOverlayParams,
};
use vforge_queue::{FileQueue, JobLocation, JobLookup};
use vforge_worker::{JobExecutor, ManualClock, Scheduler, TickOutcome, WorkerConfig};

const ECHO_ARGS: &str = r#"echo "args: $*"
printf 'frame=1 fps=25 time=00:00:01.00 bitrate=1.0kbits/s\r' >&2
exit 0"#;

struct Fixture {
    tmp: TempDir,
    queue: FileQueue,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let queue = FileQueue::open(tmp.path().join("storage"));
        Self { tmp, queue }
    }

    /// Write an executable shell script standing in for ffmpeg.
    fn stub(&self, name: &str, body: &str) -> PathBuf {
        let path = self.tmp.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(&self, ffmpeg_bin: PathBuf) -> WorkerConfig {
        let mut config = WorkerConfig::with_storage_root(self.tmp.path().join("storage"));
        config.ffmpeg_bin = ffmpeg_bin;
        config.ffprobe_bin = self.tmp.path().join("no-ffprobe");
        config
    }

    fn executor(&self, script: &str) -> JobExecutor {
        JobExecutor::new(self.config(self.stub("ffmpeg", script)))
    }

    /// Drop a hand-written record into a session queue.
    async fn write_raw(&self, session_id: &str, job_id: &str, contents: &str) -> PathBuf {
        self.queue.layout().ensure_session(session_id).await.unwrap();
        let path = self
            .queue
            .layout()
            .queue_dir(session_id)
            .join(format!("{job_id}.json"));
        std::fs::write(&path, contents).unwrap();
        path
    }

    async fn lookup(&self, job_id: &JobId) -> JobLookup {
        self.queue
            .find_job(job_id.as_str(), true)
            .await
            .unwrap()
            .expect("job record")
    }

    fn session_path(&self, session_id: &str, rel: &str) -> PathBuf {
        self.queue.session_dir(session_id).join(rel)
    }
}

fn audio_request() -> OperationRequest {
    OperationRequest::AddAudio(AddAudioParams {
        video_file: "v.mp4".into(),
        audio_file: "a.mp3".into(),
        volume: 0.5,
    })
}

fn set_mtime(path: &Path, time: SystemTime) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}

fn queue_is_empty(fx: &Fixture, session_id: &str) -> bool {
    std::fs::read_dir(fx.queue.layout().queue_dir(session_id))
        .unwrap()
        .next()
        .is_none()
}

#[tokio::test]
async fn test_successful_job_is_completed() {
    let fx = Fixture::new();
    let queued = fx.queue.enqueue("s1", audio_request(), "out.mp4").await.unwrap();
    let mut executor = fx.executor(ECHO_ARGS);

    let outcome = executor.tick().await.unwrap();
    assert_eq!(outcome, TickOutcome::Completed(queued.job_id.clone()));

    let lookup = fx.lookup(&queued.job_id).await;
    assert_eq!(lookup.location, JobLocation::Completed);
    let record = lookup.record;
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.code, Some(0));
    assert_eq!(record.progress, Some(100));
    assert!(record.started_at.is_some());
    assert!(record.finished_at.is_some());
    assert_eq!(record.operation.as_deref(), Some("add-audio"));

    let args = record.args.clone().unwrap();
    assert_eq!(args.first().map(String::as_str), Some("-i"));
    assert_eq!(args.last().map(String::as_str), Some("output/out.mp4"));

    let logs = record.logs.unwrap();
    assert!(logs.contains(&format!("args: -y {}", args.join(" "))), "{logs:?}");
    assert!(logs.iter().any(|line| line.contains("time=00:00:01.00")));

    assert!(queue_is_empty(&fx, "s1"));
    assert_eq!(executor.tick().await.unwrap(), TickOutcome::Idle);
}

#[tokio::test]
async fn test_nonzero_exit_is_failed() {
    let fx = Fixture::new();
    let queued = fx.queue.enqueue("s1", audio_request(), "out.mp4").await.unwrap();
    let mut executor = fx.executor("echo 'Conversion failed!' >&2\nexit 3");

    let outcome = executor.tick().await.unwrap();
    assert_eq!(outcome, TickOutcome::Failed(queued.job_id.clone()));

    let lookup = fx.lookup(&queued.job_id).await;
    assert_eq!(lookup.location, JobLocation::Failed);
    assert_eq!(lookup.record.status, JobStatus::Failed);
    assert_eq!(lookup.record.code, Some(3));
    assert_eq!(lookup.record.logs.unwrap(), ["Conversion failed!"]);
    assert!(queue_is_empty(&fx, "s1"));
}

#[tokio::test]
async fn test_invalid_params_fail_without_running() {
    let fx = Fixture::new();
    let record = json!({
        "jobId": "job-bad",
        "sessionId": "s1",
        "operation": "image-to-video",
        "params": { "images": [], "duration": 4 },
        "outputFilename": "out.mp4",
        "status": "queued",
    });
    fx.write_raw("s1", "job-bad", &record.to_string()).await;
    let mut executor = fx.executor("touch ran-marker");

    let outcome = executor.tick().await.unwrap();
    assert_eq!(outcome, TickOutcome::Failed(JobId::from("job-bad")));
    assert!(!fx.session_path("s1", "ran-marker").exists());

    let lookup = fx.lookup(&JobId::from("job-bad")).await;
    assert_eq!(lookup.location, JobLocation::Failed);
    assert!(lookup.record.args.is_none());
    let logs = lookup.record.logs.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].contains("at least one image is required"), "{logs:?}");
}

#[tokio::test]
async fn test_unknown_operation_fails() {
    let fx = Fixture::new();
    let record = json!({
        "jobId": "job-rot",
        "sessionId": "s1",
        "operation": "rotate",
        "params": {},
        "outputFilename": "out.mp4",
        "status": "queued",
    });
    fx.write_raw("s1", "job-rot", &record.to_string()).await;
    let mut executor = fx.executor("touch ran-marker");

    assert_eq!(
        executor.tick().await.unwrap(),
        TickOutcome::Failed(JobId::from("job-rot"))
    );
    assert!(!fx.session_path("s1", "ran-marker").exists());

    let logs = fx.lookup(&JobId::from("job-rot")).await.record.logs.unwrap();
    assert!(logs[0].contains("Unsupported operation: rotate"), "{logs:?}");
}

#[tokio::test]
async fn test_corrupt_record_is_discarded() {
    let fx = Fixture::new();
    fx.write_raw("s1", "job-junk", "{ not json").await;
    let mut executor = fx.executor(ECHO_ARGS);

    let outcome = executor.tick().await.unwrap();
    let TickOutcome::Discarded(path) = outcome else {
        panic!("expected discard, got {outcome:?}");
    };
    assert!(path.ends_with("job-junk.processing"));
    assert!(!path.exists());
    assert!(queue_is_empty(&fx, "s1"));
    assert!(fx.queue.find_job("job-junk", true).await.unwrap().is_none());
}

#[tokio::test]
async fn test_prebuilt_args_run_unchanged() {
    let fx = Fixture::new();
    let record = json!({
        "jobId": "job-pre",
        "sessionId": "s1",
        "args": ["-i", "in.mp4", "copy.mp4"],
        "status": "queued",
        "clientTag": "abc",
    });
    fx.write_raw("s1", "job-pre", &record.to_string()).await;
    let mut executor = fx.executor(ECHO_ARGS);

    assert_eq!(
        executor.tick().await.unwrap(),
        TickOutcome::Completed(JobId::from("job-pre"))
    );

    let record = fx.lookup(&JobId::from("job-pre")).await.record;
    assert_eq!(record.args.unwrap(), ["-i", "in.mp4", "copy.mp4"]);
    assert_eq!(
        record.cwd.as_deref(),
        Some(fx.queue.session_dir("s1").display().to_string().as_str())
    );
    assert!(record
        .logs
        .unwrap()
        .contains(&"args: -y -i in.mp4 copy.mp4".to_string()));
    assert_eq!(record.extra.get("clientTag"), Some(&json!("abc")));
}

#[tokio::test]
async fn test_spawn_failure_is_failed() {
    let fx = Fixture::new();
    let queued = fx.queue.enqueue("s1", audio_request(), "out.mp4").await.unwrap();
    let mut executor = JobExecutor::new(fx.config(fx.tmp.path().join("missing-ffmpeg")));

    assert_eq!(
        executor.tick().await.unwrap(),
        TickOutcome::Failed(queued.job_id.clone())
    );
    let record = fx.lookup(&queued.job_id).await.record;
    assert_eq!(record.code, Some(-1));
    assert!(record.logs.unwrap()[0].starts_with("spawn error"));
}

#[tokio::test]
async fn test_killed_run_is_failed() {
    let fx = Fixture::new();
    let queued = fx.queue.enqueue("s1", audio_request(), "out.mp4").await.unwrap();
    let mut executor = fx.executor("kill -9 $$");

    assert_eq!(
        executor.tick().await.unwrap(),
        TickOutcome::Failed(queued.job_id.clone())
    );
    let record = fx.lookup(&queued.job_id).await.record;
    assert_eq!(record.code, Some(SIGNAL_EXIT_CODE));
    assert_eq!(record.logs.unwrap(), ["terminated by signal 9"]);
}

#[tokio::test]
async fn test_record_without_job_id_runs() {
    let fx = Fixture::new();
    let record = json!({
        "sessionId": "s1",
        "operation": "add-audio",
        "params": { "videoFile": "v.mp4", "audioFile": "a.mp3" },
        "outputFilename": "out.mp4",
        "status": "queued",
        "createdAt": "2024-05-01T10:00:00.000Z",
    });
    fx.write_raw("s1", "job-abc12345", &record.to_string()).await;
    let mut executor = fx.executor(ECHO_ARGS);

    assert_eq!(
        executor.tick().await.unwrap(),
        TickOutcome::Completed(JobId::from("job-abc12345"))
    );
    let lookup = fx.lookup(&JobId::from("job-abc12345")).await;
    assert_eq!(lookup.location, JobLocation::Completed);
    assert_eq!(lookup.record.job_id.as_str(), "job-abc12345");
    assert!(queue_is_empty(&fx, "s1"));
}

#[tokio::test]
async fn test_backlogged_job_has_one_claimant() {
    let fx = Fixture::new();
    let queued = fx.queue.enqueue("s1", audio_request(), "out.mp4").await.unwrap();
    let queue_dir = fx.queue.layout().queue_dir("s1");
    // Waited in the backlog for longer than the lease.
    set_mtime(
        &queue_dir.join(format!("{}.json", queued.job_id)),
        SystemTime::now() - Duration::from_secs(1200),
    );

    let worker = |name: &str, script: &str| {
        let mut config = fx.config(fx.stub(name, script));
        config.queue.lease_timeout = Duration::from_secs(900);
        JobExecutor::new(config)
    };
    let mut first = worker("ffmpeg-slow", &format!("sleep 1\n{ECHO_ARGS}"));
    let mut second = worker("ffmpeg", ECHO_ARGS);

    let running = tokio::spawn(async move { first.tick().await.unwrap() });

    // Wait until the first worker has stamped its claim.
    let in_flight = queue_dir.join(format!("{}.processing", queued.job_id));
    let mut stamped = false;
    for _ in 0..250 {
        stamped = std::fs::read(&in_flight)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
            .is_some_and(|record| record.get("claimToken").is_some());
        if stamped {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stamped);

    // The second worker reaps on its first tick and must leave the claim alone.
    assert_eq!(second.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(
        running.await.unwrap(),
        TickOutcome::Completed(queued.job_id.clone())
    );

    let record = fx.lookup(&queued.job_id).await.record;
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.attempts, 0);
    assert!(queue_is_empty(&fx, "s1"));
    assert_eq!(second.tick().await.unwrap(), TickOutcome::Idle);
}

#[tokio::test]
async fn test_result_dropped_when_claim_taken_over() {
    let fx = Fixture::new();
    let queued = fx.queue.enqueue("s1", audio_request(), "out.mp4").await.unwrap();
    // Another worker takes the job over while this one runs.
    let mut executor = fx.executor(
        r#"sed -i 's/"claimToken": "[^"]*"/"claimToken": "other"/' queue/*.processing
exit 0"#,
    );

    assert_eq!(
        executor.tick().await.unwrap(),
        TickOutcome::LeaseLost(queued.job_id.clone())
    );
    let lookup = fx.lookup(&queued.job_id).await;
    assert_eq!(lookup.location, JobLocation::InFlight);
    assert_eq!(lookup.record.claim_token.as_deref(), Some("other"));
}

#[tokio::test]
async fn test_oldest_job_across_sessions_first() {
    let fx = Fixture::new();
    let newer = fx.queue.enqueue("s1", audio_request(), "a.mp4").await.unwrap();
    let older = fx.queue.enqueue("s2", audio_request(), "b.mp4").await.unwrap();
    let base = SystemTime::now() - Duration::from_secs(600);
    set_mtime(
        &fx.queue.layout().queue_dir("s1").join(format!("{}.json", newer.job_id)),
        base + Duration::from_secs(10),
    );
    set_mtime(
        &fx.queue.layout().queue_dir("s2").join(format!("{}.json", older.job_id)),
        base,
    );
    let mut executor = fx.executor(ECHO_ARGS);

    // One job per tick, oldest first.
    assert_eq!(executor.tick().await.unwrap(), TickOutcome::Completed(older.job_id));
    assert_eq!(fx.lookup(&newer.job_id).await.location, JobLocation::Queued);
    assert_eq!(executor.tick().await.unwrap(), TickOutcome::Completed(newer.job_id));
}

#[tokio::test]
async fn test_expired_lease_is_requeued_and_rerun() {
    let fx = Fixture::new();
    let queued = fx.queue.enqueue("s1", audio_request(), "out.mp4").await.unwrap();

    // A worker claimed the job and died without a heartbeat.
    let entry = fx.queue.discover().await.unwrap().remove(0);
    let claimed = fx.queue.claim(&entry).await.unwrap().unwrap();
    set_mtime(&claimed.in_flight, SystemTime::now() - Duration::from_secs(3600));

    let mut config = fx.config(fx.stub("ffmpeg", ECHO_ARGS));
    config.queue.lease_timeout = Duration::from_secs(60);
    let mut executor = JobExecutor::new(config);

    assert_eq!(
        executor.tick().await.unwrap(),
        TickOutcome::Completed(queued.job_id.clone())
    );
    let record = fx.lookup(&queued.job_id).await.record;
    assert_eq!(record.attempts, 1);
    assert_eq!(record.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_text_overlay_artifact_lifecycle() {
    let fx = Fixture::new();
    let request = OperationRequest::AddTextOverlay(TextOverlayParams {
        video_file: "base.mp4".into(),
        text: "Breaking :fire: news".into(),
        subtitle: Some("Desk".into()),
        position: OverlayPosition::Top,
        style: OverlayStyle::Panel,
        ratio: None,
    });
    let queued = fx.queue.enqueue("s1", request, "final.mp4").await.unwrap();
    let mut executor =
        fx.executor("test -s output/.overlay-final.png && echo 'overlay present'\nexit 0");

    assert_eq!(
        executor.tick().await.unwrap(),
        TickOutcome::Completed(queued.job_id.clone())
    );
    let record = fx.lookup(&queued.job_id).await.record;
    assert_eq!(record.logs.unwrap(), ["overlay present"]);
    assert!(record
        .args
        .unwrap()
        .contains(&"output/.overlay-final.png".to_string()));
    assert!(!fx.session_path("s1", "output/.overlay-final.png").exists());
}

#[tokio::test]
async fn test_scheduler_drives_executor() {
    let fx = Fixture::new();
    let queued = fx.queue.enqueue("s1", audio_request(), "out.mp4").await.unwrap();
    let (clock, ticker) = ManualClock::new();
    let handle = Scheduler::start(clock, fx.executor(ECHO_ARGS));

    ticker.tick();
    // The record moves between directories while the tick runs, so a single
    // lookup may miss it.
    let mut location = None;
    for _ in 0..250 {
        location = fx
            .queue
            .find_job(queued.job_id.as_str(), false)
            .await
            .unwrap()
            .map(|lookup| lookup.location);
        if location == Some(JobLocation::Completed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(location, Some(JobLocation::Completed));

    let executor = handle.stop().await.expect("scheduler task");
    assert_eq!(executor.queue().discover().await.unwrap().len(), 0);
}
