//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vforge_queue::QueueConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Storage root, lease timeout and attempt limit
    pub queue: QueueConfig,
    /// FFmpeg binary name or path
    pub ffmpeg_bin: PathBuf,
    /// FFprobe binary name or path
    pub ffprobe_bin: PathBuf,
    /// Delay between scheduler ticks
    pub tick_interval: Duration,
    /// How often a running job refreshes its in-flight record
    pub heartbeat_interval: Duration,
    /// How often expired leases are looked for
    pub reap_interval: Duration,
    /// Prometheus listener port; metrics are off when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            tick_interval: Duration::from_millis(2000),
            heartbeat_interval: Duration::from_secs(15),
            reap_interval: Duration::from_secs(60),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            queue: QueueConfig::from_env(),
            ffmpeg_bin: std::env::var("FFMPEG_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            ffprobe_bin: std::env::var("FFPROBE_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffprobe")),
            tick_interval: Duration::from_millis(
                std::env::var("WORKER_TICK_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|ms| *ms > 0)
                    .unwrap_or(2000),
            ),
            heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(15),
            ),
            reap_interval: Duration::from_secs(
                std::env::var("WORKER_REAP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Config rooted at `storage_root` with every other value at its default.
    pub fn with_storage_root(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            queue: QueueConfig {
                storage_root: storage_root.into(),
                ..QueueConfig::default()
            },
            ..Self::default()
        }
    }
}
