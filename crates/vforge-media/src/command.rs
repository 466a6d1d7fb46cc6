//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use vforge_models::encoding;

use crate::error::{MediaError, MediaResult};
use crate::progress::ProgressMonitor;

/// Exit code recorded when the executable could not be started at all.
pub const SPAWN_FAILURE_CODE: i32 = -1;

/// Exit code recorded when the executable was killed by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -3;

/// Builder for FFmpeg argument lists.
///
/// Arguments are kept in the order they are added; the overwrite flag is
/// left to [`FfmpegRunner`].
#[derive(Debug, Clone, Default)]
pub struct FfmpegCommand {
    args: Vec<String>,
}

impl FfmpegCommand {
    /// Create an empty command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple raw arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an input file.
    pub fn input(self, path: impl Into<String>) -> Self {
        self.arg("-i").arg(path)
    }

    /// Add a still image input looped for `seconds`.
    pub fn looped_image(self, path: impl Into<String>, seconds: u64) -> Self {
        self.args(["-loop", "1", "-t"])
            .arg(seconds.to_string())
            .input(path)
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.arg("-filter_complex").arg(filter)
    }

    /// Map a stream or filter label into the output.
    pub fn map(self, stream: impl Into<String>) -> Self {
        self.arg("-map").arg(stream)
    }

    /// Set output frame rate.
    pub fn frame_rate(self, fps: u32) -> Self {
        self.arg("-r").arg(fps.to_string())
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Stop at the end of the shortest stream.
    pub fn shortest(self) -> Self {
        self.arg("-shortest")
    }

    /// Re-encode video with the fixed H.264 settings.
    pub fn h264(self) -> Self {
        self.video_codec(encoding::VIDEO_CODEC)
            .arg("-preset")
            .arg(encoding::PRESET)
            .arg("-crf")
            .arg(encoding::CRF.to_string())
            .arg("-pix_fmt")
            .arg(encoding::PIXEL_FORMAT)
            .arg("-movflags")
            .arg(encoding::MOVFLAGS)
    }

    /// Set the output file and return the finished argument list.
    pub fn output(self, path: impl Into<String>) -> Vec<String> {
        self.arg(path).args
    }
}

/// Result of running the executable once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Exit code; [`SPAWN_FAILURE_CODE`] when the process never started,
    /// [`SIGNAL_EXIT_CODE`] when it was killed.
    pub code: i32,
    /// Combined stdout/stderr lines in arrival order.
    pub logs: Vec<String>,
    /// Wall time from spawn to exit
    pub elapsed: Duration,
}

impl RunOutcome {
    /// Whether the run counts as a success.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    fn spawn_failure(err: &std::io::Error) -> Self {
        Self {
            code: SPAWN_FAILURE_CODE,
            logs: vec![format!("spawn error: {}", err)],
            elapsed: Duration::ZERO,
        }
    }
}

/// Runner for the external media executable.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRunner {
    /// Create a runner for the given binary name or path.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Binary this runner invokes.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run with `-y` prepended to `args` inside `cwd`.
    ///
    /// Never fails: spawn errors and abnormal exits are folded into the
    /// returned outcome. Output lines are fed to `monitor` as they arrive.
    pub async fn run(
        &self,
        args: &[String],
        cwd: &Path,
        mut monitor: Option<ProgressMonitor>,
    ) -> RunOutcome {
        debug!(
            binary = %self.binary.display(),
            cwd = %cwd.display(),
            "Running: -y {}",
            args.join(" ")
        );
        let started = Instant::now();

        let mut child = match Command::new(&self.binary)
            .arg("-y")
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(binary = %self.binary.display(), error = %e, "Failed to spawn media executable");
                return RunOutcome::spawn_failure(&e);
            }
        };

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, line_tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, line_tx.clone())));
        }
        drop(line_tx);

        let mut logs = Vec::new();
        while let Some(line) = line_rx.recv().await {
            if let Some(monitor) = monitor.as_mut() {
                monitor.observe(&line);
            }
            logs.push(line);
        }
        for reader in readers {
            let _ = reader.await;
        }

        let code = match child.wait().await {
            Ok(status) => exit_code(status, &mut logs),
            Err(e) => {
                logs.push(format!("wait error: {}", e));
                SPAWN_FAILURE_CODE
            }
        };

        let elapsed = started.elapsed();
        info!(
            code,
            elapsed_secs = elapsed.as_secs_f64(),
            lines = logs.len(),
            "Media executable finished"
        );

        RunOutcome {
            code,
            logs,
            elapsed,
        }
    }
}

fn exit_code(status: ExitStatus, logs: &mut Vec<String>) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            logs.push(format!("terminated by signal {signal}"));
        }
    }
    SIGNAL_EXIT_CODE
}

async fn forward_lines<R>(mut reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::default();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
            }
        }
    }
    if let Some(line) = splitter.finish() {
        let _ = tx.send(line);
    }
}

/// Splits a byte stream into lines on either `\n` or `\r`.
///
/// FFmpeg rewrites its status line with bare carriage returns, so both count
/// as terminators. Empty lines are dropped.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if let Some(line) = self.take() {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    pub(crate) fn finish(mut self) -> Option<String> {
        self.take()
    }

    fn take(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg(binary: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let binary = binary.as_ref();
    which::which(binary).map_err(|_| MediaError::FfmpegNotFound(binary.display().to_string()))
}

/// Check if FFprobe is available.
pub fn check_ffprobe(binary: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let binary = binary.as_ref();
    which::which(binary).map_err(|_| MediaError::FfprobeNotFound(binary.display().to_string()))
}
