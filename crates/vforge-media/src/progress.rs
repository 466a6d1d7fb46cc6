//! FFmpeg progress parsing.
//!
//! FFmpeg reports how much output it has produced as `time=HH:MM:SS.CC`
//! inside its status lines. Dividing that by the expected output length
//! gives an advisory completion percentage.

use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::mpsc;

static ELAPSED_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=\s*(\d+):(\d{2}):(\d{2})\.(\d+)").expect("static regex")
});

/// Extract the elapsed output time, in seconds, from one output line.
pub fn parse_elapsed(line: &str) -> Option<f64> {
    let caps = ELAPSED_MARKER.captures(line)?;

    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let fraction: f64 = format!("0.{}", &caps[4]).parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds + fraction)
}

/// Convert elapsed seconds into a 0-100 percentage of `target_secs`.
///
/// Returns `None` when the target is unknown, zero or not finite.
pub fn percentage(elapsed_secs: f64, target_secs: f64) -> Option<u8> {
    if !target_secs.is_finite() || target_secs <= 0.0 || !elapsed_secs.is_finite() {
        return None;
    }
    let pct = (elapsed_secs / target_secs * 100.0).clamp(0.0, 100.0);
    Some(pct.floor() as u8)
}

/// Watches executable output and sends a percentage for every elapsed marker.
///
/// Sending never blocks: the channel is unbounded and a dropped receiver is
/// ignored, so a slow or missing consumer cannot hold up the run.
#[derive(Debug)]
pub struct ProgressMonitor {
    target_secs: Option<f64>,
    tx: mpsc::UnboundedSender<u8>,
}

impl ProgressMonitor {
    /// Create a monitor sending into an existing channel.
    pub fn new(target_secs: Option<f64>, tx: mpsc::UnboundedSender<u8>) -> Self {
        Self { target_secs, tx }
    }

    /// Create a monitor together with the receiving end of its channel.
    pub fn channel(target_secs: Option<f64>) -> (Self, mpsc::UnboundedReceiver<u8>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(target_secs, tx), rx)
    }

    /// Inspect one output line; emits at most one update.
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        let target = self.target_secs?;
        let elapsed = parse_elapsed(line)?;
        let pct = percentage(elapsed, target)?;
        let _ = self.tx.send(pct);
        Some(pct)
    }
}
