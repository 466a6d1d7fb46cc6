#![deny(unreachable_patterns)]
//! FFmpeg CLI plumbing for the VideoForge worker.
//!
//! This crate provides:
//! - Per-operation FFmpeg argument building from typed job parameters
//! - Filter graph helpers (scale/pad, concat, effects, overlay)
//! - Text overlay layout, vector description and rasterization
//! - Progress parsing from FFmpeg's elapsed-time markers
//! - A runner that captures combined output and reports progress
//! - Duration and dimension probing via FFprobe

pub mod builder;
pub mod command;
pub mod error;
pub mod filters;
pub mod overlay;
pub mod probe;
pub mod progress;

pub use builder::{build_command, Artifact, BuildContext, CommandPlan};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegRunner, RunOutcome, SIGNAL_EXIT_CODE, SPAWN_FAILURE_CODE};
pub use error::{MediaError, MediaResult};
pub use overlay::{render_overlay, RenderedOverlay};
pub use probe::{probe_video, VideoInfo};
pub use progress::{parse_elapsed, percentage, ProgressMonitor};
