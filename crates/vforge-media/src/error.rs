//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;
use vforge_models::ValidationError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while preparing or probing media work.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("FFprobe not found: {0}")]
    FfprobeNotFound(String),

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Invalid job parameters: {0}")]
    Validation(#[from] ValidationError),

    #[error("Overlay generation failed: {0}")]
    Overlay(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),
}

impl MediaError {
    /// Create an overlay failure error.
    pub fn overlay(message: impl Into<String>) -> Self {
        Self::Overlay(message.into())
    }

    /// Create an FFprobe failure error.
    pub fn ffprobe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::FfprobeFailed {
            message: message.into(),
            stderr,
        }
    }

    /// Whether the error was caused by the job's own parameters.
    pub fn is_validation(&self) -> bool {
        matches!(self, MediaError::Validation(_))
    }
}
