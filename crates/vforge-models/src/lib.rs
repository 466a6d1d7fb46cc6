//! Shared data models for the VideoForge job pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job records as persisted in a session's queue directories
//! - Operation kinds and their strongly-typed parameters
//! - Video effect descriptors
//! - Fixed encoding constants and canvas resolutions

pub mod encoding;
pub mod error;
pub mod job;
pub mod operation;

// Re-export common types
pub use encoding::{Resolution, LANDSCAPE_CANVAS, VERTICAL_CANVAS};
pub use error::{ValidationError, ValidationResult};
pub use job::{JobId, JobRecord, JobStatus};
pub use operation::{
    AddAudioParams, ApplyEffectsParams, Effect, ImageToVideoParams, OperationKind,
    OperationRequest, Orientation, OverlayPosition, OverlayStyle, TextOverlayParams,
    ZoomDirection, DEFAULT_PANEL_RATIO,
};
