//! Operation kinds and their strongly-typed parameters.
//!
//! A job record carries `operation` and `params` as two loose JSON fields.
//! [`OperationRequest`] is the validated form: one variant per operation
//! kind, each with its own field set, parsed at the boundary where the
//! worker loads a record.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encoding::{Resolution, DEFAULT_FPS, LANDSCAPE_CANVAS, VERTICAL_CANVAS};
use crate::error::{ValidationError, ValidationResult};

/// Panel height ratio used when the caller supplies none (or an invalid one).
pub const DEFAULT_PANEL_RATIO: f64 = 0.30;

/// Maximum main text length accepted for an overlay.
pub const MAX_OVERLAY_TEXT_CHARS: usize = 500;

/// Maximum subtitle length accepted for an overlay.
pub const MAX_OVERLAY_SUBTITLE_CHARS: usize = 100;

/// Closed set of supported media-editing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    ImageToVideo,
    AddAudio,
    ApplyEffects,
    AddTextOverlay,
}

impl OperationKind {
    pub const ALL: &'static [OperationKind] = &[
        OperationKind::ImageToVideo,
        OperationKind::AddAudio,
        OperationKind::ApplyEffects,
        OperationKind::AddTextOverlay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ImageToVideo => "image-to-video",
            OperationKind::AddAudio => "add-audio",
            OperationKind::ApplyEffects => "apply-effects",
            OperationKind::AddTextOverlay => "add-text-overlay",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::UnsupportedOperation(s.to_string()))
    }
}

/// Output frame orientation for generated videos.
///
/// Anything other than `landscape` means vertical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    #[default]
    #[serde(other)]
    Vertical,
}

impl Orientation {
    pub fn default_canvas(&self) -> Resolution {
        match self {
            Orientation::Vertical => VERTICAL_CANVAS,
            Orientation::Landscape => LANDSCAPE_CANVAS,
        }
    }
}

/// Parameters for composing a slideshow video from still images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageToVideoParams {
    /// Image file names under the session's `input/` directory, in display order
    pub images: Vec<String>,
    /// Total output duration in seconds
    pub duration: f64,
    /// Output frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub orientation: Orientation,
    /// Explicit `WIDTHxHEIGHT` override of the orientation default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

impl ImageToVideoParams {
    /// Target canvas: explicit override, else the orientation default.
    pub fn canvas(&self) -> Resolution {
        self.resolution
            .unwrap_or_else(|| self.orientation.default_canvas())
    }

    /// Seconds each image stays on screen, never below one.
    pub fn seconds_per_image(&self) -> u64 {
        let count = self.images.len().max(1) as f64;
        ((self.duration / count).floor() as u64).max(1)
    }

    fn validate(&self) -> ValidationResult<()> {
        if self.images.is_empty() {
            return Err(ValidationError::invalid_value("images", "at least one image is required"));
        }
        if let Some(name) = self.images.iter().find(|name| name.trim().is_empty()) {
            return Err(ValidationError::invalid_value(
                "images",
                format!("empty image reference '{}'", name),
            ));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ValidationError::invalid_value("duration", "must be a positive number"));
        }
        if !(1..=120).contains(&self.fps) {
            return Err(ValidationError::invalid_value("fps", "must be between 1 and 120"));
        }
        Ok(())
    }
}

/// Parameters for muxing an audio track onto an existing video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddAudioParams {
    /// Video file name under the session's `output/` directory
    pub video_file: String,
    /// Audio file name under the session's `input/` directory
    pub audio_file: String,
    /// Gain multiplier applied to the audio stream
    #[serde(default = "default_volume")]
    pub volume: f64,
}

fn default_volume() -> f64 {
    1.0
}

impl AddAudioParams {
    fn validate(&self) -> ValidationResult<()> {
        require_file("videoFile", &self.video_file)?;
        require_file("audioFile", &self.audio_file)?;
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(ValidationError::invalid_value("volume", "must be a non-negative number"));
        }
        Ok(())
    }
}

/// Zoom direction for the Ken Burns effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ZoomDirection {
    #[default]
    #[serde(alias = "in")]
    ZoomIn,
    #[serde(alias = "out")]
    ZoomOut,
}

/// A single visual effect descriptor.
///
/// Unknown `type` values deserialize to [`Effect::Unsupported`] and are
/// skipped when the filter chain is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Effect {
    Kenburns {
        #[serde(default, alias = "mode", alias = "zoom")]
        direction: ZoomDirection,
    },
    Brightness {
        value: f64,
    },
    Contrast {
        value: f64,
    },
    Blur {
        sigma: f64,
    },
    #[serde(other)]
    Unsupported,
}

impl Effect {
    fn validate(&self) -> ValidationResult<()> {
        match *self {
            Effect::Brightness { value } if !value.is_finite() || !(-1.0..=1.0).contains(&value) => {
                Err(ValidationError::invalid_value("brightness", "must be between -1 and 1"))
            }
            Effect::Contrast { value }
                if !value.is_finite() || !(-1000.0..=1000.0).contains(&value) =>
            {
                Err(ValidationError::invalid_value("contrast", "must be between -1000 and 1000"))
            }
            Effect::Blur { sigma } if !sigma.is_finite() || sigma <= 0.0 => {
                Err(ValidationError::invalid_value("blur", "sigma must be positive"))
            }
            _ => Ok(()),
        }
    }
}

/// Parameters for applying an ordered chain of visual effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEffectsParams {
    /// Video file name under the session's `output/` directory
    pub video_file: String,
    pub effects: Vec<Effect>,
}

impl ApplyEffectsParams {
    fn validate(&self) -> ValidationResult<()> {
        require_file("videoFile", &self.video_file)?;
        self.effects.iter().try_for_each(Effect::validate)
    }
}

/// Overlay presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlayStyle {
    /// Opaque light panel across the top, dark serif text
    #[default]
    Panel,
    /// Semi-transparent dark bar, light sans-serif text
    Banner,
}

/// Vertical placement of a banner overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPosition {
    #[default]
    Top,
    Center,
    Bottom,
}

/// Parameters for burning a text overlay into a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TextOverlayParams {
    /// Video file name under the session's `output/` directory
    pub video_file: String,
    pub text: String,
    /// Attribution line shown under the main text
    #[serde(default, alias = "attribution", skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub position: OverlayPosition,
    #[serde(default)]
    pub style: OverlayStyle,
    /// Panel height as a fraction of the canvas height, in (0, 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
}

impl TextOverlayParams {
    /// Effective panel ratio: the supplied one when inside (0, 1), else the default.
    pub fn panel_ratio(&self) -> f64 {
        match self.ratio {
            Some(ratio) if ratio > 0.0 && ratio < 1.0 => ratio,
            _ => DEFAULT_PANEL_RATIO,
        }
    }

    /// Whether a ratio was supplied but fell outside (0, 1).
    pub fn ratio_out_of_range(&self) -> bool {
        matches!(self.ratio, Some(ratio) if !(ratio > 0.0 && ratio < 1.0))
    }

    /// Attribution text, `None` when absent or blank.
    pub fn attribution(&self) -> Option<&str> {
        self.subtitle
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn validate(&self) -> ValidationResult<()> {
        require_file("videoFile", &self.video_file)?;
        if self.text.trim().is_empty() {
            return Err(ValidationError::invalid_value("text", "must not be empty"));
        }
        if self.text.chars().count() > MAX_OVERLAY_TEXT_CHARS {
            return Err(ValidationError::invalid_value(
                "text",
                format!("must be {} characters or less", MAX_OVERLAY_TEXT_CHARS),
            ));
        }
        if let Some(subtitle) = &self.subtitle {
            if subtitle.chars().count() > MAX_OVERLAY_SUBTITLE_CHARS {
                return Err(ValidationError::invalid_value(
                    "subtitle",
                    format!("must be {} characters or less", MAX_OVERLAY_SUBTITLE_CHARS),
                ));
            }
        }
        Ok(())
    }
}

fn require_file(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::invalid_value(field, "is required"));
    }
    Ok(())
}

/// Validated operation with its typed parameters.
///
/// Serializes to the record's wire shape: `{"operation": ..., "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", content = "params", rename_all = "kebab-case")]
pub enum OperationRequest {
    ImageToVideo(ImageToVideoParams),
    AddAudio(AddAudioParams),
    ApplyEffects(ApplyEffectsParams),
    AddTextOverlay(TextOverlayParams),
}

impl OperationRequest {
    /// Parse and validate the loose `operation` / `params` pair of a record.
    pub fn from_parts(operation: &str, params: Option<&Value>) -> ValidationResult<Self> {
        // Reject unknown kinds before serde turns them into a generic variant error.
        let kind: OperationKind = operation.parse()?;

        let params = params
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let wire = serde_json::json!({
            "operation": kind.as_str(),
            "params": params,
        });

        let request: OperationRequest = serde_json::from_value(wire)
            .map_err(|e| ValidationError::invalid_params(kind.as_str(), e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::ImageToVideo(_) => OperationKind::ImageToVideo,
            OperationRequest::AddAudio(_) => OperationKind::AddAudio,
            OperationRequest::ApplyEffects(_) => OperationKind::ApplyEffects,
            OperationRequest::AddTextOverlay(_) => OperationKind::AddTextOverlay,
        }
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> ValidationResult<()> {
        match self {
            OperationRequest::ImageToVideo(p) => p.validate(),
            OperationRequest::AddAudio(p) => p.validate(),
            OperationRequest::ApplyEffects(p) => p.validate(),
            OperationRequest::AddTextOverlay(p) => p.validate(),
        }
    }

    /// Video under `output/` that this operation reads, if any.
    pub fn source_video(&self) -> Option<&str> {
        match self {
            OperationRequest::ImageToVideo(_) => None,
            OperationRequest::AddAudio(p) => Some(&p.video_file),
            OperationRequest::ApplyEffects(p) => Some(&p.video_file),
            OperationRequest::AddTextOverlay(p) => Some(&p.video_file),
        }
    }

    /// Output length declared by a generative operation.
    pub fn declared_duration(&self) -> Option<f64> {
        match self {
            OperationRequest::ImageToVideo(p) => Some(p.duration),
            _ => None,
        }
    }

    /// Split into the record's `operation` and `params` fields.
    pub fn into_parts(self) -> (String, Value) {
        let kind = self.kind().as_str().to_string();
        let params = match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("params").unwrap_or(Value::Null),
            _ => Value::Null,
        };
        (kind, params)
    }
}
