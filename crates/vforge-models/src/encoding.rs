//! Video encoding constants and canvas resolutions.
//!
//! Encoding quality, preset, pixel format and streaming flags are fixed by the
//! system; callers cannot override them through job parameters.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default video codec (H.264)
pub const VIDEO_CODEC: &str = "libx264";
/// Encoding preset for re-encoded outputs
pub const PRESET: &str = "veryfast";
/// Constant Rate Factor for re-encoded outputs
pub const CRF: u8 = 20;
/// Pixel format (4:2:0 chroma subsampling, widest player support)
pub const PIXEL_FORMAT: &str = "yuv420p";
/// Move the moov atom to the front for progressive playback
pub const MOVFLAGS: &str = "+faststart";
/// Audio codec for re-encoded audio
pub const AUDIO_CODEC: &str = "aac";
/// Audio bitrate for re-encoded audio
pub const AUDIO_BITRATE: &str = "192k";

/// Default frame rate for generated videos.
pub const DEFAULT_FPS: u32 = 30;

/// Tall portrait frame used for vertical output.
pub const VERTICAL_CANVAS: Resolution = Resolution {
    width: 1080,
    height: 1920,
};

/// Wide frame used for landscape output.
pub const LANDSCAPE_CANVAS: Resolution = Resolution {
    width: 1920,
    height: 1080,
};

static RESOLUTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)x(\d+)$").expect("static regex"));

/// Frame size in pixels, written as `WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl JsonSchema for Resolution {
    fn schema_name() -> String {
        "Resolution".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = RESOLUTION_PATTERN
            .captures(s.trim())
            .ok_or_else(|| ValidationError::InvalidResolution(s.to_string()))?;

        let width: u32 = caps[1]
            .parse()
            .map_err(|_| ValidationError::InvalidResolution(s.to_string()))?;
        let height: u32 = caps[2]
            .parse()
            .map_err(|_| ValidationError::InvalidResolution(s.to_string()))?;

        if width == 0 || height == 0 {
            return Err(ValidationError::InvalidResolution(s.to_string()));
        }

        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}
