//! Overlay geometry.
//!
//! Everything here is computed in canvas pixels; the vector description and
//! the raster share this coordinate system one to one.

use vforge_models::{OverlayPosition, OverlayStyle, Resolution, TextOverlayParams};

use super::text::{char_budget, enforce_line_limit, wrap_text, MAX_LINES};

/// Added to the font size to get the baseline-to-baseline distance.
pub const LINE_GUTTER: u32 = 10;

/// Upper bound of a computed panel, as a fraction of canvas height.
pub const PANEL_MAX_RATIO: f64 = 0.32;

const PANEL_TOP_PADDING: f64 = 0.10;
const PANEL_BOTTOM_PADDING: f64 = 0.025;
const PANEL_ATTRIBUTION_PADDING: f64 = 0.02;

const BANNER_SIDE_INSET: f64 = 0.05;
const BANNER_HEIGHT: f64 = 0.30;
const BANNER_TOP: f64 = 0.10;
const BANNER_BOTTOM: f64 = 0.90;
const BANNER_TEXT_OFFSET: f64 = 1.2;

/// Per-style sizing ratios.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleMetrics {
    /// Side margin as a fraction of canvas width
    pub margin_ratio: f64,
    /// Text width is divided by this to get the font size
    pub font_divisor: f64,
    /// Attribution font size relative to the main font
    pub attribution_fraction: f64,
}

impl StyleMetrics {
    pub fn for_style(style: OverlayStyle) -> Self {
        match style {
            OverlayStyle::Panel => Self {
                margin_ratio: 0.08,
                font_divisor: 19.0,
                attribution_fraction: 0.8,
            },
            OverlayStyle::Banner => Self {
                margin_ratio: 0.15,
                font_divisor: 20.0,
                attribution_fraction: 0.7,
            },
        }
    }
}

/// Background shape behind the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    /// Opaque rectangle from the top edge, full width.
    Panel { height: u32 },
    /// Translucent rounded bar.
    Banner {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

/// A line of raw (unescaped, unexpanded) text with its baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedLine {
    pub text: String,
    pub baseline: u32,
}

/// Complete overlay geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayout {
    pub canvas: Resolution,
    pub style: OverlayStyle,
    pub margin: u32,
    pub text_width: u32,
    pub font_size: u32,
    pub attribution_font_size: u32,
    pub line_spacing: u32,
    pub center_x: u32,
    pub lines: Vec<PlacedLine>,
    pub attribution: Option<PlacedLine>,
    pub background: Background,
}

impl OverlayLayout {
    /// Height of the opaque panel, if this is a panel layout.
    pub fn panel_height(&self) -> Option<u32> {
        match self.background {
            Background::Panel { height } => Some(height),
            Background::Banner { .. } => None,
        }
    }
}

/// Lay out an overlay for `params` on `canvas`.
///
/// For the panel style the caller's ratio (already defaulted) fixes the panel
/// height; `None` lets the panel grow to fit five lines, up to
/// [`PANEL_MAX_RATIO`].
pub fn compute_layout(
    params: &TextOverlayParams,
    canvas: Resolution,
    panel_ratio: Option<f64>,
) -> OverlayLayout {
    let metrics = StyleMetrics::for_style(params.style);
    let width = canvas.width as f64;
    let height = canvas.height as f64;

    let margin = round(width * metrics.margin_ratio);
    let text_width = canvas.width.saturating_sub(2 * margin).max(1);
    let font_size = round(text_width as f64 / metrics.font_divisor).max(1);
    let attribution_font_size = round(font_size as f64 * metrics.attribution_fraction).max(1);
    let line_spacing = font_size + LINE_GUTTER;
    let attribution_gap = round(font_size as f64 * 0.25);

    let wrapped = wrap_text(&params.text, char_budget(text_width, font_size));
    let wrapped = enforce_line_limit(wrapped, MAX_LINES);

    let (first_baseline, background) = match params.style {
        OverlayStyle::Panel => {
            let top = round(height * PANEL_TOP_PADDING);
            let panel_height = match panel_ratio {
                Some(ratio) => even_floor(height * ratio),
                None => {
                    // Sized for the maximum line count so panels do not jump
                    // between jobs with different text lengths.
                    let last = top + (MAX_LINES as u32 - 1) * line_spacing + font_size;
                    let raw = last
                        + attribution_gap
                        + attribution_font_size
                        + round(height * PANEL_BOTTOM_PADDING);
                    even_floor((raw as f64).min(height * PANEL_MAX_RATIO))
                }
            };
            (top, Background::Panel { height: panel_height })
        }
        OverlayStyle::Banner => {
            let inset = round(width * BANNER_SIDE_INSET);
            let bar_width = canvas.width.saturating_sub(2 * inset);
            let bar_height = round(height * BANNER_HEIGHT);
            let bar_y = match params.position {
                OverlayPosition::Top => round(height * BANNER_TOP),
                OverlayPosition::Center => canvas.height.saturating_sub(bar_height) / 2,
                OverlayPosition::Bottom => {
                    round(height * BANNER_BOTTOM).saturating_sub(bar_height)
                }
            };
            let top = bar_y + round(font_size as f64 * BANNER_TEXT_OFFSET);
            let background = Background::Banner {
                x: inset,
                y: bar_y,
                width: bar_width,
                height: bar_height,
            };
            (top, background)
        }
    };

    let lines: Vec<PlacedLine> = wrapped
        .into_iter()
        .enumerate()
        .map(|(i, text)| PlacedLine {
            text,
            baseline: first_baseline + i as u32 * line_spacing,
        })
        .collect();

    let attribution = params.attribution().map(|text| {
        let line_count = lines.len().max(1) as u32;
        let last_baseline = first_baseline + (line_count - 1) * line_spacing;
        let mut baseline = last_baseline + font_size + attribution_gap;
        if let Background::Panel { height: panel_height } = background {
            let limit = panel_height.saturating_sub(round(height * PANEL_ATTRIBUTION_PADDING));
            baseline = baseline.min(limit);
        }
        PlacedLine {
            text: text.to_string(),
            baseline,
        }
    });

    OverlayLayout {
        canvas,
        style: params.style,
        margin,
        text_width,
        font_size,
        attribution_font_size,
        line_spacing,
        center_x: round(width / 2.0),
        lines,
        attribution,
        background,
    }
}

fn round(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

/// Largest even pixel count not above `value`.
fn even_floor(value: f64) -> u32 {
    // Absorb float noise such as 1920 * 0.3 = 575.999...
    let px = (value + 1e-6).floor().max(0.0) as u32;
    px - px % 2
}
