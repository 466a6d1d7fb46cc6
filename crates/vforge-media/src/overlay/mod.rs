//! Text overlay rendering.
//!
//! The pipeline is layout → SVG → PNG. The PNG matches the base video's frame
//! size and is composited at 0:0 by the add-text-overlay command.

pub mod layout;
pub mod raster;
pub mod svg;
pub mod text;

use tracing::warn;
use vforge_models::{OverlayStyle, Resolution, TextOverlayParams, DEFAULT_PANEL_RATIO};

pub use layout::{compute_layout, Background, OverlayLayout, PlacedLine, StyleMetrics};
pub use raster::rasterize_png;
pub use svg::overlay_svg;

use crate::error::MediaResult;

/// A rasterized overlay ready to be written next to the job's outputs.
#[derive(Debug, Clone)]
pub struct RenderedOverlay {
    pub layout: OverlayLayout,
    pub svg: String,
    pub png: Vec<u8>,
}

/// Lay out and rasterize the overlay for `params` on a `canvas`-sized frame.
pub fn render_overlay(params: &TextOverlayParams, canvas: Resolution) -> MediaResult<RenderedOverlay> {
    let panel_ratio = match params.style {
        OverlayStyle::Panel => {
            if params.ratio_out_of_range() {
                warn!(
                    ratio = ?params.ratio,
                    fallback = DEFAULT_PANEL_RATIO,
                    "Panel ratio outside (0, 1), using default"
                );
            }
            Some(params.panel_ratio())
        }
        OverlayStyle::Banner => None,
    };

    let layout = compute_layout(params, canvas, panel_ratio);
    let svg = overlay_svg(&layout);
    let png = rasterize_png(&svg, canvas)?;

    Ok(RenderedOverlay { layout, svg, png })
}
