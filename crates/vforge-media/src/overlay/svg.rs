//! SVG description of an overlay layout.

use std::fmt::Write;

use vforge_models::OverlayStyle;

use super::layout::{Background, OverlayLayout};
use super::text::render_line;

const SERIF_FAMILY: &str = "Georgia, 'Times New Roman', serif";
const SANS_FAMILY: &str = "Roboto, 'Noto Color Emoji', Helvetica, sans-serif";

const PANEL_FILL: &str = "#FFFFFF";
const PANEL_TEXT: &str = "#000000";
const PANEL_ATTRIBUTION: &str = "#FF8F00";

const BANNER_FILL: &str = "#000000";
const BANNER_OPACITY: f64 = 0.4;
const BANNER_RADIUS: u32 = 10;
const BANNER_TEXT: &str = "#FFFFFF";
const BANNER_ATTRIBUTION: &str = "#FFA500";

/// Build the SVG document for `layout` at its canvas size.
///
/// Styling uses presentation attributes only, so no stylesheet support is
/// needed from the rasterizer.
pub fn overlay_svg(layout: &OverlayLayout) -> String {
    let (width, height) = (layout.canvas.width, layout.canvas.height);
    let mut svg = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(
        svg,
        r#"<svg width="{width}" height="{height}" viewBox="0 0 {width} {height}" xmlns="http://www.w3.org/2000/svg">"#
    );

    match layout.background {
        Background::Panel { height } => {
            let _ = writeln!(
                svg,
                r#"  <rect x="0" y="0" width="{width}" height="{height}" fill="{PANEL_FILL}"/>"#
            );
        }
        Background::Banner {
            x,
            y,
            width,
            height,
        } => {
            let _ = writeln!(
                svg,
                r#"  <rect x="{x}" y="{y}" width="{width}" height="{height}" rx="{BANNER_RADIUS}" fill="{BANNER_FILL}" fill-opacity="{BANNER_OPACITY}"/>"#
            );
        }
    }

    let (family, main_fill, main_weight, attribution_fill) = match layout.style {
        OverlayStyle::Panel => (SERIF_FAMILY, PANEL_TEXT, "normal", PANEL_ATTRIBUTION),
        OverlayStyle::Banner => (SANS_FAMILY, BANNER_TEXT, "bold", BANNER_ATTRIBUTION),
    };

    if !layout.lines.is_empty() {
        let _ = writeln!(
            svg,
            r#"  <text font-family="{family}" font-size="{}" font-weight="{main_weight}" fill="{main_fill}" text-anchor="middle">"#,
            layout.font_size
        );
        for line in &layout.lines {
            let _ = writeln!(
                svg,
                r#"    <tspan x="{}" y="{}">{}</tspan>"#,
                layout.center_x,
                line.baseline,
                render_line(&line.text)
            );
        }
        svg.push_str("  </text>\n");
    }

    if let Some(attribution) = &layout.attribution {
        let label = match layout.style {
            OverlayStyle::Panel => render_line(&attribution.text),
            OverlayStyle::Banner => format!("- {} -", render_line(&attribution.text)),
        };
        let _ = writeln!(
            svg,
            r#"  <text x="{}" y="{}" font-family="{family}" font-size="{}" font-weight="bold" fill="{attribution_fill}" text-anchor="middle">{label}</text>"#,
            layout.center_x,
            attribution.baseline,
            layout.attribution_font_size
        );
    }

    svg.push_str("</svg>\n");
    svg
}
