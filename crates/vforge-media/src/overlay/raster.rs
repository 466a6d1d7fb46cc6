//! SVG to PNG rasterization.

use std::sync::{Arc, OnceLock};

use resvg::{tiny_skia, usvg};
use tracing::debug;

use vforge_models::Resolution;

use crate::error::{MediaError, MediaResult};

static FONT_DATABASE: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();

/// System fonts, loaded once per process.
fn font_database() -> Arc<usvg::fontdb::Database> {
    FONT_DATABASE
        .get_or_init(|| {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            debug!(faces = db.len(), "Loaded system fonts for overlays");
            Arc::new(db)
        })
        .clone()
}

/// Rasterize `svg` into a PNG of exactly `canvas` pixels.
///
/// The document must declare the same size as the canvas; the raster is
/// never scaled.
pub fn rasterize_png(svg: &str, canvas: Resolution) -> MediaResult<Vec<u8>> {
    let options = usvg::Options {
        fontdb: font_database(),
        ..usvg::Options::default()
    };

    let tree = usvg::Tree::from_str(svg, &options)
        .map_err(|e| MediaError::overlay(format!("invalid overlay SVG: {}", e)))?;

    let size = tree.size();
    if size.width() != canvas.width as f32 || size.height() != canvas.height as f32 {
        return Err(MediaError::overlay(format!(
            "overlay SVG is {}x{}, expected {}",
            size.width(),
            size.height(),
            canvas
        )));
    }

    let mut pixmap = tiny_skia::Pixmap::new(canvas.width, canvas.height)
        .ok_or_else(|| MediaError::overlay(format!("cannot allocate {} pixmap", canvas)))?;
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| MediaError::overlay(format!("PNG encoding failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_rasterize_rect() {
        let svg = r##"<svg width="40" height="20" viewBox="0 0 40 20" xmlns="http://www.w3.org/2000/svg"><rect x="0" y="0" width="40" height="10" fill="#FFFFFF"/></svg>"##;
        let png = rasterize_png(svg, Resolution::new(40, 20)).unwrap();
        assert_eq!(png[..8], PNG_SIGNATURE);
        // IHDR width and height, big endian
        assert_eq!(&png[16..24], &[0, 0, 0, 40, 0, 0, 0, 20]);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let svg = r#"<svg width="40" height="20" xmlns="http://www.w3.org/2000/svg"></svg>"#;
        let result = rasterize_png(svg, Resolution::new(80, 40));
        assert!(matches!(result, Err(MediaError::Overlay(_))));
    }

    #[test]
    fn test_malformed_svg_rejected() {
        let result = rasterize_png("<svg", Resolution::new(10, 10));
        assert!(matches!(result, Err(MediaError::Overlay(_))));
    }
}
