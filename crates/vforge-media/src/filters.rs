//! FFmpeg filter graph definitions.

use vforge_models::{Effect, Resolution, ZoomDirection, VERTICAL_CANVAS};

/// Frames per Ken Burns zoom cycle.
pub const KENBURNS_FRAMES: u32 = 125;

/// Zoom increment applied per frame.
pub const KENBURNS_STEP: f64 = 0.0015;

/// Upper zoom bound (and zoom-out starting point).
pub const KENBURNS_MAX_ZOOM: f64 = 1.5;

/// Pass-through filter used when a chain would otherwise be empty.
pub const FILTER_PASSTHROUGH: &str = "null";

/// Scale to fit inside the canvas, then letterbox to exactly its size.
pub fn filter_fit_canvas(canvas: Resolution, fps: u32) -> String {
    let Resolution { width: w, height: h } = canvas;
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p"
    )
}

/// Filter graph for a slideshow of `count` looped image inputs.
///
/// Each input is fitted to the canvas; multiple inputs are concatenated in
/// input order. The result is always labelled `[v]`.
pub fn filter_slideshow(count: usize, canvas: Resolution, fps: u32) -> String {
    let fit = filter_fit_canvas(canvas, fps);
    if count <= 1 {
        return format!("[0:v]{fit}[v]");
    }

    let mut graph: Vec<String> = (0..count)
        .map(|i| format!("[{i}:v]{fit}[v{i}]"))
        .collect();
    let labels: String = (0..count).map(|i| format!("[v{i}]")).collect();
    graph.push(format!("{labels}concat=n={count}:v=1:a=0[v]"));
    graph.join(";")
}

/// Gain filter for the second input's audio stream.
pub fn filter_volume(volume: f64) -> String {
    format!("[1:a]volume={volume}[a]")
}

/// Slow zoom centred on the frame.
pub fn filter_kenburns(direction: ZoomDirection) -> String {
    let zoom = match direction {
        ZoomDirection::ZoomIn => format!("min(zoom+{KENBURNS_STEP},{KENBURNS_MAX_ZOOM})"),
        ZoomDirection::ZoomOut => format!(
            "if(lte(zoom,1.0),{KENBURNS_MAX_ZOOM},max(1.001,zoom-{KENBURNS_STEP}))"
        ),
    };
    format!(
        "zoompan=z='{zoom}':d={KENBURNS_FRAMES}:x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':s={VERTICAL_CANVAS}"
    )
}

/// Filter for a single effect; `None` for unsupported kinds.
pub fn filter_effect(effect: &Effect) -> Option<String> {
    match *effect {
        Effect::Kenburns { direction } => Some(filter_kenburns(direction)),
        Effect::Brightness { value } => Some(format!("eq=brightness={value}")),
        Effect::Contrast { value } => Some(format!("eq=contrast={value}")),
        Effect::Blur { sigma } => Some(format!("gblur=sigma={sigma}")),
        Effect::Unsupported => None,
    }
}

/// Comma-joined chain of all supported effects, in order.
pub fn filter_effect_chain(effects: &[Effect]) -> String {
    let chain: Vec<String> = effects.iter().filter_map(filter_effect).collect();
    if chain.is_empty() {
        FILTER_PASSTHROUGH.to_string()
    } else {
        chain.join(",")
    }
}

/// Composite the second input over the first at the top-left corner.
pub fn filter_overlay_top_left() -> &'static str {
    "[0:v][1:v]overlay=0:0:format=auto[v]"
}
