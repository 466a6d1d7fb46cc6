//! Per-operation FFmpeg argument building.
//!
//! [`build_command`] maps a validated [`OperationRequest`] to the argument list
//! for one FFmpeg run. It performs no I/O: files the run needs that do not
//! exist yet (the rendered overlay panel) are returned as [`Artifact`]s for the
//! caller to write before spawning.

use std::path::Path;

use vforge_models::{
    encoding, AddAudioParams, ApplyEffectsParams, ImageToVideoParams, OperationRequest,
    Resolution, TextOverlayParams, ValidationError, VERTICAL_CANVAS,
};

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::filters::{filter_effect_chain, filter_overlay_top_left, filter_slideshow, filter_volume};
use crate::overlay::render_overlay;

/// Session subdirectory holding uploaded sources.
pub const INPUT_DIR: &str = "input";

/// Session subdirectory holding produced videos.
pub const OUTPUT_DIR: &str = "output";

/// A file the command expects to find relative to its working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Path relative to the working directory
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Everything needed to run one operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandPlan {
    /// Arguments after the runner's overwrite flag
    pub args: Vec<String>,
    /// Files to write before running, removed afterwards
    pub artifacts: Vec<Artifact>,
}

/// Facts about the job's inputs gathered by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildContext {
    /// Frame size of the source video, when it could be probed
    pub source_resolution: Option<Resolution>,
}

impl BuildContext {
    pub fn with_source_resolution(resolution: Option<Resolution>) -> Self {
        Self {
            source_resolution: resolution,
        }
    }
}

/// Build the command plan for `request` writing `output/{output_filename}`.
///
/// Identical inputs always give identical plans or identical errors.
pub fn build_command(
    request: &OperationRequest,
    output_filename: &str,
    ctx: &BuildContext,
) -> MediaResult<CommandPlan> {
    request.validate()?;
    check_file_name("outputFilename", output_filename)?;
    let output = output_path(output_filename);

    match request {
        OperationRequest::ImageToVideo(p) => image_to_video(p, output),
        OperationRequest::AddAudio(p) => add_audio(p, output),
        OperationRequest::ApplyEffects(p) => apply_effects(p, output),
        OperationRequest::AddTextOverlay(p) => add_text_overlay(p, output_filename, output, ctx),
    }
}

/// Where the overlay panel for `output_filename` is written.
pub fn overlay_artifact_path(output_filename: &str) -> String {
    let stem = Path::new(output_filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| output_filename.to_string());
    format!("{OUTPUT_DIR}/.overlay-{stem}.png")
}

fn image_to_video(p: &ImageToVideoParams, output: String) -> MediaResult<CommandPlan> {
    let canvas = p.canvas();
    let seconds = p.seconds_per_image();

    let mut cmd = FfmpegCommand::new();
    for image in &p.images {
        check_file_name("images", image)?;
        cmd = cmd.looped_image(input_path(image), seconds);
    }

    let args = cmd
        .filter_complex(filter_slideshow(p.images.len(), canvas, p.fps))
        .map("[v]")
        .frame_rate(p.fps)
        .h264()
        .output(output);

    Ok(CommandPlan {
        args,
        artifacts: Vec::new(),
    })
}

fn add_audio(p: &AddAudioParams, output: String) -> MediaResult<CommandPlan> {
    check_file_name("videoFile", &p.video_file)?;
    check_file_name("audioFile", &p.audio_file)?;

    let args = FfmpegCommand::new()
        .input(output_path(&p.video_file))
        .input(input_path(&p.audio_file))
        .filter_complex(filter_volume(p.volume))
        .map("0:v:0")
        .map("[a]")
        .video_codec("copy")
        .audio_codec(encoding::AUDIO_CODEC)
        .audio_bitrate(encoding::AUDIO_BITRATE)
        .shortest()
        .output(output);

    Ok(CommandPlan {
        args,
        artifacts: Vec::new(),
    })
}

fn apply_effects(p: &ApplyEffectsParams, output: String) -> MediaResult<CommandPlan> {
    check_file_name("videoFile", &p.video_file)?;

    let args = FfmpegCommand::new()
        .input(output_path(&p.video_file))
        .video_filter(filter_effect_chain(&p.effects))
        .h264()
        .audio_codec("copy")
        .output(output);

    Ok(CommandPlan {
        args,
        artifacts: Vec::new(),
    })
}

fn add_text_overlay(
    p: &TextOverlayParams,
    output_filename: &str,
    output: String,
    ctx: &BuildContext,
) -> MediaResult<CommandPlan> {
    check_file_name("videoFile", &p.video_file)?;

    let canvas = ctx.source_resolution.unwrap_or(VERTICAL_CANVAS);
    let rendered = render_overlay(p, canvas)?;
    let panel_path = overlay_artifact_path(output_filename);

    let args = FfmpegCommand::new()
        .input(output_path(&p.video_file))
        .input(panel_path.clone())
        .filter_complex(filter_overlay_top_left())
        .map("[v]")
        .map("0:a?")
        .h264()
        .audio_codec("copy")
        .output(output);

    Ok(CommandPlan {
        args,
        artifacts: vec![Artifact {
            path: panel_path,
            bytes: rendered.png,
        }],
    })
}

fn input_path(name: &str) -> String {
    format!("{INPUT_DIR}/{name}")
}

fn output_path(name: &str) -> String {
    format!("{OUTPUT_DIR}/{name}")
}

/// File references are bare names inside a session subdirectory.
fn check_file_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::invalid_value(field, "is required"));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(ValidationError::invalid_value(
            field,
            format!("'{}' must be a plain file name", name),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use serde_json::json;
    use vforge_models::Effect;

    fn request(operation: &str, params: serde_json::Value) -> OperationRequest {
        OperationRequest::from_parts(operation, Some(&params)).unwrap()
    }

    fn position(args: &[String], needle: &str) -> usize {
        args.iter()
            .position(|a| a == needle)
            .unwrap_or_else(|| panic!("{needle} missing from {args:?}"))
    }

    #[test]
    fn test_image_to_video_three_images() {
        let req = request(
            "image-to-video",
            json!({ "images": ["a.jpg", "b.jpg", "c.jpg"], "duration": 9, "fps": 30, "orientation": "vertical" }),
        );
        let plan = build_command(&req, "slides.mp4", &BuildContext::default()).unwrap();
        let args = &plan.args;

        assert!(plan.artifacts.is_empty());
        assert_eq!(
            &args[..18],
            [
                "-loop", "1", "-t", "3", "-i", "input/a.jpg",
                "-loop", "1", "-t", "3", "-i", "input/b.jpg",
                "-loop", "1", "-t", "3", "-i", "input/c.jpg",
            ]
        );
        assert_eq!(args.iter().filter(|a| *a == "-loop").count(), 3);

        let graph = &args[position(args, "-filter_complex") + 1];
        for i in 0..3 {
            assert!(graph.contains(&format!(
                "[{i}:v]scale=1080:1920:force_original_aspect_ratio=decrease,pad=1080:1920:"
            )));
        }
        assert!(graph.ends_with("[v0][v1][v2]concat=n=3:v=1:a=0[v]"));
        assert_eq!(args[position(args, "-map") + 1], "[v]");
        assert_eq!(args[position(args, "-r") + 1], "30");
        assert_eq!(args.last().unwrap(), "output/slides.mp4");
    }

    #[test]
    fn test_image_to_video_single_image_landscape() {
        let req = request(
            "image-to-video",
            json!({ "images": ["only.png"], "duration": 0.5, "orientation": "landscape" }),
        );
        let plan = build_command(&req, "one.mp4", &BuildContext::default()).unwrap();
        let args = &plan.args;

        assert_eq!(args[position(args, "-t") + 1], "1");
        let graph = &args[position(args, "-filter_complex") + 1];
        assert!(graph.starts_with("[0:v]scale=1920:1080"));
        assert!(!graph.contains("concat"));
    }

    #[test]
    fn test_image_to_video_resolution_override() {
        let req = request(
            "image-to-video",
            json!({ "images": ["a.png", "b.png"], "duration": 5, "resolution": "720x1280" }),
        );
        let plan = build_command(&req, "out.mp4", &BuildContext::default()).unwrap();
        let graph = &plan.args[position(&plan.args, "-filter_complex") + 1];
        assert!(graph.contains("scale=720:1280"));
        assert_eq!(plan.args[position(&plan.args, "-t") + 1], "2");
    }

    #[test]
    fn test_add_audio_volume() {
        let req = request(
            "add-audio",
            json!({ "videoFile": "slides.mp4", "audioFile": "music.mp3", "volume": 0.5 }),
        );
        let plan = build_command(&req, "with-audio.mp4", &BuildContext::default()).unwrap();
        let args = &plan.args;

        assert_eq!(args[position(args, "-filter_complex") + 1], "[1:a]volume=0.5[a]");
        assert_eq!(args[position(args, "-c:v") + 1], "copy");
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(args[1], "output/slides.mp4");
        assert_eq!(args[3], "input/music.mp3");
    }

    #[test]
    fn test_apply_effects_chain_order() {
        let req = request(
            "apply-effects",
            json!({
                "videoFile": "in.mp4",
                "effects": [{ "type": "kenburns", "direction": "zoom-out" }, { "type": "brightness", "value": 0.1 }]
            }),
        );
        let plan = build_command(&req, "fx.mp4", &BuildContext::default()).unwrap();
        let chain = &plan.args[position(&plan.args, "-vf") + 1];

        assert!(chain.starts_with("zoompan=z='if(lte(zoom,1.0),1.5,max(1.001,zoom-0.0015))'"));
        assert!(chain.ends_with(",eq=brightness=0.1"));
        assert_eq!(plan.args[position(&plan.args, "-c:a") + 1], "copy");
    }

    #[test]
    fn test_apply_effects_unknown_only_is_null() {
        let req = OperationRequest::ApplyEffects(ApplyEffectsParams {
            video_file: "in.mp4".to_string(),
            effects: vec![Effect::Unsupported],
        });
        let plan = build_command(&req, "fx.mp4", &BuildContext::default()).unwrap();
        assert_eq!(plan.args[position(&plan.args, "-vf") + 1], "null");
    }

    #[test]
    fn test_text_overlay_plan() {
        let req = request(
            "add-text-overlay",
            json!({ "videoFile": "base.mp4", "text": "Hello world", "subtitle": "Me" }),
        );
        let ctx = BuildContext::with_source_resolution(Some(Resolution::new(720, 1280)));
        let plan = build_command(&req, "final.mp4", &ctx).unwrap();
        let args = &plan.args;

        assert_eq!(plan.artifacts.len(), 1);
        assert_eq!(plan.artifacts[0].path, "output/.overlay-final.png");
        assert!(plan.artifacts[0].bytes.starts_with(b"\x89PNG"));
        assert_eq!(
            &args[..4],
            ["-i", "output/base.mp4", "-i", "output/.overlay-final.png"]
        );
        assert_eq!(
            args[position(args, "-filter_complex") + 1],
            "[0:v][1:v]overlay=0:0:format=auto[v]"
        );
        assert!(args.contains(&"0:a?".to_string()));
        assert_eq!(args[position(args, "-c:v") + 1], "libx264");
        assert_eq!(args[position(args, "-c:a") + 1], "copy");
    }

    #[test]
    fn test_build_is_pure() {
        let req = request(
            "add-text-overlay",
            json!({ "videoFile": "base.mp4", "text": "Same every time", "style": "banner", "position": "bottom" }),
        );
        let ctx = BuildContext::default();
        let first = build_command(&req, "x.mp4", &ctx).unwrap();
        let second = build_command(&req, "x.mp4", &ctx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_path_like_names() {
        let req = request("add-audio", json!({ "videoFile": "../etc/passwd", "audioFile": "a.mp3" }));
        let err = build_command(&req, "out.mp4", &BuildContext::default()).unwrap_err();
        assert!(err.is_validation());

        let req = request("add-audio", json!({ "videoFile": "v.mp4", "audioFile": "a.mp3" }));
        for bad in ["", "..", "sub/out.mp4"] {
            let err = build_command(&req, bad, &BuildContext::default()).unwrap_err();
            assert!(matches!(err, MediaError::Validation(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_invalid_params_rejected_before_building() {
        let req = OperationRequest::ImageToVideo(ImageToVideoParams {
            images: Vec::new(),
            duration: 3.0,
            fps: 30,
            orientation: Default::default(),
            resolution: None,
        });
        let err = build_command(&req, "out.mp4", &BuildContext::default()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_overlay_artifact_path() {
        assert_eq!(overlay_artifact_path("clip.final.mp4"), "output/.overlay-clip.final.png");
        assert_eq!(overlay_artifact_path("noext"), "output/.overlay-noext.png");
    }
}
