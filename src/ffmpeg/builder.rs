//! FFmpeg argument construction. Pure and deterministic: the same settings
//! and filenames always produce the same vector, and the displayed command
//! string is built from the exact vector handed to the engine.

use crate::settings::{EncodeSettings, MediaKind};

/// GIF targets ignore the resolution choice and use a fixed filter chain.
const GIF_FILTER_CHAIN: &str = "fps=10,scale=320:-1:flags=lanczos";

/// Shared argument prefix for every encode: overwrite, input, timestamp
/// regeneration, scaling, codec selection, and speed flags.
fn common_args(settings: &EncodeSettings, input_name: &str) -> Vec<String> {
    let format = settings.format;
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input_name.to_string(),
        "-fflags".to_string(),
        "+genpts".to_string(),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
    ];

    match format.kind() {
        MediaKind::Video => {
            if let Some(height) = settings.target_height {
                args.extend(["-vf".to_string(), format!("scale=-2:{}", height)]);
            }
            args.extend(["-c:v".to_string(), format.codec().to_string()]);
            if format.uses_vpx_speed_flags() {
                args.extend([
                    "-deadline".to_string(),
                    "realtime".to_string(),
                    "-cpu-used".to_string(),
                    "4".to_string(),
                ]);
            } else {
                args.extend(["-preset".to_string(), settings.preset.clone()]);
            }
        }
        MediaKind::Animation => {
            args.extend(["-vf".to_string(), GIF_FILTER_CHAIN.to_string()]);
        }
        MediaKind::Audio => {
            args.extend(["-c:a".to_string(), format.codec().to_string()]);
        }
    }

    args
}

/// Audio flags for a final pass: `-an` when muted, else the coerced codec.
fn push_audio_args(args: &mut Vec<String>, settings: &EncodeSettings) {
    match settings.effective_audio().ffmpeg_name() {
        None => args.push("-an".to_string()),
        Some(name) => args.extend(["-c:a".to_string(), name.to_string()]),
    }
}

/// Single-pass constant-quality command. Rate control is emitted for video
/// targets only; audio and GIF targets are driven by their codec defaults.
pub fn build_quality_args(
    settings: &EncodeSettings,
    input_name: &str,
    output_name: &str,
) -> Vec<String> {
    let mut args = common_args(settings, input_name);

    if settings.format.is_video() {
        push_audio_args(&mut args, settings);
        args.extend(["-crf".to_string(), settings.effective_crf().to_string()]);
        // libvpx-vp9 treats -crf as a ceiling unless bitrate is pinned to 0.
        if settings.format.codec() == "libvpx-vp9" {
            args.extend(["-b:v".to_string(), "0".to_string()]);
        }
    }

    args.push(output_name.to_string());

    log::debug!(
        target: "mediaconv::ffmpeg::builder",
        "quality args: format={}, crf={}, output={}",
        settings.format.id(),
        settings.effective_crf(),
        output_name
    );
    args
}

/// Statistics-gathering pass of a two-pass encode: audio disabled, output
/// discarded to a throwaway name.
pub fn build_pass1_args(
    settings: &EncodeSettings,
    input_name: &str,
    video_kbps: u32,
    null_output_name: &str,
) -> Vec<String> {
    let mut args = common_args(settings, input_name);
    args.extend([
        "-b:v".to_string(),
        format!("{}k", video_kbps),
        "-pass".to_string(),
        "1".to_string(),
        "-an".to_string(),
    ]);
    args.push(null_output_name.to_string());
    args
}

/// Final sized pass of a two-pass encode: explicit video and audio bitrates.
pub fn build_pass2_args(
    settings: &EncodeSettings,
    input_name: &str,
    output_name: &str,
    video_kbps: u32,
    audio_kbps: u32,
) -> Vec<String> {
    let mut args = common_args(settings, input_name);
    args.extend([
        "-b:v".to_string(),
        format!("{}k", video_kbps),
        "-pass".to_string(),
        "2".to_string(),
    ]);
    push_audio_args(&mut args, settings);
    if !settings.effective_audio().is_mute() {
        args.extend(["-b:a".to_string(), format!("{}k", audio_kbps)]);
    }
    args.push(output_name.to_string());

    log::debug!(
        target: "mediaconv::ffmpeg::builder",
        "pass2 args: format={}, video={}k, audio={}k, output={}",
        settings.format.id(),
        video_kbps,
        audio_kbps,
        output_name
    );
    args
}

/// Strip the audio track without re-encoding the video stream.
pub fn build_remove_audio_args(input_name: &str, output_name: &str) -> Vec<String> {
    vec![
        "-i".to_string(),
        input_name.to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-an".to_string(),
        output_name.to_string(),
    ]
}

/// Extract a segment by stream copy. `-ss` before `-i` for fast seeking,
/// `-to` is the end timestamp.
pub fn build_clip_args(
    input_name: &str,
    output_name: &str,
    start: &str,
    end: &str,
) -> Vec<String> {
    vec![
        "-ss".to_string(),
        start.to_string(),
        "-i".to_string(),
        input_name.to_string(),
        "-to".to_string(),
        end.to_string(),
        "-c".to_string(),
        "copy".to_string(),
        output_name.to_string(),
    ]
}

/// The command string shown to the user; truthful because it joins the exact
/// argument vector that will run.
pub fn display_command(args: &[String]) -> String {
    format!("ffmpeg {}", args.join(" "))
}

/// Formats args for readable logs: option and value on the same line when the
/// next arg is a value.
pub fn format_args_for_display_multiline(args: &[String]) -> String {
    if args.is_empty() {
        return String::new();
    }
    let mut lines = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let line = if arg.starts_with('-') && i + 1 < args.len() && !args[i + 1].starts_with('-') {
            let value = &args[i + 1];
            i += 2;
            format!("  {} {}", arg, value)
        } else {
            i += 1;
            format!("  {}", arg)
        };
        lines.push(line);
    }
    lines.join("\n")
}
