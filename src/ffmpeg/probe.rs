//! Metadata extraction from the engine's diagnostic log stream.
//!
//! One diagnostic run over an input emits banner lines; the probe collects
//! them through a scoped log subscription and pattern-matches duration,
//! overall bitrate, and the audio stream. Probing never fails a job:
//! unmatched patterns (and a nonzero diagnostic exit, which is expected
//! when no output is given) degrade to zero/empty defaults.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;

use crate::engine::{EngineEvent, EventKind, ExecutionEngine, Subscription};
use crate::error::ConvertError;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration: (\d+):(\d+):(\d+\.\d+)").expect("invalid duration regex")
});
static TOTAL_BITRATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bitrate: (\d+) kb/s").expect("invalid bitrate regex"));
static KBPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) kb/s").expect("invalid kbps regex"));

const AUDIO_MARKER: &str = "Audio:";

/// Facts about one input file. Created empty on file selection, populated
/// once by a probe, re-probed only when the input identity changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Seconds; 0 if unknown.
    pub duration: f64,
    /// Container bitrate in kbps; 0 if unknown.
    pub total_bitrate_kbps: u32,
    pub audio_codec: Option<String>,
    /// Bitrate of the audio stream in kbps; 0 if unknown.
    pub audio_bitrate_kbps: u32,
    pub has_audio: bool,
}

/// Fold one diagnostic line into the metadata under construction.
fn apply_line(meta: &mut FileMetadata, line: &str) {
    if let Some(caps) = DURATION_RE.captures(line) {
        let hours: f64 = caps[1].parse().unwrap_or(0.0);
        let minutes: f64 = caps[2].parse().unwrap_or(0.0);
        let seconds: f64 = caps[3].parse().unwrap_or(0.0);
        meta.duration = hours * 3600.0 + minutes * 60.0 + seconds;
    }

    if let Some(caps) = TOTAL_BITRATE_RE.captures(line) {
        meta.total_bitrate_kbps = caps[1].parse().unwrap_or(0);
    }

    if let Some(rest) = line.split(AUDIO_MARKER).nth(1) {
        meta.has_audio = true;
        let codec = rest
            .split(',')
            .next()
            .and_then(|part| part.split_whitespace().next())
            .map(str::to_string);
        if codec.is_some() {
            meta.audio_codec = codec;
        }
        // Match kb/s on the audio-stream line only, so the container's
        // overall bitrate is never mistaken for the audio bitrate.
        if let Some(caps) = KBPS_RE.captures(rest) {
            meta.audio_bitrate_kbps = caps[1].parse().unwrap_or(0);
        }
    }
}

/// Parse a full diagnostic log into metadata.
pub fn parse_probe_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> FileMetadata {
    let mut meta = FileMetadata::default();
    for line in lines {
        apply_line(&mut meta, line);
    }
    meta
}

/// Arguments for the diagnostic run. No output file: the engine dumps the
/// input banner and exits nonzero, which the probe swallows.
pub fn probe_args(input_name: &str) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-i".to_string(),
        input_name.to_string(),
    ]
}

/// Run one diagnostic pass over an already-staged input and parse the log.
pub async fn probe_file<E: ExecutionEngine>(engine: &E, input_name: &str) -> FileMetadata {
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let collected = Arc::clone(&lines);
    let result = {
        let _sub = Subscription::attach(
            engine,
            EventKind::Log,
            Arc::new(move |event| {
                if let EngineEvent::Log { message } = event {
                    collected.lock().push(message.clone());
                }
            }),
        );
        engine.exec(&probe_args(input_name)).await
    };
    if let Err(e) = result {
        log::debug!(
            target: "mediaconv::ffmpeg::probe",
            "diagnostic run for {} exited nonzero (expected): {}",
            input_name,
            e
        );
    }

    let lines = lines.lock();
    let meta = parse_probe_lines(lines.iter().map(String::as_str));
    log::debug!(
        target: "mediaconv::ffmpeg::probe",
        "{}: duration={}s, bitrate={}k, audio={:?}",
        input_name,
        meta.duration,
        meta.total_bitrate_kbps,
        meta.audio_codec
    );
    meta
}

/// Probe results keyed by input identity (name plus byte length). Each
/// distinct input is probed at most once; re-selecting it reuses the cache.
#[derive(Default)]
pub struct ProbeCache {
    entries: Mutex<HashMap<String, FileMetadata>>,
}

fn identity_key(input_name: &str, len: usize) -> String {
    format!("{}:{}", input_name, len)
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, input_name: &str, len: usize) -> Option<FileMetadata> {
        self.entries.lock().get(&identity_key(input_name, len)).cloned()
    }

    /// Stage the input, probe it, and cache the result. The staged copy is
    /// removed best-effort afterwards; only the staging write can fail.
    pub async fn get_or_probe<E: ExecutionEngine>(
        &self,
        engine: &E,
        input_name: &str,
        bytes: &[u8],
    ) -> Result<FileMetadata, ConvertError> {
        if let Some(meta) = self.get(input_name, bytes.len()) {
            return Ok(meta);
        }

        engine.write_file(input_name, bytes).await?;
        let meta = probe_file(engine, input_name).await;
        let _ = engine.delete_file(input_name).await;

        self.entries
            .lock()
            .insert(identity_key(input_name, bytes.len()), meta.clone());
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_line_converts_to_seconds() {
        let meta = parse_probe_lines(["  Duration: 00:01:30.50, start: 0.000000"]);
        assert_eq!(meta.duration, 90.5);
    }

    #[test]
    fn duration_with_hours() {
        let meta = parse_probe_lines(["  Duration: 01:02:03.00, start: 0.000000"]);
        assert_eq!(meta.duration, 3723.0);
    }

    #[test]
    fn overall_bitrate_parsed_from_duration_line() {
        let meta =
            parse_probe_lines(["  Duration: 00:00:10.00, start: 0.000000, bitrate: 1024 kb/s"]);
        assert_eq!(meta.total_bitrate_kbps, 1024);
    }

    #[test]
    fn audio_line_yields_codec_and_bitrate() {
        let meta = parse_probe_lines(["  Stream #0:1[0x2](und): Audio: aac, 128 kb/s"]);
        assert!(meta.has_audio);
        assert_eq!(meta.audio_codec.as_deref(), Some("aac"));
        assert_eq!(meta.audio_bitrate_kbps, 128);
    }

    #[test]
    fn audio_codec_strips_profile_annotation() {
        let meta = parse_probe_lines([
            "  Stream #0:1: Audio: aac (LC) (mp4a / 0x6134706D), 44100 Hz, stereo, fltp, 132 kb/s",
        ]);
        assert_eq!(meta.audio_codec.as_deref(), Some("aac"));
        assert_eq!(meta.audio_bitrate_kbps, 132);
    }

    #[test]
    fn container_bitrate_not_mistaken_for_audio_bitrate() {
        let meta = parse_probe_lines([
            "  Duration: 00:00:30.00, start: 0.000000, bitrate: 5000 kb/s",
            "  Stream #0:0: Video: h264, yuv420p, 1920x1080",
        ]);
        assert_eq!(meta.total_bitrate_kbps, 5000);
        assert!(!meta.has_audio);
        assert_eq!(meta.audio_bitrate_kbps, 0);
    }

    #[test]
    fn unmatched_lines_leave_defaults() {
        let meta = parse_probe_lines(["random garbage", "out_time_ms=100"]);
        assert_eq!(meta, FileMetadata::default());
    }

    #[test]
    fn video_only_stream_has_no_audio() {
        let meta = parse_probe_lines([
            "  Duration: 00:00:05.00",
            "  Stream #0:0: Video: vp9, yuv420p, 1280x720",
        ]);
        assert_eq!(meta.duration, 5.0);
        assert!(!meta.has_audio);
        assert_eq!(meta.audio_codec, None);
    }
}
