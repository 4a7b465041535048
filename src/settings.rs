//! Conversion settings: output format table, audio codec choices, and the
//! user-facing knobs for quality and size-targeted encodes.

use serde::{Deserialize, Serialize};

/// Media kind of an output format, decides how the command is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    /// Animated image targets (GIF). Video input, fixed filter chain, no
    /// audio and no rate control.
    Animation,
}

struct FormatRow {
    id: &'static str,
    label: &'static str,
    ext: &'static str,
    kind: MediaKind,
    codec: &'static str,
}

macro_rules! format_table {
    (
        $( [$variant:ident, $id:expr, $label:expr, $ext:expr, $kind:expr, $codec:expr] ),* $(,)?
    ) => {
        /// Target container/codec choice, one row per entry the converter offers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum OutputFormat {
            $( #[serde(rename = $id)] $variant ),*
        }

        const FORMAT_TABLE: &[(OutputFormat, FormatRow)] = &[
            $( (OutputFormat::$variant, FormatRow {
                id: $id,
                label: $label,
                ext: $ext,
                kind: $kind,
                codec: $codec,
            }) ),*
        ];
    };
}

format_table!(
    [Mp4H264, "mp4-x264", "MP4 (H.264)", "mp4", MediaKind::Video, "libx264"],
    [Mp4H265, "mp4-x265", "MP4 (H.265)", "mp4", MediaKind::Video, "libx265"],
    [WebmVp8, "webm-vp8", "WebM (VP8)", "webm", MediaKind::Video, "libvpx"],
    [WebmVp9, "webm-vp9", "WebM (VP9)", "webm", MediaKind::Video, "libvpx-vp9"],
    [Mp3, "mp3", "MP3 (Audio Only)", "mp3", MediaKind::Audio, "libmp3lame"],
    [Aac, "aac", "AAC (Audio Only)", "m4a", MediaKind::Audio, "aac"],
    [Wav, "wav", "WAV (Audio Only)", "wav", MediaKind::Audio, "pcm_s16le"],
    [Gif, "gif", "GIF (Anim)", "gif", MediaKind::Animation, "gif"],
);

impl OutputFormat {
    fn row(self) -> &'static FormatRow {
        // The table is built from the same macro as the enum, so lookup
        // cannot miss.
        &FORMAT_TABLE
            .iter()
            .find(|(f, _)| *f == self)
            .expect("format missing from FORMAT_TABLE")
            .1
    }

    pub fn from_id(id: &str) -> Option<Self> {
        FORMAT_TABLE
            .iter()
            .find(|(_, row)| row.id == id)
            .map(|(f, _)| *f)
    }

    pub fn id(self) -> &'static str {
        self.row().id
    }

    pub fn label(self) -> &'static str {
        self.row().label
    }

    pub fn ext(self) -> &'static str {
        self.row().ext
    }

    pub fn kind(self) -> MediaKind {
        self.row().kind
    }

    /// Encoder passed to `-c:v` (video) or `-c:a` (audio targets).
    pub fn codec(self) -> &'static str {
        self.row().codec
    }

    pub fn is_video(self) -> bool {
        self.kind() == MediaKind::Video
    }

    /// Two-pass size targeting applies to real video targets only; GIF and
    /// audio formats always run in quality mode.
    pub fn supports_size_mode(self) -> bool {
        self.is_video()
    }

    /// libvpx family replaces `-preset` with a fixed realtime deadline pair.
    pub fn uses_vpx_speed_flags(self) -> bool {
        matches!(self, OutputFormat::WebmVp8 | OutputFormat::WebmVp9)
    }
}

/// Audio track handling for video targets. `Mute` drops the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    #[serde(rename = "libmp3lame")]
    Mp3,
    #[serde(rename = "libopus")]
    Opus,
    #[serde(rename = "libvorbis")]
    Vorbis,
    #[serde(rename = "none")]
    Mute,
}

impl AudioCodec {
    /// Encoder name for `-c:a`, or None when muted.
    pub fn ffmpeg_name(self) -> Option<&'static str> {
        match self {
            AudioCodec::Aac => Some("aac"),
            AudioCodec::Mp3 => Some("libmp3lame"),
            AudioCodec::Opus => Some("libopus"),
            AudioCodec::Vorbis => Some("libvorbis"),
            AudioCodec::Mute => None,
        }
    }

    pub fn is_mute(self) -> bool {
        self == AudioCodec::Mute
    }

    /// Container compatibility: WebM cannot carry AAC/MP3, MP4 cannot carry
    /// Opus/Vorbis. Incompatible choices snap to the container default.
    pub fn coerced_for(self, format: OutputFormat) -> Self {
        match format.ext() {
            "webm" => match self {
                AudioCodec::Aac | AudioCodec::Mp3 => AudioCodec::Opus,
                other => other,
            },
            "mp4" => match self {
                AudioCodec::Opus | AudioCodec::Vorbis => AudioCodec::Aac,
                other => other,
            },
            _ => self,
        }
    }
}

/// Rate-control mode: direct quality knob or a target output size the
/// system approximates algorithmically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    Quality,
    Size,
}

/// Settings for one video/audio conversion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncodeSettings {
    pub format: OutputFormat,
    /// Output height in pixels; None keeps the source resolution.
    pub target_height: Option<u32>,
    pub audio: AudioCodec,
    /// Named encoder preset (x264-style). Ignored for the libvpx family.
    pub preset: String,
    pub mode: ControlMode,
    /// Constant-quality parameter, clamped to 18-51.
    pub crf: u32,
    /// Size mode: target output size in megabytes.
    pub target_mb: f64,
    /// Size mode: audio bitrate in kbps (also the audio floor).
    pub audio_kbps: u32,
    /// Size mode: minimum acceptable video bitrate in kbps.
    pub video_floor_kbps: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Mp4H264,
            target_height: None,
            audio: AudioCodec::Aac,
            preset: "superfast".to_string(),
            mode: ControlMode::Quality,
            crf: 23,
            target_mb: 10.0,
            audio_kbps: 128,
            video_floor_kbps: 50,
        }
    }
}

impl EncodeSettings {
    pub fn effective_crf(&self) -> u32 {
        self.crf.clamp(18, 51)
    }

    /// Audio codec after container-compatibility coercion.
    pub fn effective_audio(&self) -> AudioCodec {
        self.audio.coerced_for(self.format)
    }

    /// Audio bitrate that enters the size budget; 0 when muted.
    pub fn effective_audio_kbps(&self) -> u32 {
        if self.effective_audio().is_mute() {
            0
        } else {
            self.audio_kbps
        }
    }

    /// Size mode only applies where the format supports it; everything else
    /// falls back to quality mode.
    pub fn effective_mode(&self) -> ControlMode {
        if self.mode == ControlMode::Size && !self.format.supports_size_mode() {
            ControlMode::Quality
        } else {
            self.mode
        }
    }
}
