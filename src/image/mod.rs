//! Image conversion pipeline: per-format codec engines, encode settings,
//! and the single-image conversion entry point.

pub mod search;

use serde::{Deserialize, Serialize};

use crate::engine::{DiagnosticEvent, DiagnosticSink, emit};
use crate::error::ConvertError;
use crate::settings::ControlMode;

use search::{SearchParams, SearchOutcome, search_quality_for_size};

/// Supported still-image target formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Avif,
    Jxl,
}

impl ImageFormat {
    pub fn ext(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
            ImageFormat::Jxl => "jxl",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Webp => "WebP",
            ImageFormat::Avif => "AVIF",
            ImageFormat::Jxl => "JPEG XL",
        }
    }

    /// Lossless formats ignore the quality knob, so size search cannot
    /// steer them.
    pub fn is_lossless(&self) -> bool {
        matches!(self, ImageFormat::Png)
    }

    /// Encoder effort hint, for codecs that take one. AVIF is slow enough
    /// at default effort that interactive use needs it dialed down.
    pub fn speed_hint(&self) -> Option<u32> {
        match self {
            ImageFormat::Avif => Some(4),
            _ => None,
        }
    }
}

/// Decoded raster: tightly packed 8-bit RGBA rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Knobs for one encode call.
#[derive(Debug, Clone, Copy)]
pub struct ImageEncodeOptions {
    /// 0-100. Ignored by lossless codecs.
    pub quality: u32,
    pub speed_hint: Option<u32>,
}

/// Asynchronous codec for one target format. One instance per format,
/// lazily initialized and shared; encode calls must be issued sequentially.
#[allow(async_fn_in_trait)]
pub trait ImageCodecEngine {
    fn format(&self) -> ImageFormat;

    async fn decode(&self, bytes: &[u8]) -> Result<PixelImage, ConvertError>;

    async fn encode(
        &self,
        image: &PixelImage,
        options: ImageEncodeOptions,
    ) -> Result<Vec<u8>, ConvertError>;
}

/// User settings for one image conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageEncodeSettings {
    pub format: ImageFormat,
    pub mode: ControlMode,
    /// 0-100, quality mode only.
    pub quality: u32,
    /// Size mode target, kilobytes.
    pub target_kb: u32,
    /// Acceptance band below target, percent of target.
    pub slack_percent: u32,
    /// Size-mode search budget.
    pub iterations: u32,
}

impl Default for ImageEncodeSettings {
    fn default() -> Self {
        Self {
            format: ImageFormat::Webp,
            mode: ControlMode::Quality,
            quality: 75,
            target_kb: 500,
            slack_percent: 5,
            iterations: 10,
        }
    }
}

impl ImageEncodeSettings {
    pub fn effective_quality(&self) -> u32 {
        self.quality.min(100)
    }

    pub fn effective_slack(&self) -> u32 {
        self.slack_percent.clamp(1, 50)
    }

    pub fn effective_iterations(&self) -> u32 {
        self.iterations.clamp(5, 20)
    }

    /// Size search needs a quality knob; lossless targets fall back to
    /// quality mode.
    pub fn effective_mode(&self) -> ControlMode {
        if self.format.is_lossless() {
            ControlMode::Quality
        } else {
            self.mode
        }
    }
}

/// Result of one image conversion.
#[derive(Debug)]
pub struct ImageOutput {
    pub suggested_name: String,
    pub bytes: Vec<u8>,
    /// Quality the bytes were encoded at.
    pub quality: u32,
    /// Size mode only: the target could not be met even at quality 0.
    pub degraded: bool,
}

fn stem_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Convert one image through `codec`: decode, then either a single encode at
/// the requested quality or a size-targeting quality search.
pub async fn convert_image<C: ImageCodecEngine>(
    codec: &C,
    settings: &ImageEncodeSettings,
    input_name: &str,
    input_bytes: &[u8],
    sink: Option<&DiagnosticSink>,
) -> Result<ImageOutput, ConvertError> {
    let format = codec.format();
    if format != settings.format {
        return Err(ConvertError::UnsupportedFormat(format!(
            "codec encodes {} but settings ask for {}",
            format.label(),
            settings.format.label()
        )));
    }

    let image = codec.decode(input_bytes).await?;
    let suggested_name = format!("{}_conv.{}", stem_of(input_name), format.ext());

    match settings.effective_mode() {
        ControlMode::Quality => {
            let quality = settings.effective_quality();
            emit(
                sink,
                DiagnosticEvent::info(format!(
                    "Encoding {} at quality {}",
                    format.label(),
                    quality
                )),
            );
            let bytes = codec
                .encode(
                    &image,
                    ImageEncodeOptions {
                        quality,
                        speed_hint: format.speed_hint(),
                    },
                )
                .await?;
            Ok(ImageOutput {
                suggested_name,
                bytes,
                quality,
                degraded: false,
            })
        }
        ControlMode::Size => {
            let target_bytes = settings.target_kb as u64 * 1024;
            emit(
                sink,
                DiagnosticEvent::info(format!(
                    "Searching {} quality for target {} KB",
                    format.label(),
                    settings.target_kb
                )),
            );
            let params = SearchParams {
                target_bytes,
                slack_percent: settings.effective_slack(),
                iterations: settings.effective_iterations(),
                speed_hint: format.speed_hint(),
            };
            let SearchOutcome {
                quality,
                bytes,
                degraded,
                ..
            } = search_quality_for_size(codec, &image, params, sink).await?;
            if degraded {
                emit(
                    sink,
                    DiagnosticEvent::info(format!(
                        "Target {} KB unreachable, emitted quality 0 ({} bytes)",
                        settings.target_kb,
                        bytes.len()
                    )),
                );
            }
            Ok(ImageOutput {
                suggested_name,
                bytes,
                quality,
                degraded,
            })
        }
    }
}
