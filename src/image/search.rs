//! Quality search for size-targeted image encodes.
//!
//! Binary search over integer quality in [0, 100]. Every probe is a real
//! encode through the codec, so the iteration cap is also the encode budget;
//! the quality-0 fallback is the single extra call that can push the total
//! to `iterations + 1`. The search never returns bytes over the target:
//! an overshooting trial only narrows the range.

use crate::engine::{DiagnosticEvent, DiagnosticSink, emit};
use crate::error::ConvertError;

use super::{ImageCodecEngine, ImageEncodeOptions, PixelImage};

/// One probe of the search: quality tried, bytes produced, whether the
/// result landed at or under the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTrial {
    pub quality: u32,
    pub size: u64,
    pub accepted: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub target_bytes: u64,
    /// Acceptance band below target, percent of target.
    pub slack_percent: u32,
    /// Maximum probe encodes.
    pub iterations: u32,
    pub speed_hint: Option<u32>,
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub quality: u32,
    pub bytes: Vec<u8>,
    /// True when even quality 0 overshot the target.
    pub degraded: bool,
    pub trials: Vec<SearchTrial>,
}

/// Find the highest quality whose encoded size fits `params.target_bytes`.
///
/// Accepts immediately once a trial lands inside the slack band below the
/// target; otherwise returns the largest at-or-under-target trial seen, or
/// a quality-0 encode flagged `degraded` when nothing fits.
pub async fn search_quality_for_size<C: ImageCodecEngine>(
    codec: &C,
    image: &PixelImage,
    params: SearchParams,
    sink: Option<&DiagnosticSink>,
) -> Result<SearchOutcome, ConvertError> {
    let target = params.target_bytes;
    let slack_bytes = target as f64 * params.slack_percent as f64 / 100.0;

    let mut min_q: u32 = 0;
    let mut max_q: u32 = 100;
    let mut best: Option<(u32, Vec<u8>)> = None;
    let mut trials = Vec::new();

    for _ in 0..params.iterations {
        if max_q - min_q < 1 {
            break;
        }
        let mid = ((min_q + max_q) as f64 / 2.0).round() as u32;
        let encoded = codec
            .encode(
                image,
                ImageEncodeOptions {
                    quality: mid,
                    speed_hint: params.speed_hint,
                },
            )
            .await?;
        let size = encoded.len() as u64;
        let accepted = size <= target;
        trials.push(SearchTrial {
            quality: mid,
            size,
            accepted,
        });
        emit(
            sink,
            DiagnosticEvent::info(format!(
                "Trial q={}: {} bytes (target {})",
                mid, size, target
            )),
        );
        log::debug!(
            target: "mediaconv::image::search",
            "trial q={} size={} target={} range=[{}, {}]",
            mid,
            size,
            target,
            min_q,
            max_q
        );

        if size > target {
            max_q = mid;
            continue;
        }

        if ((target - size) as f64) < slack_bytes {
            return Ok(SearchOutcome {
                quality: mid,
                bytes: encoded,
                degraded: false,
                trials,
            });
        }
        if best.as_ref().map_or(true, |(_, b)| size > b.len() as u64) {
            best = Some((mid, encoded));
        }
        min_q = mid;
    }

    if let Some((quality, bytes)) = best {
        return Ok(SearchOutcome {
            quality,
            bytes,
            degraded: false,
            trials,
        });
    }

    // Nothing fit. Emit the smallest the codec can do and flag it.
    let bytes = codec
        .encode(
            image,
            ImageEncodeOptions {
                quality: 0,
                speed_hint: params.speed_hint,
            },
        )
        .await?;
    trials.push(SearchTrial {
        quality: 0,
        size: bytes.len() as u64,
        accepted: false,
    });
    Ok(SearchOutcome {
        quality: 0,
        bytes,
        degraded: true,
        trials,
    })
}
