//! Bitrate budgeting for two-pass size-targeted encodes.

use serde::Serialize;

/// 1 MB = 8192 kilobits; byte/bit convention used throughout the crate.
pub const KILOBITS_PER_MB: f64 = 8192.0;

/// Fraction of the available bitrate handed to the video track; the
/// remaining 5% is reserved for container/stream overhead.
const VIDEO_SHARE: f64 = 0.95;

/// Per-track bitrate targets for a two-pass encode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BitrateBudget {
    /// Video bitrate in kbps, never below the caller's floor.
    pub video_target_kbps: u32,
    /// Smallest output the floors allow, in megabytes.
    pub min_possible_mb: f64,
    /// Advisory: the target cannot be met without dropping below a floor.
    /// The budget is still usable; the encode will overshoot the target.
    pub impossible: bool,
}

/// Split a size budget into per-track bitrates. A non-positive duration
/// yields the degenerate all-zero budget.
pub fn allocate_bitrate(
    target_mb: f64,
    duration_secs: f64,
    audio_kbps: u32,
    video_floor_kbps: u32,
) -> BitrateBudget {
    if duration_secs <= 0.0 {
        return BitrateBudget {
            video_target_kbps: 0,
            min_possible_mb: 0.0,
            impossible: false,
        };
    }

    let available_kbps = target_mb * KILOBITS_PER_MB / duration_secs;
    let raw_video_target = ((available_kbps - audio_kbps as f64) * VIDEO_SHARE).floor();
    let video_target_kbps = raw_video_target.max(video_floor_kbps as f64) as u32;

    let min_total_kbps = (video_floor_kbps + audio_kbps) as f64;
    let min_possible_mb = min_total_kbps * duration_secs / KILOBITS_PER_MB;

    let budget = BitrateBudget {
        video_target_kbps,
        min_possible_mb,
        impossible: target_mb < min_possible_mb,
    };
    log::debug!(
        target: "mediaconv::ffmpeg::budget",
        "budget: target={}MB over {}s, audio={}k -> video={}k (min {:.2}MB, impossible={})",
        target_mb,
        duration_secs,
        audio_kbps,
        budget.video_target_kbps,
        budget.min_possible_mb,
        budget.impossible
    );
    budget
}
