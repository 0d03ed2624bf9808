//! Encoder parameter derivation: target video bitrate from a size budget, and the
//! pass-through/down-scale decision.
//!
//! Both functions are pure. The bitrate math targets the size budget only approximately:
//! the codec's output size is roughly proportional to the requested bitrate, so the plan
//! leaves a margin instead of re-encoding to converge on an exact byte count.

/// Audio allocation reserved from the size budget, in bits per second.
pub const AUDIO_BITRATE_BPS: u64 = 128_000;
/// Multiplier applied to the computed video bitrate to bias towards undershooting.
pub const SAFETY_MARGIN: f64 = 0.95;
/// Substituted when the computed bitrate is not a finite positive number.
pub const FALLBACK_VIDEO_BITRATE_BPS: u64 = 1_000_000;
/// Hard floor for any requested video bitrate.
pub const MIN_VIDEO_BITRATE_BPS: u64 = 100_000;
/// Bounding box applied when the caller allows down-scaling.
pub const MAX_WIDTH: u32 = 1920;
pub const MAX_HEIGHT: u32 = 1080;

const BITS_PER_MB: f64 = 1024.0 * 1024.0 * 8.0;

/// Target video bitrate (bits/s) for a size budget and a media duration.
///
/// Always returns an integer >= [`MIN_VIDEO_BITRATE_BPS`]. When the naive computation is
/// negative or not finite (audio alone exceeds the budget, pathological duration) the
/// result is exactly [`FALLBACK_VIDEO_BITRATE_BPS`]. The fallback keeps the job running
/// rather than failing it; it does not guarantee the size budget is met.
pub fn plan_video_bitrate(target_size_mb: f64, duration_seconds: f64) -> u64 {
    let target_bits = target_size_mb * BITS_PER_MB;
    let audio_bits = AUDIO_BITRATE_BPS as f64 * duration_seconds;
    let video_bits = target_bits - audio_bits;
    let bitrate = video_bits / duration_seconds * SAFETY_MARGIN;

    let bitrate = if bitrate.is_finite() && bitrate > 0.0 {
        bitrate
    } else {
        log::warn!(
            target: "fit_size::plan",
            "Bitrate computation was degenerate (bitrate={}, video_bits={}, duration={}); using fallback {}",
            bitrate,
            video_bits,
            duration_seconds,
            FALLBACK_VIDEO_BITRATE_BPS
        );
        FALLBACK_VIDEO_BITRATE_BPS as f64
    };

    (bitrate.floor() as u64).max(MIN_VIDEO_BITRATE_BPS)
}

/// Maximum output box; the source is fitted inside with its aspect ratio kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub max_width: u32,
    pub max_height: u32,
}

impl BoundingBox {
    /// Output dimensions of `width`x`height` fitted inside the box, rounded down to even
    /// values (required by 4:2:0 encoders). Never upscales.
    pub fn fit(&self, width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (width, height);
        }
        if width <= self.max_width && height <= self.max_height {
            return (width, height);
        }
        let ratio = (self.max_width as f64 / width as f64).min(self.max_height as f64 / height as f64);
        let fitted_w = (width as f64 * ratio).floor() as u32;
        let fitted_h = (height as f64 * ratio).floor() as u32;
        (ensure_even(fitted_w), ensure_even(fitted_h))
    }
}

fn ensure_even(value: u32) -> u32 {
    let adjusted = value - (value % 2);
    if adjusted == 0 { 2 } else { adjusted }
}

/// `None` means pass through at the source resolution.
///
/// With `preserve_resolution` the source is never scaled, even if the size target then
/// becomes harder to meet. Otherwise sources larger than 1920x1080 in either dimension get
/// the 1920x1080 box; smaller sources are left alone.
pub fn plan_scale(source_width: u32, source_height: u32, preserve_resolution: bool) -> Option<BoundingBox> {
    if preserve_resolution {
        return None;
    }
    if source_width > MAX_WIDTH || source_height > MAX_HEIGHT {
        Some(BoundingBox {
            max_width: MAX_WIDTH,
            max_height: MAX_HEIGHT,
        })
    } else {
        None
    }
}

/// Fully resolved parameters for one video encode. Built once per job.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodePlan {
    pub video_bitrate_bps: u64,
    pub audio_bitrate_bps: u64,
    pub scale: Option<BoundingBox>,
    /// Even output dimensions when `scale` applies.
    pub output_size: Option<(u32, u32)>,
    pub duration_seconds: f64,
}

impl EncodePlan {
    pub fn build(
        target_size_mb: f64,
        duration_seconds: f64,
        width: u32,
        height: u32,
        preserve_resolution: bool,
    ) -> Self {
        let scale = plan_scale(width, height, preserve_resolution);
        Self {
            video_bitrate_bps: plan_video_bitrate(target_size_mb, duration_seconds),
            audio_bitrate_bps: AUDIO_BITRATE_BPS,
            scale,
            output_size: scale.map(|bbox| bbox.fit(width, height)),
            duration_seconds,
        }
    }
}
