//! In-process image compression with the `image` crate.
//!
//! Decodes, optionally downscales so the longest side fits `max_dimension`, then re-encodes
//! as JPEG at decreasing quality until the result fits the size budget. The budget is a
//! target, not a guarantee: when no quality step fits, the smallest attempt is returned.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::error::AppError;
use crate::media::CompressionRequest;

/// Longest side passed when resolution must be kept. Large enough that real photos are
/// never downsampled.
pub const UNBOUNDED_IMAGE_DIMENSION: u32 = 10_000;
/// Longest side when the caller allows downscaling.
pub const DEFAULT_IMAGE_MAX_DIMENSION: u32 = 1920;

const QUALITY_STEPS: [u8; 11] = [92, 85, 78, 70, 62, 55, 47, 40, 32, 25, 20];

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageParams {
    pub target_size_mb: f64,
    pub max_dimension: u32,
}

impl ImageParams {
    pub fn from_request(request: &CompressionRequest) -> Self {
        Self {
            target_size_mb: request.target_size_mb,
            max_dimension: if request.preserve_resolution {
                UNBOUNDED_IMAGE_DIMENSION
            } else {
                DEFAULT_IMAGE_MAX_DIMENSION
            },
        }
    }

    pub fn target_size_bytes(&self) -> usize {
        (self.target_size_mb * 1024.0 * 1024.0).floor() as usize
    }
}

/// Compress `input` towards `params`. `progress` receives fractions in [0,1].
pub fn compress_image_bytes(
    input: &[u8],
    params: &ImageParams,
    progress: impl Fn(f64),
) -> Result<Vec<u8>, AppError> {
    let img = image::load_from_memory(input)?;
    let (width, height) = img.dimensions();
    let budget = params.target_size_bytes();
    let needs_resize = width > params.max_dimension || height > params.max_dimension;

    log::debug!(
        target: "fit_size::engine::image",
        "Image {}x{}, {} bytes, budget {} bytes, max dimension {}",
        width,
        height,
        input.len(),
        budget,
        params.max_dimension
    );

    if !needs_resize && input.len() <= budget {
        progress(1.0);
        return Ok(input.to_vec());
    }

    let working = if needs_resize {
        let resized = img.resize(params.max_dimension, params.max_dimension, FilterType::Lanczos3);
        log::debug!(
            target: "fit_size::engine::image",
            "Resized to {}x{}",
            resized.width(),
            resized.height()
        );
        resized
    } else {
        img
    };
    let rgb = DynamicImage::ImageRgb8(working.to_rgb8());
    progress(0.1);

    let mut smallest: Option<Vec<u8>> = None;
    for (step, &quality) in QUALITY_STEPS.iter().enumerate() {
        let encoded = encode_jpeg(&rgb, quality)?;
        progress(0.1 + 0.9 * (step + 1) as f64 / QUALITY_STEPS.len() as f64);
        if encoded.len() <= budget {
            log::debug!(
                target: "fit_size::engine::image",
                "Quality {} fits: {} bytes",
                quality,
                encoded.len()
            );
            progress(1.0);
            return Ok(encoded);
        }
        if smallest.as_ref().is_none_or(|s| encoded.len() < s.len()) {
            smallest = Some(encoded);
        }
    }

    progress(1.0);
    let best = smallest.unwrap_or_default();
    log::warn!(
        target: "fit_size::engine::image",
        "No quality step fits {} bytes; returning smallest attempt ({} bytes)",
        budget,
        best.len()
    );
    Ok(best)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, AppError> {
    let mut output = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut output, quality);
    img.write_with_encoder(encoder)?;
    Ok(output.into_inner())
}
