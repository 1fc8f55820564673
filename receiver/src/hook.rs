use std::sync::Arc;

use image::{Pixel, Rgb, RgbImage};

use crate::decoder::DecodedImage;

/// Image derived from a decoded frame by a [`ProcessingHook`].
pub type ProcessedImage = RgbImage;

/// Per-frame transform run by the receiver after decoding (depth estimation
/// in the camera rig, but anything image-to-image fits).
///
/// Called from a blocking worker thread, one frame at a time, and never while
/// the frame buffer is locked.
pub trait ProcessingHook: Send + Sync {
    fn process(&self, image: &DecodedImage) -> Result<ProcessedImage, ProcessingError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("processing failed: {0}")]
    Failed(String),
}

/// Look up one of the built-in hooks by its config name.
pub fn hook_by_name(name: &str) -> Option<Arc<dyn ProcessingHook>> {
    match name {
        "colormap" => Some(Arc::new(ColormapHook)),
        "identity" => Some(Arc::new(IdentityHook)),
        _ => None,
    }
}

/// Min-max normalised luminance rendered through a magma-like ramp. Stands
/// in for a depth model's output visualisation.
pub struct ColormapHook;

impl ProcessingHook for ColormapHook {
    fn process(&self, image: &DecodedImage) -> Result<ProcessedImage, ProcessingError> {
        ensure_not_empty(image)?;

        let luma: Vec<u8> = image.pixels().map(|p| p.to_luma().0[0]).collect();
        let min = luma.iter().copied().min().unwrap_or(0);
        let max = luma.iter().copied().max().unwrap_or(0);
        let range = (max - min) as u32;

        let lut: Vec<Rgb<u8>> = (0..=255u8).map(magma).collect();
        let (width, height) = image.dimensions();
        let mut out = RgbImage::new(width, height);
        for (dst, &value) in out.pixels_mut().zip(luma.iter()) {
            let level = if range == 0 {
                0
            } else {
                ((value - min) as u32 * 255 / range) as usize
            };
            *dst = lut[level];
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "colormap"
    }
}

pub struct IdentityHook;

impl ProcessingHook for IdentityHook {
    fn process(&self, image: &DecodedImage) -> Result<ProcessedImage, ProcessingError> {
        ensure_not_empty(image)?;
        Ok(image.clone())
    }

    fn name(&self) -> &str {
        "identity"
    }
}

fn ensure_not_empty(image: &DecodedImage) -> Result<(), ProcessingError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ProcessingError::EmptyImage);
    }
    Ok(())
}

const MAGMA_STOPS: [[u8; 3]; 9] = [
    [0, 0, 4],
    [28, 16, 68],
    [79, 18, 123],
    [129, 37, 129],
    [181, 54, 122],
    [229, 80, 100],
    [251, 135, 97],
    [254, 194, 135],
    [252, 253, 191],
];

fn magma(level: u8) -> Rgb<u8> {
    let segments = (MAGMA_STOPS.len() - 1) as f32;
    let pos = level as f32 / 255.0 * segments;
    let idx = (pos.floor() as usize).min(MAGMA_STOPS.len() - 2);
    let t = pos - idx as f32;
    let (a, b) = (MAGMA_STOPS[idx], MAGMA_STOPS[idx + 1]);
    let lerp = |i: usize| (a[i] as f32 + (b[i] as f32 - a[i] as f32) * t).round() as u8;
    Rgb([lerp(0), lerp(1), lerp(2)])
}
