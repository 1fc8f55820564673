use frame_relay_common::config::SenderConfig;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::SenderError;

/// Where outgoing JPEG payloads come from.
pub enum FrameSource {
    /// JPEG files from a directory, sent in lexical order and cycled.
    Directory { files: Vec<PathBuf>, next: usize },
    /// A gradient that drifts one step per frame, encoded on the fly.
    Synthetic {
        width: u32,
        height: u32,
        quality: u8,
        tick: u32,
    },
}

impl FrameSource {
    pub fn from_config(config: &SenderConfig) -> Result<Self, SenderError> {
        match &config.source_dir {
            Some(dir) => {
                let files = list_jpegs(dir)?;
                info!(dir = %dir.display(), count = files.len(), "sending JPEG files");
                Ok(Self::Directory { files, next: 0 })
            }
            None => {
                info!(
                    width = config.width,
                    height = config.height,
                    "sending synthetic frames"
                );
                Ok(Self::Synthetic {
                    width: config.width,
                    height: config.height,
                    quality: config.quality,
                    tick: 0,
                })
            }
        }
    }

    pub fn next_frame(&mut self) -> Result<Vec<u8>, SenderError> {
        match self {
            Self::Directory { files, next } => {
                let path = &files[*next];
                *next = (*next + 1) % files.len();
                std::fs::read(path)
                    .map_err(|e| SenderError::ReadFrame(path.display().to_string(), e))
            }
            Self::Synthetic {
                width,
                height,
                quality,
                tick,
            } => {
                let shift = *tick;
                *tick = tick.wrapping_add(1);
                let img = RgbImage::from_fn(*width, *height, |x, y| {
                    Rgb([
                        (x.wrapping_add(shift) % 256) as u8,
                        (y % 256) as u8,
                        (x.wrapping_add(y).wrapping_add(shift.wrapping_mul(2)) % 256) as u8,
                    ])
                });
                let mut out = Vec::new();
                JpegEncoder::new_with_quality(&mut out, *quality)
                    .encode_image(&img)
                    .map_err(SenderError::Encode)?;
                Ok(out)
            }
        }
    }
}

fn list_jpegs(dir: &Path) -> Result<Vec<PathBuf>, SenderError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| SenderError::ReadFrame(dir.display().to_string(), e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
                })
        })
        .collect();
    if files.is_empty() {
        return Err(SenderError::NoFrames(dir.display().to_string()));
    }
    files.sort();
    Ok(files)
}
