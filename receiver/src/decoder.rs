use frame_relay_common::frame::Frame;
use image::{ImageReader, RgbImage};
use std::io::Cursor;

/// Decoded camera frame as an 8-bit RGB pixel grid.
pub type DecodedImage = RgbImage;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is empty")]
    Empty,
    #[error("failed to sniff image format: {0}")]
    Format(std::io::Error),
    #[error("codec rejected frame: {0}")]
    Codec(#[from] image::ImageError),
}

/// Decode an encoded frame (JPEG from the camera, but any format the codec
/// recognises by its magic bytes is accepted).
pub fn decode(frame: &Frame) -> Result<DecodedImage, DecodeError> {
    if frame.is_empty() {
        return Err(DecodeError::Empty);
    }
    let img = ImageReader::new(Cursor::new(frame.as_bytes()))
        .with_guessed_format()
        .map_err(DecodeError::Format)?
        .decode()?;
    Ok(img.to_rgb8())
}

#[cfg(test)]
pub(crate) fn encode_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    use image::codecs::jpeg::JpegEncoder;
    use image::Rgb;

    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 8) as u8, (y * 8) as u8, 128])
    });
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 85)
        .encode_image(&img)
        .unwrap();
    out
}
