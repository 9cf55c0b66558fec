//! Image encoding and decoding service
//!
//! Keeps byte-level codec handling out of the compositing stages.

use crate::error::{CompositeError, Result};
use image::{codecs::jpeg::JpegEncoder, DynamicImage};

/// Service for converting between images and encoded bytes
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Decode caller-supplied bytes, sniffing the container format
    ///
    /// Empty or unrecognizable payloads are caller errors.
    pub fn decode(role: &str, bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(CompositeError::invalid_input(format!(
                "{} image is empty",
                role
            )));
        }
        image::load_from_memory(bytes).map_err(|e| {
            CompositeError::invalid_input(format!("{} image could not be decoded: {}", role, e))
        })
    }
}

/// Encode as baseline JPEG, dropping any alpha
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let rgb_image = image.to_rgb8();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder
        .encode_image(&rgb_image)
        .map_err(|e| CompositeError::internal(format!("Failed to encode JPEG: {}", e)))?;
    Ok(buffer)
}
