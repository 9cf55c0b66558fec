//! Image precondition checks

use crate::error::{CompositeError, Result};
use image::DynamicImage;

/// Validator for stage input images
pub struct ImageValidator;

impl ImageValidator {
    /// Reject zero-area images and images with fewer than 3 channels
    pub fn validate_color_image(role: &str, image: &DynamicImage) -> Result<()> {
        let dimensions = (image.width(), image.height());
        let channels = image.color().channel_count();

        if dimensions.0 == 0 || dimensions.1 == 0 {
            return Err(CompositeError::image_dimension_error(
                role,
                dimensions,
                channels,
                "image has zero area",
            ));
        }
        if channels < 3 {
            return Err(CompositeError::image_dimension_error(
                role,
                dimensions,
                channels,
                "at least 3 color channels are required",
            ));
        }
        Ok(())
    }

    /// Reject rooms smaller than `min_dimension` on either side
    pub fn validate_room_size(image: &DynamicImage, min_dimension: u32) -> Result<()> {
        if image.width() < min_dimension || image.height() < min_dimension {
            return Err(CompositeError::image_dimension_error(
                "Room",
                (image.width(), image.height()),
                image.color().channel_count(),
                &format!(
                    "room image must be at least {}x{} pixels",
                    min_dimension, min_dimension
                ),
            ));
        }
        Ok(())
    }

    /// Same checks as `validate_color_image` for already-decoded RGB buffers
    pub fn validate_rgb_dimensions(role: &str, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(CompositeError::image_dimension_error(
                role,
                (width, height),
                3,
                "image has zero area",
            ));
        }
        Ok(())
    }
}
