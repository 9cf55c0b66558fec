//! Shared image preprocessing utilities
//!
//! Brings both inputs into the working resolution and layout every later
//! stage expects: the room fits inside `room_max_dimension`² and is
//! luminance-normalized, the artwork fits inside `art_max_dimension`² with its
//! alpha flattened away.

use crate::{
    config::PipelineConfig,
    error::{CompositeError, Result},
    utils::{colorspace::ColorSpaceOps, validation::ImageValidator},
};
use image::{imageops::FilterType, DynamicImage, Rgb, RgbImage};

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Bounding square the image is shrunk into
    pub max_dimension: u32,
    /// Stretch luminance to full range
    pub normalize: bool,
    /// Color transparent pixels are flattened onto
    pub flatten_color: [u8; 3],
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            normalize: false,
            flatten_color: [255, 255, 255], // White background
        }
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess the room photograph
    pub fn preprocess_room(image: &DynamicImage, config: &PipelineConfig) -> Result<RgbImage> {
        let options = PreprocessingOptions {
            max_dimension: config.room_max_dimension,
            normalize: config.normalize_room,
            ..PreprocessingOptions::default()
        };
        Self::preprocess_image("Room", image, &options)
    }

    /// Preprocess the artwork photograph
    pub fn preprocess_artwork(image: &DynamicImage, config: &PipelineConfig) -> Result<RgbImage> {
        let options = PreprocessingOptions {
            max_dimension: config.art_max_dimension,
            normalize: false,
            ..PreprocessingOptions::default()
        };
        Self::preprocess_image("Artwork", image, &options)
    }

    /// Flatten alpha, shrink to fit, optionally normalize
    pub fn preprocess_image(
        role: &str,
        image: &DynamicImage,
        options: &PreprocessingOptions,
    ) -> Result<RgbImage> {
        ImageValidator::validate_color_image(role, image)?;

        let rgb = if image.color().has_alpha() {
            Self::flatten_alpha(image, options.flatten_color)
        } else {
            image.to_rgb8()
        };

        let (width, height) = rgb.dimensions();
        let (new_width, new_height) = Self::fit_inside(width, height, options.max_dimension)?;
        let resized = if (new_width, new_height) == (width, height) {
            rgb
        } else {
            image::imageops::resize(&rgb, new_width, new_height, FilterType::Triangle)
        };

        Ok(if options.normalize {
            ColorSpaceOps::normalize(&resized)
        } else {
            resized
        })
    }

    /// Dimensions that fit inside `max_dimension`² preserving aspect ratio
    ///
    /// Never enlarges; each side stays at least one pixel.
    pub fn fit_inside(width: u32, height: u32, max_dimension: u32) -> Result<(u32, u32)> {
        if width == 0 || height == 0 || max_dimension == 0 {
            return Err(CompositeError::invalid_image(format!(
                "Cannot fit {}x{} image inside {}x{}",
                width, height, max_dimension, max_dimension
            )));
        }
        if width <= max_dimension && height <= max_dimension {
            return Ok((width, height));
        }
        let scale = f64::from(max_dimension) / f64::from(width.max(height));
        let new_width = (f64::from(width) * scale).round().max(1.0) as u32;
        let new_height = (f64::from(height) * scale).round().max(1.0) as u32;
        Ok((new_width.min(max_dimension), new_height.min(max_dimension)))
    }

    /// Composite an image with alpha onto a solid color
    #[must_use]
    pub fn flatten_alpha(image: &DynamicImage, background: [u8; 3]) -> RgbImage {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut out = RgbImage::from_pixel(width, height, Rgb(background));
        for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
            *dst = ColorSpaceOps::blend_onto(*dst, *src);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_fit_inside_never_enlarges() {
        assert_eq!(ImagePreprocessor::fit_inside(300, 200, 512).unwrap(), (300, 200));
        assert_eq!(ImagePreprocessor::fit_inside(2048, 1024, 1024).unwrap(), (1024, 512));
        assert_eq!(ImagePreprocessor::fit_inside(1000, 4000, 512).unwrap(), (128, 512));
        assert!(ImagePreprocessor::fit_inside(0, 10, 512).is_err());
    }

    #[test]
    fn test_preprocess_room_shrinks_to_limit() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2048, 1536, Rgb([80, 90, 100])));
        let out = ImagePreprocessor::preprocess_room(&image, &PipelineConfig::default()).unwrap();
        assert_eq!(out.dimensions(), (1024, 768));
    }

    #[test]
    fn test_preprocess_artwork_flattens_transparency_to_white() {
        let mut rgba = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(4, 4, Rgba([200, 10, 10, 255]));
        let image = DynamicImage::ImageRgba8(rgba);
        let out = ImagePreprocessor::preprocess_artwork(&image, &PipelineConfig::default()).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(4, 4), &Rgb([200, 10, 10]));
    }

    #[test]
    fn test_preprocess_rejects_grayscale() {
        let image = DynamicImage::ImageLuma8(image::GrayImage::new(16, 16));
        let err =
            ImagePreprocessor::preprocess_artwork(&image, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, CompositeError::InvalidImage(_)));
    }
}
