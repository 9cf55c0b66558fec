//! Shared fixtures for integration tests
//!
//! All images are generated in memory so the tests need no assets on disk.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use roomfit::{
    backends::test_utils::MockPerception, CompositingPipeline, HeuristicPerception,
    PipelineConfig,
};
use std::sync::Arc;

/// Route `log` output from the progress reporter into the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Textured room with enough structure for the heuristic to find walls and a floor
pub fn textured_room(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let v = (60 + (x * 7 + y * 3) % 120) as u8;
        let warm = if y > height / 2 { 20 } else { 0 };
        Rgb([v.saturating_add(warm), v, v.saturating_sub(10)])
    }))
}

/// Featureless room
pub fn blank_room(size: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(size, size, Rgb([200, 200, 195])))
}

/// Painting on a clean white background: a red and blue panel centered in white
pub fn painting_on_white(size: u32) -> DynamicImage {
    let inset = size / 5;
    DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |x, y| {
        let inside = (inset..size - inset).contains(&x) && (inset..size - inset).contains(&y);
        if !inside {
            Rgb([255, 255, 255])
        } else if x < size / 2 {
            Rgb([190, 40, 30])
        } else {
            Rgb([30, 60, 170])
        }
    }))
}

/// Artwork with nothing to extract
pub fn uniform_artwork(size: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(size, size, Rgb([240, 240, 240])))
}

/// Artwork whose every pixel is fully transparent
pub fn transparent_artwork(size: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0])))
}

/// Encode an image to bytes in the given format
pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buffer), format)
        .unwrap();
    buffer
}

/// Pipeline with the default configuration and a mock backend
pub fn mock_pipeline(mock: MockPerception) -> CompositingPipeline {
    CompositingPipeline::with_backend(PipelineConfig::default(), Arc::new(mock)).unwrap()
}

/// Pipeline with the default configuration and the heuristic backend
pub fn heuristic_pipeline() -> CompositingPipeline {
    CompositingPipeline::with_backend(
        PipelineConfig::default(),
        Arc::new(HeuristicPerception::default()),
    )
    .unwrap()
}
