//! Artwork segmentation
//!
//! Turns the perception backend's foreground probabilities into an alpha
//! mask, then measures the foreground: bounding box, palette and frame.

use crate::{
    error::{CompositeError, Result},
    perception::PerceptionBackend,
    types::{ArtworkModel, BoundingBox, DominantColor},
    utils::{
        colorspace::ColorSpaceOps,
        validation::{ImageValidator, TensorValidator},
    },
};
use image::{GrayImage, Luma, RgbImage};
use ndarray::Array2;
use std::sync::Arc;
use tracing::{debug, instrument, span, Level};

/// Mask value at or above which a pixel counts as foreground
pub const FOREGROUND_THRESHOLD: u8 = 128;

/// Number of dominant colors reported at most
pub const MAX_DOMINANT_COLORS: usize = 5;

/// Probabilities at or beyond these bounds count as decisively classified
const DECISIVE_LOW: f32 = 0.1;
const DECISIVE_HIGH: f32 = 0.9;

/// Luminance step that counts as a high-contrast edge
const FRAME_EDGE_CONTRAST: u8 = 40;
/// Share of a side the edge must cover
const FRAME_SIDE_COVERAGE: f32 = 0.9;
/// Sides that must carry the edge
const FRAME_MIN_SIDES: usize = 3;

/// Derives an `ArtworkModel` from an artwork image
pub struct ArtworkSegmenter {
    perception: Arc<dyn PerceptionBackend>,
}

impl ArtworkSegmenter {
    #[must_use]
    pub fn new(perception: Arc<dyn PerceptionBackend>) -> Self {
        Self { perception }
    }

    /// Segment an artwork image
    ///
    /// # Errors
    /// - `InvalidImage` for a zero-area image
    /// - `SegmentationFailed` when no pixel reaches the foreground threshold
    /// - `PerceptionUnavailable` when segmentation cannot be reached
    #[instrument(skip_all, fields(width = artwork.width(), height = artwork.height()))]
    pub fn segment(&self, artwork: &RgbImage) -> Result<ArtworkModel> {
        let (width, height) = artwork.dimensions();
        ImageValidator::validate_rgb_dimensions("Artwork", width, height)?;

        let probabilities = {
            let _span = span!(
                Level::DEBUG,
                "foreground_segmentation",
                backend = self.perception.name()
            )
            .entered();
            self.perception.segment_foreground(artwork)?
        };
        TensorValidator::validate_foreground_map(&probabilities, width, height)?;

        let alpha_mask = Self::map_to_mask(&probabilities, width, height);
        let bounding_box = Self::bounding_box(&alpha_mask).ok_or_else(|| {
            CompositeError::segmentation_failed(
                "No foreground found in artwork image; try a photo with a plainer background",
            )
        })?;
        let mask_quality = Self::mask_quality(&probabilities);
        let dominant_colors = Self::dominant_colors(artwork, &alpha_mask);
        let has_frame = Self::detect_frame(artwork, &bounding_box);
        let artwork_type = self.perception.classify_artwork(artwork, has_frame);

        debug!(
            bbox = ?bounding_box,
            mask_quality,
            colors = dominant_colors.len(),
            has_frame,
            "Artwork segmented"
        );

        Ok(ArtworkModel {
            alpha_mask,
            aspect_ratio: bounding_box.aspect_ratio(),
            bounding_box,
            dominant_colors,
            artwork_type,
            has_frame,
            mask_quality,
        })
    }

    /// Quantize probabilities to 8-bit opacity
    #[must_use]
    pub fn map_to_mask(probabilities: &Array2<f32>, width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let p = probabilities
                .get((y as usize, x as usize))
                .copied()
                .unwrap_or(0.0);
            Luma([(p.clamp(0.0, 1.0) * 255.0).round() as u8])
        })
    }

    /// Tight box around mask pixels at or above the foreground threshold
    #[must_use]
    pub fn bounding_box(mask: &GrayImage) -> Option<BoundingBox> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, pixel) in mask.enumerate_pixels() {
            if pixel[0] < FOREGROUND_THRESHOLD {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        bounds.map(|(x0, y0, x1, y1)| BoundingBox {
            x: x0,
            y: y0,
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
        })
    }

    /// Fraction of probabilities that are decisively foreground or background
    #[must_use]
    pub fn mask_quality(probabilities: &Array2<f32>) -> f32 {
        let total = probabilities.len();
        if total == 0 {
            return 0.0;
        }
        let decisive = probabilities
            .iter()
            .filter(|&&p| p <= DECISIVE_LOW || p >= DECISIVE_HIGH)
            .count();
        decisive as f32 / total as f32
    }

    /// Palette of the foreground only
    ///
    /// Histogram bins pick up to five centers, then every foreground pixel is
    /// assigned to its nearest center, so the percentages sum to one.
    #[must_use]
    pub fn dominant_colors(artwork: &RgbImage, mask: &GrayImage) -> Vec<DominantColor> {
        let foreground = || {
            artwork
                .pixels()
                .zip(mask.pixels())
                .filter(|(_, m)| m[0] >= FOREGROUND_THRESHOLD)
                .map(|(p, _)| p.0)
        };

        let centers: Vec<_> = ColorSpaceOps::quantize(foreground())
            .into_iter()
            .take(MAX_DOMINANT_COLORS)
            .map(|bin| bin.color)
            .collect();
        let counts = ColorSpaceOps::assign_to_nearest(foreground(), &centers);
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return Vec::new();
        }

        let mut colors: Vec<DominantColor> = centers
            .into_iter()
            .zip(counts)
            .filter(|(_, count)| *count > 0)
            .map(|(color, count)| DominantColor {
                color,
                percentage: (count as f64 / total as f64) as f32,
            })
            .collect();
        colors.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
        colors
    }

    /// Whether a high-contrast rectangular border runs just inside the box
    ///
    /// Each side is probed at insets up to 5% of the shorter box side; a side
    /// counts when some inset shows the edge along at least 90% of it.
    #[must_use]
    pub fn detect_frame(artwork: &RgbImage, bbox: &BoundingBox) -> bool {
        if bbox.width < 3 || bbox.height < 3 || !bbox.fits_within(artwork.width(), artwork.height())
        {
            return false;
        }
        let max_inset = (bbox.width.min(bbox.height) / 20)
            .max(2)
            .min(bbox.width.min(bbox.height) - 1);
        let luma = |x: u32, y: u32| ColorSpaceOps::luma_u8(artwork.get_pixel(x, y));
        let (x0, y0) = (bbox.x, bbox.y);
        let (x1, y1) = (bbox.x + bbox.width - 1, bbox.y + bbox.height - 1);

        let side_coverage = |edge_at: &dyn Fn(u32, u32) -> bool, len: u32| -> f32 {
            (1..=max_inset)
                .map(|d| {
                    let hits = (0..len).filter(|&i| edge_at(d, i)).count();
                    hits as f32 / len as f32
                })
                .fold(0.0, f32::max)
        };
        let step = |a: u8, b: u8| a.abs_diff(b) >= FRAME_EDGE_CONTRAST;

        let top = side_coverage(&|d, i| step(luma(x0 + i, y0 + d), luma(x0 + i, y0 + d - 1)), bbox.width);
        let bottom =
            side_coverage(&|d, i| step(luma(x0 + i, y1 - d), luma(x0 + i, y1 - d + 1)), bbox.width);
        let left =
            side_coverage(&|d, i| step(luma(x0 + d, y0 + i), luma(x0 + d - 1, y0 + i)), bbox.height);
        let right =
            side_coverage(&|d, i| step(luma(x1 - d, y0 + i), luma(x1 - d + 1, y0 + i)), bbox.height);

        [top, bottom, left, right]
            .iter()
            .filter(|&&coverage| coverage >= FRAME_SIDE_COVERAGE)
            .count()
            >= FRAME_MIN_SIDES
    }
}
