//! Room analysis
//!
//! Builds a `RoomModel` from a preprocessed room photograph. Wall detection and
//! perspective come from the perception backend; lighting, palette and
//! placement scoring are computed locally from pixel statistics and are
//! reproducible bit-for-bit for the same buffer.

use crate::{
    config::SurfaceType,
    error::{CompositeError, Result},
    perception::PerceptionBackend,
    types::{
        CandidatePlacement, Color, ColorScheme, LightDirection, Lighting, RoomModel, Wall,
        WallOrientation,
    },
    utils::{colorspace::ColorSpaceOps, validation::ImageValidator},
};
use image::RgbImage;
use std::sync::Arc;
use tracing::{debug, instrument, span, Level};

/// Number of palette entries reported for a room
pub const PALETTE_SIZE: usize = 5;

const WALL_GRID_XS: [f32; 3] = [0.3, 0.5, 0.7];
const WALL_GRID_YS: [f32; 2] = [0.4, 0.6];
const WALL_CANDIDATE_SCALE: f32 = 0.25;
const FLOOR_GRID_XS: [f32; 3] = [0.3, 0.5, 0.7];
const FLOOR_GRID_Y: f32 = 0.85;
const FLOOR_CANDIDATE_SCALE: f32 = 0.2;
/// Luminance standard deviation at which a spot scores zero
const FLATNESS_STDDEV_CEILING: f64 = 64.0;

/// Derives a `RoomModel` from a room image
pub struct RoomAnalyzer {
    perception: Arc<dyn PerceptionBackend>,
}

impl RoomAnalyzer {
    #[must_use]
    pub fn new(perception: Arc<dyn PerceptionBackend>) -> Self {
        Self { perception }
    }

    /// Analyze a room image
    ///
    /// # Errors
    /// - `InvalidImage` for a zero-area image
    /// - `PerceptionUnavailable` when geometry estimation cannot be reached
    #[instrument(skip_all, fields(width = room.width(), height = room.height()))]
    pub fn analyze(&self, room: &RgbImage) -> Result<RoomModel> {
        ImageValidator::validate_rgb_dimensions("Room", room.width(), room.height())?;

        let geometry = {
            let _span = span!(Level::DEBUG, "room_geometry", backend = self.perception.name())
                .entered();
            self.perception.estimate_room_geometry(room)?
        };
        if !geometry.perspective.vanishing_point.is_normalized()
            || !(0.0..=1.0).contains(&geometry.perspective.horizon_line)
            || !(geometry.perspective.distortion >= 0.0)
        {
            return Err(CompositeError::internal(format!(
                "Perception backend '{}' returned out-of-range perspective {:?}",
                self.perception.name(),
                geometry.perspective
            )));
        }

        let lighting = Self::analyze_lighting(room);
        let color_scheme = Self::extract_color_scheme(room);
        let candidate_placements = Self::candidate_placements(room, &geometry.walls);
        let room_type = self.perception.classify_room(room);

        debug!(
            walls = geometry.walls.len(),
            candidates = candidate_placements.len(),
            light = lighting.direction.octant(),
            temperature_k = lighting.color_temperature_kelvin,
            "Room analyzed"
        );

        Ok(RoomModel {
            walls: geometry.walls,
            lighting,
            perspective: geometry.perspective,
            candidate_placements,
            room_type,
            color_scheme,
        })
    }

    /// Estimate light direction, intensity and temperature from luminance statistics
    ///
    /// Direction points from the image center to the centroid of the brightest
    /// decile of pixels.
    #[must_use]
    pub fn analyze_lighting(room: &RgbImage) -> Lighting {
        let (width, height) = room.dimensions();
        let mut histogram = [0u64; 256];
        let mut luma_sum = 0.0f64;
        let mut rgb_sum = [0.0f64; 3];

        for pixel in room.pixels() {
            let luma = ColorSpaceOps::luma_u8(pixel);
            if let Some(bucket) = histogram.get_mut(usize::from(luma)) {
                *bucket += 1;
            }
            luma_sum += f64::from(ColorSpaceOps::luminance(pixel[0], pixel[1], pixel[2]));
            for (sum, &c) in rgb_sum.iter_mut().zip(pixel.0.iter()) {
                *sum += f64::from(c);
            }
        }

        let total = u64::from(width) * u64::from(height);
        if total == 0 {
            return Lighting {
                direction: LightDirection::TOP,
                intensity: 0.0,
                color_temperature_kelvin: ColorSpaceOps::estimate_temperature([0.0; 3]),
                has_shadows: false,
                has_highlights: false,
            };
        }
        let n = total as f64;
        let mean_luma = luma_sum / n;
        let mean_rgb = rgb_sum.map(|s| s / n);

        // Strictly above the 90th-percentile bucket when any pixel is
        let top_decile = ColorSpaceOps::percentile(&histogram, total, 0.9);
        let brighter: u64 = histogram.iter().skip(usize::from(top_decile) + 1).sum();
        let threshold = if brighter > 0 {
            top_decile.saturating_add(1)
        } else {
            top_decile
        };
        let (mut sx, mut sy, mut count) = (0.0f64, 0.0f64, 0u64);
        for (x, y, pixel) in room.enumerate_pixels() {
            if ColorSpaceOps::luma_u8(pixel) >= threshold {
                sx += f64::from(x);
                sy += f64::from(y);
                count += 1;
            }
        }
        let direction = if count == 0 {
            LightDirection::TOP
        } else {
            let half_w = f64::from(width) / 2.0;
            let half_h = f64::from(height) / 2.0;
            let cx = (sx / count as f64 - half_w + 0.5) / half_w;
            let cy = (sy / count as f64 - half_h + 0.5) / half_h;
            LightDirection::from_vector(cx as f32, cy as f32)
        };

        let bottom_decile = ColorSpaceOps::percentile(&histogram, total, 0.1);
        let highlights: u64 = histogram.iter().skip(250).sum();

        Lighting {
            direction,
            intensity: (mean_luma / 255.0).clamp(0.0, 1.0) as f32,
            color_temperature_kelvin: ColorSpaceOps::estimate_temperature(mean_rgb),
            has_shadows: f64::from(bottom_decile) < 0.35 * mean_luma,
            has_highlights: highlights as f64 > 0.005 * n,
        }
    }

    /// Fixed-size palette by histogram binning
    ///
    /// Dominant, secondary and accent are the three most populous bins, ties
    /// going to the darker color. Rooms with fewer distinct bins than the
    /// palette size repeat their last entry.
    #[must_use]
    pub fn extract_color_scheme(room: &RgbImage) -> ColorScheme {
        let bins = ColorSpaceOps::quantize(room.pixels().map(|p| p.0));
        let mut palette: Vec<Color> = bins.iter().take(PALETTE_SIZE).map(|b| b.color).collect();
        let filler = palette.last().copied().unwrap_or_default();
        palette.resize(PALETTE_SIZE, filler);

        ColorScheme {
            dominant: palette[0],
            secondary: palette[1],
            accent: palette[2],
            palette,
        }
    }

    /// Score a fixed grid of spots on each detected surface
    ///
    /// Flat, uncluttered spots score highest. Sorted by score, descending;
    /// equal scores keep grid order.
    #[must_use]
    pub fn candidate_placements(room: &RgbImage, walls: &[Wall]) -> Vec<CandidatePlacement> {
        let mut candidates = Vec::new();

        if walls.iter().any(|w| w.orientation.is_vertical()) {
            for &y in &WALL_GRID_YS {
                for &x in &WALL_GRID_XS {
                    candidates.push(Self::score_candidate(
                        room,
                        x,
                        y,
                        WALL_CANDIDATE_SCALE,
                        SurfaceType::Wall,
                    ));
                }
            }
        }
        if walls
            .iter()
            .any(|w| w.orientation == WallOrientation::Floor)
        {
            for &x in &FLOOR_GRID_XS {
                candidates.push(Self::score_candidate(
                    room,
                    x,
                    FLOOR_GRID_Y,
                    FLOOR_CANDIDATE_SCALE,
                    SurfaceType::Floor,
                ));
            }
        }

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates
    }

    fn score_candidate(
        room: &RgbImage,
        x: f32,
        y: f32,
        scale: f32,
        surface: SurfaceType,
    ) -> CandidatePlacement {
        CandidatePlacement {
            x,
            y,
            scale,
            score: Self::flatness_score(room, x, y, scale),
            surface: Some(surface),
        }
    }

    /// `1 - stddev/64` of luminance over a square window, clamped to [0,1]
    fn flatness_score(room: &RgbImage, x: f32, y: f32, scale: f32) -> f32 {
        let (width, height) = room.dimensions();
        let side = (f64::from(scale) * f64::from(width.min(height))).max(1.0);
        let cx = f64::from(x) * f64::from(width);
        let cy = f64::from(y) * f64::from(height);
        let x0 = (cx - side / 2.0).floor().max(0.0) as u32;
        let y0 = (cy - side / 2.0).floor().max(0.0) as u32;
        let x1 = ((cx + side / 2.0).ceil() as u32).min(width);
        let y1 = ((cy + side / 2.0).ceil() as u32).min(height);

        let (mut sum, mut sum_sq, mut n) = (0.0f64, 0.0f64, 0u64);
        for py in y0..y1 {
            for px in x0..x1 {
                let p = room.get_pixel(px, py);
                let l = f64::from(ColorSpaceOps::luminance(p[0], p[1], p[2]));
                sum += l;
                sum_sq += l * l;
                n += 1;
            }
        }
        if n == 0 {
            return 0.0;
        }
        let mean = sum / n as f64;
        let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
        (1.0 - (variance.sqrt() / FLATNESS_STDDEV_CEILING).min(1.0)) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockPerception;
    use image::Rgb;

    fn gradient_room(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            let v = ((x + y) * 255 / (2 * size)) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_analyze_produces_sorted_normalized_candidates() {
        let analyzer = RoomAnalyzer::new(Arc::new(MockPerception::with_floor()));
        let model = analyzer.analyze(&gradient_room(128)).unwrap();

        assert_eq!(model.walls.len(), 5);
        assert_eq!(model.candidate_placements.len(), 9);
        for pair in model.candidate_placements.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for c in &model.candidate_placements {
            assert!((0.0..=1.0).contains(&c.x) && (0.0..=1.0).contains(&c.y));
            assert!((0.0..=1.0).contains(&c.score));
            assert!(c.scale > 0.0);
        }
    }

    #[test]
    fn test_no_walls_means_no_candidates() {
        let analyzer = RoomAnalyzer::new(Arc::new(MockPerception::without_walls()));
        let model = analyzer.analyze(&gradient_room(64)).unwrap();
        assert!(!model.walls_detected());
        assert!(model.candidate_placements.is_empty());
    }

    #[test]
    fn test_unavailable_perception_propagates() {
        let analyzer = RoomAnalyzer::new(Arc::new(MockPerception::unavailable()));
        let err = analyzer.analyze(&gradient_room(32)).unwrap_err();
        assert!(matches!(err, CompositeError::PerceptionUnavailable(_)));
    }

    #[test]
    fn test_zero_area_room_is_invalid() {
        let analyzer = RoomAnalyzer::new(Arc::new(MockPerception::new()));
        let err = analyzer.analyze(&RgbImage::new(0, 10)).unwrap_err();
        assert!(matches!(err, CompositeError::InvalidImage(_)));
    }

    #[test]
    fn test_light_direction_follows_bright_region() {
        // Bright top-left quadrant
        let room = RgbImage::from_fn(100, 100, |x, y| {
            if x < 30 && y < 30 {
                Rgb([255, 255, 255])
            } else {
                Rgb([60, 60, 60])
            }
        });
        let lighting = RoomAnalyzer::analyze_lighting(&room);
        assert!(lighting.direction.x < 0.0 && lighting.direction.y < 0.0);
        assert_eq!(lighting.direction.octant(), "top-left");
        assert!(lighting.has_highlights);
    }

    #[test]
    fn test_lighting_is_reproducible() {
        let room = gradient_room(96);
        assert_eq!(
            RoomAnalyzer::analyze_lighting(&room),
            RoomAnalyzer::analyze_lighting(&room)
        );
    }

    #[test]
    fn test_uniform_room_lighting() {
        let room = RgbImage::from_pixel(50, 50, Rgb([128, 128, 128]));
        let lighting = RoomAnalyzer::analyze_lighting(&room);
        assert!((lighting.intensity - 128.0 / 255.0).abs() < 1e-3);
        assert!(!lighting.has_shadows);
        assert!(!lighting.has_highlights);
    }

    #[test]
    fn test_color_scheme_orders_by_population() {
        let room = RgbImage::from_fn(10, 10, |x, _| match x {
            0..=5 => Rgb([200, 0, 0]),
            6..=8 => Rgb([0, 0, 200]),
            _ => Rgb([0, 200, 0]),
        });
        let scheme = RoomAnalyzer::extract_color_scheme(&room);
        assert_eq!(scheme.palette.len(), PALETTE_SIZE);
        assert_eq!(scheme.dominant, Color::new(200, 0, 0));
        assert_eq!(scheme.secondary, Color::new(0, 0, 200));
        assert_eq!(scheme.accent, Color::new(0, 200, 0));
        assert_eq!(scheme.palette[4], scheme.accent);
    }

    #[test]
    fn test_flat_spots_score_higher_than_busy_ones() {
        let room = RgbImage::from_fn(200, 200, |x, y| {
            if x < 100 && (x / 2 + y / 2) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([230, 230, 230])
            }
        });
        let walls = [Wall {
            orientation: WallOrientation::Front,
            angle_degrees: 90.0,
        }];
        let candidates = RoomAnalyzer::candidate_placements(&room, &walls);
        let best = candidates[0];
        assert!(best.x > 0.5, "best spot should be on the flat right side");
        assert_eq!(best.surface, Some(SurfaceType::Wall));
    }
}
