//! Deterministic perception backend
//!
//! Needs no model weights. Geometry is the fixed frontal-room estimate whenever
//! the photograph shows any structure at all; segmentation flood-fills the
//! background inward from the image borders.

use crate::{
    error::Result,
    perception::{PerceptionBackend, RoomGeometry},
    types::{Perspective, Wall, WallOrientation},
    utils::colorspace::ColorSpaceOps,
};
use image::{Rgb, RgbImage};
use ndarray::Array2;
use std::collections::VecDeque;

/// Heuristic perception backend
#[derive(Debug, Clone)]
pub struct HeuristicPerception {
    /// Mean absolute luminance step below which an image counts as featureless
    pub structure_threshold: f32,
    /// Max per-channel distance from the border color still treated as background
    pub background_tolerance: u8,
    /// Minimum share of border pixels that must match the border color
    pub uniform_border_fraction: f32,
}

impl Default for HeuristicPerception {
    fn default() -> Self {
        Self {
            structure_threshold: 1.5,
            background_tolerance: 24,
            uniform_border_fraction: 0.6,
        }
    }
}

impl HeuristicPerception {
    /// Mean absolute luminance difference between neighbours over `rows`
    fn structure(image: &RgbImage, rows: std::ops::Range<u32>) -> f32 {
        let (width, height) = image.dimensions();
        let rows = rows.start.min(height)..rows.end.min(height);
        let step = (width.max(height) / 256).max(1) as usize;
        let mut sum = 0.0f64;
        let mut count = 0u64;

        for y in rows.step_by(step) {
            for x in (0..width).step_by(step) {
                let here = ColorSpaceOps::luma_u8(image.get_pixel(x, y));
                if x + 1 < width {
                    let right = ColorSpaceOps::luma_u8(image.get_pixel(x + 1, y));
                    sum += f64::from(here.abs_diff(right));
                    count += 1;
                }
                if y + 1 < height {
                    let below = ColorSpaceOps::luma_u8(image.get_pixel(x, y + 1));
                    sum += f64::from(here.abs_diff(below));
                    count += 1;
                }
            }
        }
        if count == 0 {
            0.0
        } else {
            (sum / count as f64) as f32
        }
    }

    fn border_pixels(image: &RgbImage) -> Vec<(u32, u32)> {
        let (width, height) = image.dimensions();
        let mut coords = Vec::with_capacity(2 * (width + height) as usize);
        for x in 0..width {
            coords.push((x, 0));
            if height > 1 {
                coords.push((x, height - 1));
            }
        }
        for y in 1..height.saturating_sub(1) {
            coords.push((0, y));
            if width > 1 {
                coords.push((width - 1, y));
            }
        }
        coords
    }

    /// Per-channel median of the border
    fn border_color(image: &RgbImage, border: &[(u32, u32)]) -> Rgb<u8> {
        let mut channels = [Vec::new(), Vec::new(), Vec::new()];
        for &(x, y) in border {
            let pixel = image.get_pixel(x, y);
            for (values, &value) in channels.iter_mut().zip(pixel.0.iter()) {
                values.push(value);
            }
        }
        let mut median = [0u8; 3];
        for (out, values) in median.iter_mut().zip(channels.iter_mut()) {
            values.sort_unstable();
            *out = values.get(values.len() / 2).copied().unwrap_or(0);
        }
        Rgb(median)
    }

    fn near(a: &Rgb<u8>, b: &Rgb<u8>, tolerance: u8) -> bool {
        a.0.iter().zip(b.0.iter()).all(|(x, y)| x.abs_diff(*y) <= tolerance)
    }
}

impl PerceptionBackend for HeuristicPerception {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn estimate_room_geometry(&self, room: &RgbImage) -> Result<RoomGeometry> {
        let perspective = Perspective::default();
        let height = room.height();

        if Self::structure(room, 0..height) < self.structure_threshold {
            return Ok(RoomGeometry {
                walls: Vec::new(),
                perspective,
            });
        }

        let mut walls: Vec<Wall> = [
            WallOrientation::Left,
            WallOrientation::Front,
            WallOrientation::Right,
            WallOrientation::Back,
        ]
        .into_iter()
        .map(|orientation| Wall {
            orientation,
            angle_degrees: 90.0,
        })
        .collect();

        let horizon = (perspective.horizon_line * height as f32) as u32;
        if Self::structure(room, horizon..height) >= self.structure_threshold {
            walls.push(Wall {
                orientation: WallOrientation::Floor,
                angle_degrees: 0.0,
            });
        }

        Ok(RoomGeometry { walls, perspective })
    }

    fn segment_foreground(&self, artwork: &RgbImage) -> Result<Array2<f32>> {
        let (width, height) = artwork.dimensions();
        let mut map = Array2::<f32>::ones((height as usize, width as usize));
        if width == 0 || height == 0 {
            return Ok(map);
        }

        let border = Self::border_pixels(artwork);
        let background = Self::border_color(artwork, &border);
        let seeds: Vec<(u32, u32)> = border
            .into_iter()
            .filter(|&(x, y)| {
                Self::near(artwork.get_pixel(x, y), &background, self.background_tolerance)
            })
            .collect();

        let border_len = (2 * (width + height)).saturating_sub(4).max(1);
        if (seeds.len() as f32) < self.uniform_border_fraction * border_len as f32 {
            // Busy border: the whole frame is the subject
            return Ok(map);
        }

        let mut queue: VecDeque<(u32, u32)> = VecDeque::new();
        for (x, y) in seeds {
            if let Some(value) = map.get_mut((y as usize, x as usize)) {
                if *value > 0.0 {
                    *value = 0.0;
                    queue.push_back((x, y));
                }
            }
        }

        while let Some((x, y)) = queue.pop_front() {
            let neighbours = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in neighbours {
                if nx >= width || ny >= height {
                    continue;
                }
                let Some(value) = map.get_mut((ny as usize, nx as usize)) else {
                    continue;
                };
                if *value > 0.0
                    && Self::near(
                        artwork.get_pixel(nx, ny),
                        &background,
                        self.background_tolerance,
                    )
                {
                    *value = 0.0;
                    queue.push_back((nx, ny));
                }
            }
        }

        Ok(map)
    }
}
