//! Artwork compositing
//!
//! Four strictly ordered stages turn the segmented artwork into pixels on the
//! room canvas:
//!
//! 1. perspective: warp the artwork onto a quad consistent with the room's
//!    vanishing point, falling back to plain scale + rotate when the
//!    homography is degenerate
//! 2. lighting: tint and gain the artwork toward the target light
//! 3. effects: drop shadow and floor/shelf reflection
//! 4. blend: alpha-composite onto the room, cropped to the canvas

use crate::{
    config::{LightingMode, ProcessingSettings},
    error::{CompositeError, Result},
    types::{
        ArtworkModel, LightDirection, Lighting, Placement, ProcessingDetails, RoomModel,
    },
    utils::{
        colorspace::ColorSpaceOps,
        geometry::{GeometryOps, Homography, Quad},
    },
};
use image::{imageops, RgbImage, Rgba, RgbaImage};
use instant::Duration;
use tracing::{debug, instrument, span, Level};

/// Preset temperature for `LightingMode::Warm`
pub const WARM_TEMPERATURE_K: u32 = 3000;
/// Preset temperature for `LightingMode::Cold`
pub const COLD_TEMPERATURE_K: u32 = 7000;
/// Preset temperature for `LightingMode::Studio`
pub const STUDIO_TEMPERATURE_K: u32 = 6500;
/// Preset intensity for `LightingMode::Studio`
pub const STUDIO_INTENSITY: f32 = 0.5;
/// Temperature differences within this band are left untinted
pub const TEMPERATURE_TOLERANCE_K: u32 = 300;
/// Intensity ratios within this band of 1.0 are left ungained
pub const INTENSITY_TOLERANCE: f32 = 0.02;

const STUDIO_SHADOW_LIFT: f32 = 0.3;
const SHADOW_OPACITY: f32 = 0.45;
const REFLECTION_OPACITY: f32 = 0.35;
/// Max skew applied to the edge nearer the vanishing point
const MAX_FORESHORTEN: f64 = 0.5;
/// Alpha at or above which artwork pixels are measured for lighting
const MEASURE_ALPHA: u8 = 128;
const MAX_LIGHTING_PASSES: usize = 8;
const MIN_INTENSITY_GAIN: f32 = 0.25;
const MAX_INTENSITY_GAIN: f32 = 4.0;
const GAIN_SEARCH_STEPS: usize = 24;

const CONFIDENCE_BASE: f32 = 0.90;
const CONFIDENCE_WALL_BONUS: f32 = 0.05;
const CONFIDENCE_MASK_BONUS: f32 = 0.03;
const CONFIDENCE_SPEED_BONUS: f32 = 0.02;
const CONFIDENCE_MASK_THRESHOLD: f32 = 0.8;
const CONFIDENCE_SPEED_LIMIT: Duration = Duration::from_secs(5);
const CONFIDENCE_CAP: f32 = 0.99;

/// RGBA pixels positioned on the room canvas
///
/// `origin` may be negative or lie beyond the canvas; blending crops.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub image: RgbaImage,
    pub origin: (i64, i64),
}

impl Layer {
    /// Half-open bounds `(x0, y0, x1, y1)` in canvas pixels
    #[must_use]
    pub fn bounds(&self) -> (i64, i64, i64, i64) {
        (
            self.origin.0,
            self.origin.1,
            self.origin.0 + i64::from(self.image.width()),
            self.origin.1 + i64::from(self.image.height()),
        )
    }

    /// Stack layers bottom to top into one layer covering all of them
    #[must_use]
    pub fn stack(layers: &[&Layer]) -> Layer {
        let mut union: Option<(i64, i64, i64, i64)> = None;
        for layer in layers {
            let b = layer.bounds();
            union = Some(match union {
                None => b,
                Some(u) => (u.0.min(b.0), u.1.min(b.1), u.2.max(b.2), u.3.max(b.3)),
            });
        }
        let (x0, y0, x1, y1) = union.unwrap_or((0, 0, 0, 0));
        let mut image = RgbaImage::new((x1 - x0).max(0) as u32, (y1 - y0).max(0) as u32);

        for layer in layers {
            let (dx, dy) = ((layer.origin.0 - x0) as u32, (layer.origin.1 - y0) as u32);
            for (x, y, src) in layer.image.enumerate_pixels() {
                if src[3] == 0 {
                    continue;
                }
                let dst = image.get_pixel_mut(x + dx, y + dy);
                *dst = ColorSpaceOps::alpha_over(*dst, *src);
            }
        }
        Layer {
            image,
            origin: (x0, y0),
        }
    }
}

/// Quality signals the confidence score is computed from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInputs {
    pub walls_detected: usize,
    pub mask_quality: f32,
}

impl ConfidenceInputs {
    #[must_use]
    pub fn from_models(room: &RoomModel, artwork: &ArtworkModel) -> Self {
        Self {
            walls_detected: room.walls.len(),
            mask_quality: artwork.mask_quality,
        }
    }
}

/// Additive confidence score, capped at 0.99
///
/// Base 0.90; +0.05 with at least one wall, +0.03 for mask quality above 0.8,
/// +0.02 when the run took under five seconds.
#[must_use]
pub fn confidence(inputs: &ConfidenceInputs, elapsed: Duration) -> f32 {
    let mut score = CONFIDENCE_BASE;
    if inputs.walls_detected >= 1 {
        score += CONFIDENCE_WALL_BONUS;
    }
    if inputs.mask_quality > CONFIDENCE_MASK_THRESHOLD {
        score += CONFIDENCE_MASK_BONUS;
    }
    if elapsed < CONFIDENCE_SPEED_LIMIT {
        score += CONFIDENCE_SPEED_BONUS;
    }
    score.min(CONFIDENCE_CAP)
}

/// Output of a compose call
#[derive(Debug, Clone)]
pub struct Composition {
    pub image: RgbImage,
    pub details: ProcessingDetails,
    pub confidence_inputs: ConfidenceInputs,
}

/// Light measured over the opaque part of a layer
struct LightSample {
    pixels: Vec<[f32; 3]>,
    temperature: u32,
    intensity: f32,
}

impl LightSample {
    /// `None` when no pixel reaches the measuring alpha
    fn measure(image: &RgbaImage) -> Option<Self> {
        let pixels: Vec<[f32; 3]> = image
            .pixels()
            .filter(|p| p[3] >= MEASURE_ALPHA)
            .map(|p| [f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
            .collect();
        if pixels.is_empty() {
            return None;
        }
        let n = pixels.len() as f64;
        let mut sums = [0.0f64; 3];
        let mut luma_sum = 0.0f64;
        for p in &pixels {
            for (s, &c) in sums.iter_mut().zip(p.iter()) {
                *s += f64::from(c);
            }
            luma_sum += f64::from(luminance(*p));
        }
        Some(Self {
            temperature: ColorSpaceOps::estimate_temperature(sums.map(|s| s / n)),
            intensity: (luma_sum / n / 255.0) as f32,
            pixels,
        })
    }

    /// How far outside both tolerance bands the sample sits, zero inside them
    fn error(&self, (temperature, intensity): (u32, f32)) -> f32 {
        let kelvin = self
            .temperature
            .abs_diff(temperature)
            .saturating_sub(TEMPERATURE_TOLERANCE_K) as f32
            / TEMPERATURE_TOLERANCE_K as f32;
        kelvin + self.intensity_excess(intensity) / INTENSITY_TOLERANCE
    }

    fn intensity_excess(&self, target: f32) -> f32 {
        if self.intensity <= 0.0 {
            return 0.0;
        }
        ((target / self.intensity - 1.0).abs() - INTENSITY_TOLERANCE).max(0.0)
    }

    /// Per-channel gains for one pass, `None` when already inside both bands
    fn gains(&self, (temperature, intensity): (u32, f32)) -> Option<[f32; 3]> {
        let tint = self.temperature.abs_diff(temperature) > TEMPERATURE_TOLERANCE_K;
        if !tint && self.intensity_excess(intensity) <= 0.0 {
            return None;
        }
        let tint = if tint {
            ColorSpaceOps::temperature_gains(self.temperature, temperature)
        } else {
            [1.0; 3]
        };
        let gain = if self.intensity > 0.0 {
            self.solve_gain(tint, intensity * 255.0)
        } else {
            1.0
        };
        Some(tint.map(|t| t * gain))
    }

    /// Overall gain whose clipped result has mean luminance `goal`
    ///
    /// Mean clipped luminance is monotone in the gain, so bisect.
    fn solve_gain(&self, tint: [f32; 3], goal: f32) -> f32 {
        let mean_luma = |gain: f32| {
            let total: f32 = self
                .pixels
                .iter()
                .map(|p| {
                    let mut lit = [0.0f32; 3];
                    for ((l, &c), &t) in lit.iter_mut().zip(p.iter()).zip(tint.iter()) {
                        *l = (c * t * gain).min(255.0);
                    }
                    luminance(lit)
                })
                .sum();
            total / self.pixels.len() as f32
        };

        let (mut lo, mut hi) = (MIN_INTENSITY_GAIN, MAX_INTENSITY_GAIN);
        if mean_luma(hi) <= goal {
            return hi;
        }
        if mean_luma(lo) >= goal {
            return lo;
        }
        for _ in 0..GAIN_SEARCH_STEPS {
            let mid = (lo + hi) / 2.0;
            if mean_luma(mid) < goal {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        (lo + hi) / 2.0
    }
}

fn luminance(rgb: [f32; 3]) -> f32 {
    0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]
}

/// Composites artwork into a room
pub struct Compositor;

impl Compositor {
    /// Run all four stages
    ///
    /// # Errors
    /// - `InvalidImage` when the mask and artwork dimensions disagree
    #[instrument(skip_all, fields(surface = %placement.surface_type, scale = placement.scale))]
    pub fn compose(
        room: &RgbImage,
        room_model: &RoomModel,
        artwork: &RgbImage,
        artwork_model: &ArtworkModel,
        placement: &Placement,
        settings: &ProcessingSettings,
    ) -> Result<Composition> {
        let canvas = room.dimensions();

        let (layer, perspective_corrected) = {
            let _span = span!(Level::DEBUG, "perspective").entered();
            Self::correct_perspective(artwork, artwork_model, room_model, placement, canvas)?
        };

        let (layer, lighting_matched) = {
            let _span = span!(Level::DEBUG, "lighting", mode = %settings.lighting).entered();
            let (image, changed) =
                Self::match_lighting(&layer.image, &room_model.lighting, settings.lighting);
            (
                Layer {
                    image,
                    origin: layer.origin,
                },
                changed,
            )
        };

        let (layer, shadows_added, reflections_added) = {
            let _span = span!(Level::DEBUG, "effects").entered();
            let shadow = settings.shadows.then(|| {
                Self::render_shadow(&layer, room_model.lighting.direction, placement.scale, canvas)
            });
            let reflection = (settings.reflection && placement.surface_type.supports_reflection())
                .then(|| Self::render_reflection(&layer));

            let mut stack: Vec<&Layer> = Vec::with_capacity(3);
            stack.extend(reflection.as_ref());
            stack.extend(shadow.as_ref());
            stack.push(&layer);
            (Layer::stack(&stack), shadow.is_some(), reflection.is_some())
        };

        let image = {
            let _span = span!(Level::DEBUG, "blend").entered();
            Self::blend(room, &layer)
        };

        debug!(
            perspective_corrected,
            lighting_matched, shadows_added, reflections_added, "Composition finished"
        );

        Ok(Composition {
            image,
            details: ProcessingDetails {
                perspective_corrected,
                lighting_matched,
                shadows_added,
                reflections_added,
                position_type: placement.surface_type,
                room_type: room_model.room_type,
                artwork_type: artwork_model.artwork_type,
            },
            confidence_inputs: ConfidenceInputs::from_models(room_model, artwork_model),
        })
    }

    /// Destination quad for the artwork on the canvas
    ///
    /// The longer bounding-box side spans `scale * min(canvas)` pixels. The
    /// quad is rotated, then the vertical edge nearer the vanishing point is
    /// shortened in proportion to the horizontal offset from it.
    #[must_use]
    pub fn target_quad(
        art_size: (u32, u32),
        room_model: &RoomModel,
        placement: &Placement,
        canvas: (u32, u32),
    ) -> Quad {
        let (w, h) = Self::target_size(art_size, placement.scale, canvas);
        let center = Self::target_center(placement, canvas);
        let quad = GeometryOps::centered_rect(center, w, h);
        let quad = GeometryOps::rotate_quad(&quad, center, f64::from(placement.rotation_degrees));

        let perspective = &room_model.perspective;
        let skew = (f64::from(perspective.distortion)
            * f64::from(perspective.vanishing_point.x - placement.x)
            * 2.0)
            .clamp(-MAX_FORESHORTEN, MAX_FORESHORTEN);
        GeometryOps::foreshorten(&quad, skew)
    }

    fn target_size(art_size: (u32, u32), scale: f32, canvas: (u32, u32)) -> (f64, f64) {
        let long = (f64::from(scale) * f64::from(canvas.0.min(canvas.1))).max(1.0);
        let (aw, ah) = (f64::from(art_size.0.max(1)), f64::from(art_size.1.max(1)));
        if aw >= ah {
            (long, (long * ah / aw).max(1.0))
        } else {
            ((long * aw / ah).max(1.0), long)
        }
    }

    fn target_center(placement: &Placement, canvas: (u32, u32)) -> [f64; 2] {
        [
            f64::from(placement.x) * f64::from(canvas.0),
            f64::from(placement.y) * f64::from(canvas.1),
        ]
    }

    /// Warp the masked artwork onto its target quad
    ///
    /// Returns the warped layer and whether a true perspective homography was
    /// used (`false` when the fallback scale + rotate transform was needed).
    pub fn correct_perspective(
        artwork: &RgbImage,
        artwork_model: &ArtworkModel,
        room_model: &RoomModel,
        placement: &Placement,
        canvas: (u32, u32),
    ) -> Result<(Layer, bool)> {
        if artwork_model.alpha_mask.dimensions() != artwork.dimensions() {
            return Err(CompositeError::invalid_image(format!(
                "Alpha mask is {}x{} but artwork is {}x{}",
                artwork_model.alpha_mask.width(),
                artwork_model.alpha_mask.height(),
                artwork.width(),
                artwork.height()
            )));
        }
        let bbox = artwork_model.bounding_box;
        if !bbox.fits_within(artwork.width(), artwork.height()) || bbox.width == 0 || bbox.height == 0
        {
            return Err(CompositeError::invalid_image(format!(
                "Bounding box {:?} lies outside the {}x{} artwork",
                bbox,
                artwork.width(),
                artwork.height()
            )));
        }

        let source = RgbaImage::from_fn(bbox.width, bbox.height, |x, y| {
            let p = artwork.get_pixel(bbox.x + x, bbox.y + y);
            let a = artwork_model.alpha_mask.get_pixel(bbox.x + x, bbox.y + y)[0];
            Rgba([p[0], p[1], p[2], a])
        });

        let src_quad = GeometryOps::rect_corners(f64::from(bbox.width), f64::from(bbox.height));
        let dst_quad = Self::target_quad((bbox.width, bbox.height), room_model, placement, canvas);

        let (homography, corrected) = match Homography::from_quads(&src_quad, &dst_quad) {
            Some(h) if !h.is_degenerate(&src_quad) => (h, true),
            _ => {
                debug!("Degenerate homography, falling back to scale and rotate");
                let size = Self::target_size((bbox.width, bbox.height), placement.scale, canvas);
                let fallback = Homography::scale_rotate(
                    (f64::from(bbox.width), f64::from(bbox.height)),
                    size,
                    f64::from(placement.rotation_degrees),
                    Self::target_center(placement, canvas),
                );
                (fallback, false)
            },
        };

        let inverse = homography.inverse().ok_or_else(|| {
            CompositeError::internal("Artwork transform is not invertible")
        })?;
        let warped_quad = homography
            .apply_quad(&src_quad)
            .ok_or_else(|| CompositeError::internal("Artwork corners project to infinity"))?;

        // Keep the layer within one canvas of the room on every side
        let (w, h) = (i64::from(canvas.0), i64::from(canvas.1));
        let (qx0, qy0, qx1, qy1) = GeometryOps::integer_bounds(&warped_quad);
        let (x0, y0) = (qx0.clamp(-w, 2 * w), qy0.clamp(-h, 2 * h));
        let (x1, y1) = (qx1.clamp(x0, 2 * w), qy1.clamp(y0, 2 * h));

        let image = RgbaImage::from_fn((x1 - x0) as u32, (y1 - y0) as u32, |x, y| {
            let cx = (x0 + i64::from(x)) as f64 + 0.5;
            let cy = (y0 + i64::from(y)) as f64 + 0.5;
            match inverse.apply(cx, cy) {
                Some([sx, sy]) => Self::sample_bilinear(&source, sx - 0.5, sy - 0.5),
                None => Rgba([0, 0, 0, 0]),
            }
        });

        Ok((
            Layer {
                image,
                origin: (x0, y0),
            },
            corrected,
        ))
    }

    /// Premultiplied bilinear sample; transparent outside the image
    fn sample_bilinear(image: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
        let (w, h) = (f64::from(image.width()), f64::from(image.height()));
        if x < -0.5 || y < -0.5 || x > w - 0.5 || y > h - 0.5 {
            return Rgba([0, 0, 0, 0]);
        }
        let fx = x.floor();
        let fy = y.floor();
        let (tx, ty) = (x - fx, y - fy);

        let mut acc = [0.0f64; 4];
        for (ox, oy, weight) in [
            (0.0, 0.0, (1.0 - tx) * (1.0 - ty)),
            (1.0, 0.0, tx * (1.0 - ty)),
            (0.0, 1.0, (1.0 - tx) * ty),
            (1.0, 1.0, tx * ty),
        ] {
            if weight <= 0.0 {
                continue;
            }
            let sx = (fx + ox).clamp(0.0, w - 1.0) as u32;
            let sy = (fy + oy).clamp(0.0, h - 1.0) as u32;
            let p = image.get_pixel(sx, sy);
            let a = f64::from(p[3]) / 255.0;
            acc[0] += f64::from(p[0]) * a * weight;
            acc[1] += f64::from(p[1]) * a * weight;
            acc[2] += f64::from(p[2]) * a * weight;
            acc[3] += a * weight;
        }
        if acc[3] <= 0.0 {
            return Rgba([0, 0, 0, 0]);
        }
        let channel = |v: f64| (v / acc[3]).round().clamp(0.0, 255.0) as u8;
        Rgba([
            channel(acc[0]),
            channel(acc[1]),
            channel(acc[2]),
            (acc[3] * 255.0).round().clamp(0.0, 255.0) as u8,
        ])
    }

    /// Target temperature and intensity for a lighting mode
    #[must_use]
    pub fn lighting_target(room: &Lighting, mode: LightingMode) -> (u32, f32) {
        match mode {
            LightingMode::Match => (room.color_temperature_kelvin, room.intensity),
            LightingMode::Warm => (WARM_TEMPERATURE_K, room.intensity),
            LightingMode::Cold => (COLD_TEMPERATURE_K, room.intensity),
            LightingMode::Studio => (STUDIO_TEMPERATURE_K, STUDIO_INTENSITY),
        }
    }

    /// Re-light artwork pixels toward the mode's target
    ///
    /// Only pixels with alpha >= 128 are measured. A temperature within 300K of
    /// the target gets no tint and an intensity ratio within 2% of one gets no
    /// gain. Tint and gain are re-measured and re-applied until the artwork
    /// lands inside both bands or a pass stops getting closer, so matching
    /// an already-matched layer returns it unchanged. Returns the re-lit
    /// pixels and whether any pixel changed.
    #[must_use]
    pub fn match_lighting(
        layer: &RgbaImage,
        room: &Lighting,
        mode: LightingMode,
    ) -> (RgbaImage, bool) {
        let target = Self::lighting_target(room, mode);
        let mut out = layer.clone();

        if let Some(mut sample) = LightSample::measure(&out) {
            let mut error = sample.error(target);
            for _ in 0..MAX_LIGHTING_PASSES {
                let Some(gains) = sample.gains(target) else {
                    break;
                };
                let mut candidate = out.clone();
                for pixel in candidate.pixels_mut().filter(|p| p[3] > 0) {
                    *pixel = ColorSpaceOps::apply_gains(*pixel, gains);
                }
                let Some(next) = LightSample::measure(&candidate) else {
                    break;
                };
                let next_error = next.error(target);
                if next_error >= error {
                    break;
                }
                out = candidate;
                sample = next;
                error = next_error;
            }
        }

        if mode == LightingMode::Studio {
            let mean = target.1 * 255.0;
            for pixel in out.pixels_mut().filter(|p| p[3] > 0) {
                let luma = ColorSpaceOps::luminance(pixel[0], pixel[1], pixel[2]);
                if luma < mean {
                    let lift = (mean - luma) * STUDIO_SHADOW_LIFT;
                    for c in pixel.0.iter_mut().take(3) {
                        *c = (f32::from(*c) + lift).round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }

        let changed = out != *layer;
        (out, changed)
    }

    /// Soft black drop shadow cast away from the light
    #[must_use]
    pub fn render_shadow(
        layer: &Layer,
        light: LightDirection,
        scale: f32,
        canvas: (u32, u32),
    ) -> Layer {
        let extent = f64::from(scale) * f64::from(canvas.0.min(canvas.1));
        let offset = (extent * 0.04).max(2.0);
        let sigma = (extent * 0.02).max(1.0) as f32;
        let pad = (sigma * 3.0).ceil() as u32;

        let (w, h) = layer.image.dimensions();
        let mut silhouette = RgbaImage::new(w + 2 * pad, h + 2 * pad);
        for (x, y, p) in layer.image.enumerate_pixels() {
            let a = (f32::from(p[3]) * SHADOW_OPACITY).round() as u8;
            silhouette.put_pixel(x + pad, y + pad, Rgba([0, 0, 0, a]));
        }
        let blurred = imageops::blur(&silhouette, sigma);

        let dx = (-f64::from(light.x) * offset).round() as i64;
        let dy = (-f64::from(light.y) * offset).round() as i64;
        Layer {
            image: blurred,
            origin: (
                layer.origin.0 + dx - i64::from(pad),
                layer.origin.1 + dy - i64::from(pad),
            ),
        }
    }

    /// Mirrored copy below the artwork, fading out over half its height
    #[must_use]
    pub fn render_reflection(layer: &Layer) -> Layer {
        let mut mirrored = imageops::flip_vertical(&layer.image);
        let fade = (mirrored.height() as f32 / 2.0).max(1.0);
        for (_, y, p) in mirrored.enumerate_pixels_mut() {
            let falloff = (1.0 - y as f32 / fade).max(0.0);
            p[3] = (f32::from(p[3]) * REFLECTION_OPACITY * falloff).round() as u8;
        }
        Layer {
            image: mirrored,
            origin: (
                layer.origin.0,
                layer.origin.1 + i64::from(layer.image.height()),
            ),
        }
    }

    /// Alpha-composite a layer onto the room, cropped to the canvas
    #[must_use]
    pub fn blend(room: &RgbImage, layer: &Layer) -> RgbImage {
        let mut out = room.clone();
        let Some((x0, y0, x1, y1)) =
            GeometryOps::clip_to_canvas(layer.bounds(), room.width(), room.height())
        else {
            return out;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                let lx = (i64::from(x) - layer.origin.0) as u32;
                let ly = (i64::from(y) - layer.origin.1) as u32;
                let src = *layer.image.get_pixel(lx, ly);
                let dst = out.get_pixel_mut(x, y);
                *dst = ColorSpaceOps::blend_onto(*dst, src);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SurfaceType,
        room::RoomAnalyzer,
        types::{
            ArtworkType, BoundingBox, Color, ColorScheme, NormalizedPoint, Perspective,
            PlacementSource, RoomType,
        },
    };
    use image::{GrayImage, Luma, Rgb};

    fn room_model(perspective: Perspective, walls: usize) -> RoomModel {
        let gray = Color::new(128, 128, 128);
        RoomModel {
            walls: (0..walls)
                .map(|_| crate::types::Wall {
                    orientation: crate::types::WallOrientation::Front,
                    angle_degrees: 90.0,
                })
                .collect(),
            lighting: Lighting {
                direction: LightDirection::TOP,
                intensity: 0.5,
                color_temperature_kelvin: 6500,
                has_shadows: false,
                has_highlights: false,
            },
            perspective,
            candidate_placements: Vec::new(),
            room_type: RoomType::Bedroom,
            color_scheme: ColorScheme {
                dominant: gray,
                secondary: gray,
                accent: gray,
                palette: vec![gray; 5],
            },
        }
    }

    fn artwork(size: u32) -> (RgbImage, ArtworkModel) {
        let image = RgbImage::from_pixel(size, size, Rgb([200, 40, 40]));
        let model = ArtworkModel {
            alpha_mask: GrayImage::from_pixel(size, size, Luma([255])),
            bounding_box: BoundingBox {
                x: 0,
                y: 0,
                width: size,
                height: size,
            },
            aspect_ratio: 1.0,
            dominant_colors: Vec::new(),
            artwork_type: ArtworkType::Photograph,
            has_frame: false,
            mask_quality: 1.0,
        };
        (image, model)
    }

    fn placement(x: f32, y: f32, scale: f32, surface: SurfaceType) -> Placement {
        Placement {
            x,
            y,
            scale,
            rotation_degrees: 0.0,
            surface_type: surface,
            source: PlacementSource::SurfaceMatch,
        }
    }

    #[test]
    fn test_confidence_is_additive_and_capped() {
        let all = ConfidenceInputs {
            walls_detected: 4,
            mask_quality: 0.95,
        };
        assert!((confidence(&all, Duration::from_millis(100)) - 0.99).abs() < 1e-6);

        let none = ConfidenceInputs {
            walls_detected: 0,
            mask_quality: 0.5,
        };
        assert!((confidence(&none, Duration::from_secs(10)) - 0.90).abs() < 1e-6);

        let walls_only = ConfidenceInputs {
            walls_detected: 1,
            mask_quality: 0.8,
        };
        assert!((confidence(&walls_only, Duration::from_secs(5)) - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_is_monotonic_in_signals() {
        let base = ConfidenceInputs {
            walls_detected: 0,
            mask_quality: 0.5,
        };
        let better = ConfidenceInputs {
            walls_detected: 1,
            ..base
        };
        let best = ConfidenceInputs {
            mask_quality: 0.9,
            ..better
        };
        let slow = Duration::from_secs(6);
        assert!(confidence(&base, slow) <= confidence(&better, slow));
        assert!(confidence(&better, slow) <= confidence(&best, slow));
        assert!(confidence(&best, slow) <= confidence(&best, Duration::ZERO));
    }

    #[test]
    fn test_target_quad_spans_scale_of_short_side() {
        let quad = Compositor::target_quad(
            (200, 100),
            &room_model(
                Perspective {
                    distortion: 0.0,
                    ..Perspective::default()
                },
                0,
            ),
            &placement(0.5, 0.5, 0.25, SurfaceType::Wall),
            (800, 400),
        );
        assert!((quad[1][0] - quad[0][0] - 100.0).abs() < 1e-9);
        assert!((quad[3][1] - quad[0][1] - 50.0).abs() < 1e-9);
        assert!((quad[0][0] - 350.0).abs() < 1e-9);
    }

    #[test]
    fn test_target_quad_shortens_edge_nearer_vanishing_point() {
        let room = room_model(
            Perspective {
                vanishing_point: NormalizedPoint::new(0.5, 0.33),
                horizon_line: 0.4,
                distortion: 0.5,
            },
            1,
        );
        // Right of the vanishing point: the left edge is nearer and shrinks
        let quad = Compositor::target_quad(
            (100, 100),
            &room,
            &placement(0.8, 0.5, 0.2, SurfaceType::Wall),
            (1000, 1000),
        );
        let left = quad[3][1] - quad[0][1];
        let right = quad[2][1] - quad[1][1];
        assert!(left < right);
    }

    #[test]
    fn test_perspective_warp_places_artwork() {
        let (art, model) = artwork(64);
        let (layer, corrected) = Compositor::correct_perspective(
            &art,
            &model,
            &room_model(Perspective::default(), 1),
            &placement(0.5, 0.5, 0.25, SurfaceType::Wall),
            (512, 512),
        )
        .unwrap();
        assert!(corrected);

        let (x0, y0, x1, y1) = layer.bounds();
        assert!(x0 <= 192 && x1 >= 320 && y0 <= 192 && y1 >= 320);
        let center = layer
            .image
            .get_pixel((256 - x0) as u32, (256 - y0) as u32);
        assert_eq!(center, &Rgba([200, 40, 40, 255]));
    }

    #[test]
    fn test_subpixel_target_falls_back_to_scale_and_rotate() {
        // A 1200px artwork squeezed onto a one-pixel target leaves a near-singular homography
        let (art, model) = artwork(1200);
        let mut target = placement(0.5, 0.5, 0.0, SurfaceType::Wall);
        target.rotation_degrees = 30.0;
        let (layer, corrected) = Compositor::correct_perspective(
            &art,
            &model,
            &room_model(Perspective::default(), 1),
            &target,
            (256, 256),
        )
        .unwrap();
        assert!(!corrected);

        let src = GeometryOps::rect_corners(1200.0, 1200.0);
        let fallback =
            Homography::scale_rotate((1200.0, 1200.0), (1.0, 1.0), 30.0, [128.0, 128.0]);
        let expected = fallback.apply_quad(&src).unwrap();
        assert_eq!(layer.bounds(), GeometryOps::integer_bounds(&expected));
    }

    #[test]
    fn test_mask_mismatch_is_invalid_image() {
        let (art, mut model) = artwork(32);
        model.alpha_mask = GrayImage::new(16, 16);
        let err = Compositor::correct_perspective(
            &art,
            &model,
            &room_model(Perspective::default(), 1),
            &placement(0.5, 0.5, 0.25, SurfaceType::Wall),
            (256, 256),
        )
        .unwrap_err();
        assert!(matches!(err, CompositeError::InvalidImage(_)));
    }

    #[test]
    fn test_match_lighting_is_noop_when_already_matched() {
        let layer = RgbaImage::from_fn(40, 40, |x, y| {
            Rgba([(100 + x) as u8, (90 + y) as u8, 110, 255])
        });
        let rgb = RgbImage::from_fn(40, 40, |x, y| {
            let p = layer.get_pixel(x, y);
            Rgb([p[0], p[1], p[2]])
        });
        let measured = RoomAnalyzer::analyze_lighting(&rgb);

        let (once, changed) = Compositor::match_lighting(&layer, &measured, LightingMode::Match);
        assert!(!changed);
        assert_eq!(once, layer);
        let (twice, changed) = Compositor::match_lighting(&once, &measured, LightingMode::Match);
        assert!(!changed);
        assert_eq!(twice, layer);
    }

    fn mean_rgb(image: &RgbaImage) -> [f64; 3] {
        let n = f64::from(image.width() * image.height());
        let mut sums = [0.0f64; 3];
        for p in image.pixels() {
            for (s, &c) in sums.iter_mut().zip(p.0.iter()) {
                *s += f64::from(c);
            }
        }
        sums.map(|s| s / n)
    }

    #[test]
    fn test_match_gain_reaches_target_despite_clipping() {
        // Neutral, bright top half clips long before the dark half reaches the target
        let layer = RgbaImage::from_fn(40, 40, |_, y| {
            if y < 20 {
                Rgba([250, 250, 250, 255])
            } else {
                Rgba([50, 50, 50, 255])
            }
        });
        let lighting = Lighting {
            color_temperature_kelvin: ColorSpaceOps::estimate_temperature(mean_rgb(&layer)),
            intensity: 0.8,
            ..room_model(Perspective::default(), 0).lighting
        };

        let (once, changed) = Compositor::match_lighting(&layer, &lighting, LightingMode::Match);
        assert!(changed);
        assert_eq!(once.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        let mean_luma = mean_rgb(&once)[1];
        assert!((mean_luma - 204.0).abs() <= 2.0, "mean luma {}", mean_luma);

        let (twice, changed) = Compositor::match_lighting(&once, &lighting, LightingMode::Match);
        assert!(!changed);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_match_toward_cool_room_settles_in_one_call() {
        let layer = RgbaImage::from_fn(40, 40, |x, y| {
            Rgba([(190 + x % 20) as u8, (140 + y % 20) as u8, 100, 255])
        });
        let lighting = Lighting {
            color_temperature_kelvin: 9000,
            intensity: 0.5,
            ..room_model(Perspective::default(), 0).lighting
        };

        let (once, changed) = Compositor::match_lighting(&layer, &lighting, LightingMode::Match);
        assert!(changed);
        let settled = ColorSpaceOps::estimate_temperature(mean_rgb(&once));
        assert!(
            settled.abs_diff(9000) <= TEMPERATURE_TOLERANCE_K,
            "settled at {}K",
            settled
        );

        let (twice, changed) = Compositor::match_lighting(&once, &lighting, LightingMode::Match);
        assert!(!changed);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_warm_and_cold_shift_balance() {
        let layer = RgbaImage::from_pixel(10, 10, Rgba([128, 128, 128, 255]));
        let lighting = room_model(Perspective::default(), 0).lighting;

        let (warm, changed) = Compositor::match_lighting(&layer, &lighting, LightingMode::Warm);
        assert!(changed);
        let p = warm.get_pixel(5, 5);
        assert!(p[0] > p[2], "warm light should favour red over blue");

        let (cold, _) = Compositor::match_lighting(&layer, &lighting, LightingMode::Cold);
        let p = cold.get_pixel(5, 5);
        assert!(p[2] >= p[0], "cold light should favour blue over red");
    }

    #[test]
    fn test_studio_lifts_shadows() {
        let layer = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([20, 20, 20, 255])
            } else {
                Rgba([230, 230, 230, 255])
            }
        });
        let lighting = room_model(Perspective::default(), 0).lighting;
        let (studio, changed) = Compositor::match_lighting(&layer, &lighting, LightingMode::Studio);
        assert!(changed);
        assert!(studio.get_pixel(0, 0)[0] > 20);
    }

    #[test]
    fn test_transparent_pixels_are_not_relit() {
        let layer = RgbaImage::from_pixel(4, 4, Rgba([10, 10, 10, 0]));
        let lighting = room_model(Perspective::default(), 0).lighting;
        let (out, changed) = Compositor::match_lighting(&layer, &lighting, LightingMode::Warm);
        assert!(!changed);
        assert_eq!(out, layer);
    }

    #[test]
    fn test_shadow_falls_away_from_light() {
        let layer = Layer {
            image: RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255])),
            origin: (100, 100),
        };
        let shadow = Compositor::render_shadow(&layer, LightDirection::TOP, 0.5, (400, 400));
        let (sx0, sy0, sx1, sy1) = shadow.bounds();
        let shadow_center_y = (sy0 + sy1) as f64 / 2.0;
        assert!(shadow_center_y > 110.0, "shadow should be cast downward");
        assert!(((sx0 + sx1) as f64 / 2.0 - 110.0).abs() < 1.0);
        assert!(shadow.image.pixels().all(|p| p[0] == 0 && p[3] <= 115));
    }

    #[test]
    fn test_reflection_sits_below_and_fades() {
        let layer = Layer {
            image: RgbaImage::from_pixel(10, 20, Rgba([50, 60, 70, 255])),
            origin: (5, 5),
        };
        let reflection = Compositor::render_reflection(&layer);
        assert_eq!(reflection.origin, (5, 25));
        assert!(reflection.image.get_pixel(0, 0)[3] > 0);
        assert_eq!(reflection.image.get_pixel(0, 15)[3], 0);
    }

    #[test]
    fn test_blend_crops_out_of_bounds_layer() {
        let room = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let layer = Layer {
            image: RgbaImage::from_pixel(6, 6, Rgba([255, 255, 255, 255])),
            origin: (7, -3),
        };
        let out = Compositor::blend(&room, &layer);
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(out.get_pixel(9, 0), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(9, 2), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(9, 3), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(6, 0), &Rgb([0, 0, 0]));

        let far = Layer {
            image: RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])),
            origin: (50, 50),
        };
        assert_eq!(Compositor::blend(&room, &far), room);
    }

    #[test]
    fn test_reflection_only_on_supporting_surfaces() {
        let room = RgbImage::from_pixel(256, 256, Rgb([120, 120, 120]));
        let (art, model) = artwork(32);
        let settings = ProcessingSettings::builder()
            .reflection(true)
            .shadows(false)
            .build()
            .unwrap();
        let rm = room_model(Perspective::default(), 1);

        let wall = Compositor::compose(
            &room,
            &rm,
            &art,
            &model,
            &placement(0.5, 0.5, 0.2, SurfaceType::Wall),
            &settings,
        )
        .unwrap();
        assert!(!wall.details.reflections_added);
        assert!(!wall.details.shadows_added);

        let floor = Compositor::compose(
            &room,
            &rm,
            &art,
            &model,
            &placement(0.5, 0.5, 0.2, SurfaceType::Floor),
            &settings,
        )
        .unwrap();
        assert!(floor.details.reflections_added);
        assert_eq!(floor.details.position_type, SurfaceType::Floor);
        assert_eq!(floor.details.room_type, RoomType::Bedroom);
        assert_eq!(floor.details.artwork_type, ArtworkType::Photograph);
        assert_ne!(floor.image, wall.image);
    }

    #[test]
    fn test_compose_changes_pixels_under_placement_only() {
        let room = RgbImage::from_pixel(256, 256, Rgb([120, 120, 120]));
        let (art, model) = artwork(32);
        let settings = ProcessingSettings::builder().shadows(false).build().unwrap();
        let out = Compositor::compose(
            &room,
            &room_model(Perspective::default(), 1),
            &art,
            &model,
            &placement(0.5, 0.5, 0.2, SurfaceType::Wall),
            &settings,
        )
        .unwrap();
        assert_eq!(out.image.dimensions(), (256, 256));
        assert_ne!(out.image.get_pixel(128, 128), &Rgb([120, 120, 120]));
        assert_eq!(out.image.get_pixel(5, 5), &Rgb([120, 120, 120]));
        assert!(out.details.perspective_corrected);
        // Saturated red art under a neutral room gets tinted
        assert!(out.details.lighting_matched);
    }

    #[test]
    fn test_compose_reports_untouched_lighting() {
        let room = RgbImage::from_pixel(256, 256, Rgb([120, 120, 120]));
        let (art, model) = artwork(32);
        let mut room_model = room_model(Perspective::default(), 1);
        room_model.lighting = RoomAnalyzer::analyze_lighting(&art);
        let settings = ProcessingSettings::builder().shadows(false).build().unwrap();
        let out = Compositor::compose(
            &room,
            &room_model,
            &art,
            &model,
            &placement(0.5, 0.5, 0.2, SurfaceType::Wall),
            &settings,
        )
        .unwrap();
        assert!(!out.details.lighting_matched);
    }
}
