//! Deterministic per-pixel color operations
//!
//! Normalization, alpha compositing, color temperature estimation and
//! transfer, and histogram palette quantization. Every function here is a
//! pure function of its inputs so results are reproducible bit-for-bit.

use crate::types::Color;
use image::{Rgb, RgbImage, Rgba};

/// Lowest temperature the estimator will report
pub const MIN_TEMPERATURE_K: u32 = 2000;
/// Highest temperature the estimator will report
pub const MAX_TEMPERATURE_K: u32 = 12000;
const TEMPERATURE_STEP_K: u32 = 100;

/// Bits kept per channel when binning colors
const QUANT_BITS: u32 = 3;
const QUANT_LEVELS: usize = 1 << QUANT_BITS;

/// One histogram bin of the palette quantizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorBin {
    /// Mean color of the pixels that fell into this bin
    pub color: Color,
    pub count: u64,
    index: usize,
}

/// Per-pixel color operations
pub struct ColorSpaceOps;

impl ColorSpaceOps {
    /// Rec. 709 luminance of an 8-bit RGB triple, in [0,255]
    #[must_use]
    pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
        0.2126 * f32::from(r) + 0.7152 * f32::from(g) + 0.0722 * f32::from(b)
    }

    /// Luminance rounded to a histogram bucket
    #[must_use]
    pub fn luma_u8(pixel: &Rgb<u8>) -> u8 {
        Self::luminance(pixel[0], pixel[1], pixel[2])
            .round()
            .clamp(0.0, 255.0) as u8
    }

    /// Stretch the 1st-99th luminance percentiles to full range
    ///
    /// The same linear map is applied to every channel so hue is preserved.
    /// Images whose percentiles coincide are returned unchanged.
    #[must_use]
    pub fn normalize(image: &RgbImage) -> RgbImage {
        let mut histogram = [0u64; 256];
        for pixel in image.pixels() {
            if let Some(bucket) = histogram.get_mut(usize::from(Self::luma_u8(pixel))) {
                *bucket += 1;
            }
        }
        let total: u64 = histogram.iter().sum();
        if total == 0 {
            return image.clone();
        }

        let low = Self::percentile(&histogram, total, 0.01);
        let high = Self::percentile(&histogram, total, 0.99);
        if high <= low {
            return image.clone();
        }

        let lo = f32::from(low);
        let range = f32::from(high) - lo;
        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            for c in pixel.0.iter_mut() {
                *c = ((f32::from(*c) - lo) * 255.0 / range).round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }

    /// Smallest bucket whose cumulative share reaches `fraction`
    #[must_use]
    pub fn percentile(histogram: &[u64; 256], total: u64, fraction: f64) -> u8 {
        let target = (total as f64 * fraction).ceil().max(1.0) as u64;
        let mut cumulative = 0u64;
        for (value, count) in histogram.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return value as u8;
            }
        }
        255
    }

    /// Straight-alpha Porter-Duff "over": `src` on top of `dst`
    #[must_use]
    pub fn alpha_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
        let sa = f32::from(src[3]) / 255.0;
        if sa <= 0.0 {
            return dst;
        }
        let da = f32::from(dst[3]) / 255.0;
        let out_a = sa + da * (1.0 - sa);
        if out_a <= 0.0 {
            return Rgba([0, 0, 0, 0]);
        }
        let mut out = [0u8; 4];
        for (i, o) in out.iter_mut().take(3).enumerate() {
            let s = f32::from(src[i]);
            let d = f32::from(dst[i]);
            *o = ((s * sa + d * da * (1.0 - sa)) / out_a).round().clamp(0.0, 255.0) as u8;
        }
        out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        Rgba(out)
    }

    /// Blend `src` onto an opaque background pixel
    #[must_use]
    pub fn blend_onto(dst: Rgb<u8>, src: Rgba<u8>) -> Rgb<u8> {
        let a = f32::from(src[3]) / 255.0;
        if a <= 0.0 {
            return dst;
        }
        let mut out = [0u8; 3];
        for (i, o) in out.iter_mut().enumerate() {
            *o = (f32::from(src[i]) * a + f32::from(dst[i]) * (1.0 - a))
                .round()
                .clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    }

    /// White point of a black-body light source, channels in [0,1]
    #[must_use]
    pub fn kelvin_to_rgb(kelvin: u32) -> [f32; 3] {
        let t = kelvin.clamp(1000, 40000) as f32 / 100.0;
        let r = if t <= 66.0 {
            255.0
        } else {
            329.698_73 * (t - 60.0).powf(-0.133_204_76)
        };
        let g = if t <= 66.0 {
            99.470_8 * t.ln() - 161.119_57
        } else {
            288.122_16 * (t - 60.0).powf(-0.075_514_85)
        };
        let b = if t >= 66.0 {
            255.0
        } else if t <= 19.0 {
            0.0
        } else {
            138.517_73 * (t - 10.0).ln() - 305.044_8
        };
        [
            r.clamp(0.0, 255.0) / 255.0,
            g.clamp(0.0, 255.0) / 255.0,
            b.clamp(0.0, 255.0) / 255.0,
        ]
    }

    /// Temperature whose white point best explains the mean color's blue/red balance
    #[must_use]
    pub fn estimate_temperature(mean_rgb: [f64; 3]) -> u32 {
        let observed = ((mean_rgb[2] + 1.0) / (mean_rgb[0] + 1.0)).ln();
        let mut best = (MIN_TEMPERATURE_K, f64::INFINITY);
        let mut kelvin = MIN_TEMPERATURE_K;
        while kelvin <= MAX_TEMPERATURE_K {
            let white = Self::kelvin_to_rgb(kelvin);
            let predicted =
                ((f64::from(white[2]) * 255.0 + 1.0) / (f64::from(white[0]) * 255.0 + 1.0)).ln();
            let error = (predicted - observed).abs();
            if error < best.1 {
                best = (kelvin, error);
            }
            kelvin += TEMPERATURE_STEP_K;
        }
        best.0
    }

    /// Per-channel gains that re-light a scene from `from_k` to `to_k`
    ///
    /// Gains are normalized to unit luminance so the tint does not change
    /// brightness.
    #[must_use]
    pub fn temperature_gains(from_k: u32, to_k: u32) -> [f32; 3] {
        let from = Self::kelvin_to_rgb(from_k);
        let to = Self::kelvin_to_rgb(to_k);
        let mut gains = [1.0f32; 3];
        for (i, g) in gains.iter_mut().enumerate() {
            *g = ((to[i] + 0.02) / (from[i] + 0.02)).clamp(0.25, 4.0);
        }
        let luminance = 0.2126 * gains[0] + 0.7152 * gains[1] + 0.0722 * gains[2];
        if luminance > 0.0 {
            for g in &mut gains {
                *g /= luminance;
            }
        }
        gains
    }

    /// Multiply a pixel's color channels, leaving alpha alone
    #[must_use]
    pub fn apply_gains(pixel: Rgba<u8>, gains: [f32; 3]) -> Rgba<u8> {
        let mut out = pixel;
        for (c, gain) in out.0.iter_mut().take(3).zip(gains.iter()) {
            *c = (f32::from(*c) * gain).round().clamp(0.0, 255.0) as u8;
        }
        out
    }

    /// Histogram-bin colors and return non-empty bins
    ///
    /// Sorted by pixel count descending; ties go to the lower mean lightness,
    /// then to the lower bin index.
    pub fn quantize<I>(pixels: I) -> Vec<ColorBin>
    where
        I: IntoIterator<Item = [u8; 3]>,
    {
        let bins = QUANT_LEVELS * QUANT_LEVELS * QUANT_LEVELS;
        let mut counts = vec![0u64; bins];
        let mut sums = vec![[0u64; 3]; bins];

        for rgb in pixels {
            let index = Self::bin_index(rgb);
            if let (Some(count), Some(sum)) = (counts.get_mut(index), sums.get_mut(index)) {
                *count += 1;
                for (s, v) in sum.iter_mut().zip(rgb.iter()) {
                    *s += u64::from(*v);
                }
            }
        }

        let mut out: Vec<ColorBin> = counts
            .iter()
            .zip(sums.iter())
            .enumerate()
            .filter(|(_, (count, _))| **count > 0)
            .map(|(index, (count, sum))| {
                let mean = |s: u64| ((s + count / 2) / count).min(255) as u8;
                ColorBin {
                    color: Color::new(mean(sum[0]), mean(sum[1]), mean(sum[2])),
                    count: *count,
                    index,
                }
            })
            .collect();

        out.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.color.lightness().total_cmp(&b.color.lightness()))
                .then_with(|| a.index.cmp(&b.index))
        });
        out
    }

    /// Count how many pixels are nearest to each center (squared RGB distance)
    ///
    /// Ties go to the earlier center.
    pub fn assign_to_nearest<I>(pixels: I, centers: &[Color]) -> Vec<u64>
    where
        I: IntoIterator<Item = [u8; 3]>,
    {
        let mut counts = vec![0u64; centers.len()];
        if centers.is_empty() {
            return counts;
        }
        for rgb in pixels {
            let mut best = (0usize, u32::MAX);
            for (i, c) in centers.iter().enumerate() {
                let dr = i32::from(rgb[0]) - i32::from(c.r);
                let dg = i32::from(rgb[1]) - i32::from(c.g);
                let db = i32::from(rgb[2]) - i32::from(c.b);
                let dist = (dr * dr + dg * dg + db * db) as u32;
                if dist < best.1 {
                    best = (i, dist);
                }
            }
            if let Some(count) = counts.get_mut(best.0) {
                *count += 1;
            }
        }
        counts
    }

    fn bin_index(rgb: [u8; 3]) -> usize {
        let shift = 8 - QUANT_BITS;
        let r = usize::from(rgb[0] >> shift);
        let g = usize::from(rgb[1] >> shift);
        let b = usize::from(rgb[2] >> shift);
        (r * QUANT_LEVELS + g) * QUANT_LEVELS + b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luminance_extremes() {
        assert_eq!(ColorSpaceOps::luma_u8(&Rgb([0, 0, 0])), 0);
        assert_eq!(ColorSpaceOps::luma_u8(&Rgb([255, 255, 255])), 255);
    }

    #[test]
    fn test_normalize_stretches_range() {
        let mut image = RgbImage::from_pixel(10, 10, Rgb([100, 100, 100]));
        for x in 0..10 {
            image.put_pixel(x, 0, Rgb([50, 50, 50]));
            image.put_pixel(x, 9, Rgb([150, 150, 150]));
        }
        let out = ColorSpaceOps::normalize(&image);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(0, 9)[0], 255);
        assert_eq!(out.get_pixel(5, 5)[0], 128);
    }

    #[test]
    fn test_normalize_uniform_is_noop() {
        let image = RgbImage::from_pixel(4, 4, Rgb([90, 120, 30]));
        assert_eq!(ColorSpaceOps::normalize(&image), image);
    }

    #[test]
    fn test_alpha_over() {
        let dst = Rgba([0, 0, 255, 255]);
        assert_eq!(ColorSpaceOps::alpha_over(dst, Rgba([255, 0, 0, 255])), Rgba([255, 0, 0, 255]));
        assert_eq!(ColorSpaceOps::alpha_over(dst, Rgba([255, 0, 0, 0])), dst);
        let half = ColorSpaceOps::alpha_over(dst, Rgba([255, 0, 0, 128]));
        assert_eq!(half[3], 255);
        assert!(half[0] > 120 && half[0] < 135);

        let empty = Rgba([0, 0, 0, 0]);
        assert_eq!(ColorSpaceOps::alpha_over(empty, Rgba([10, 20, 30, 200])), Rgba([10, 20, 30, 200]));
    }

    #[test]
    fn test_blend_onto() {
        let out = ColorSpaceOps::blend_onto(Rgb([0, 0, 0]), Rgba([200, 100, 50, 255]));
        assert_eq!(out, Rgb([200, 100, 50]));
        let out = ColorSpaceOps::blend_onto(Rgb([10, 10, 10]), Rgba([200, 100, 50, 0]));
        assert_eq!(out, Rgb([10, 10, 10]));
    }

    #[test]
    fn test_temperature_estimation_orders_warm_and_cool() {
        let warm = ColorSpaceOps::estimate_temperature([220.0, 160.0, 90.0]);
        let neutral = ColorSpaceOps::estimate_temperature([128.0, 128.0, 128.0]);
        let cool = ColorSpaceOps::estimate_temperature([140.0, 160.0, 210.0]);
        assert!(warm < neutral, "{warm} >= {neutral}");
        assert!(neutral < cool, "{neutral} >= {cool}");
        assert!((MIN_TEMPERATURE_K..=MAX_TEMPERATURE_K).contains(&warm));
        assert!((MIN_TEMPERATURE_K..=MAX_TEMPERATURE_K).contains(&cool));
    }

    #[test]
    fn test_temperature_gains_identity_and_direction() {
        let same = ColorSpaceOps::temperature_gains(5000, 5000);
        for g in same {
            assert!((g - 1.0).abs() < 1e-5);
        }
        let warmer = ColorSpaceOps::temperature_gains(6500, 3000);
        assert!(warmer[0] > warmer[2]);
        let cooler = ColorSpaceOps::temperature_gains(3000, 6500);
        assert!(cooler[2] > cooler[0]);
    }

    #[test]
    fn test_quantize_orders_by_count_then_lightness() {
        let mut pixels = vec![[250, 250, 250]; 3];
        pixels.extend(vec![[5, 5, 5]; 3]);
        pixels.extend(vec![[200, 0, 0]; 5]);
        let bins = ColorSpaceOps::quantize(pixels);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins[0].color, Color::new(200, 0, 0));
        assert_eq!(bins[0].count, 5);
        // equal counts: darker first
        assert_eq!(bins[1].color, Color::new(5, 5, 5));
        assert_eq!(bins[2].color, Color::new(250, 250, 250));
    }

    #[test]
    fn test_assign_to_nearest() {
        let centers = [Color::new(0, 0, 0), Color::new(255, 255, 255)];
        let counts =
            ColorSpaceOps::assign_to_nearest(vec![[10, 10, 10], [240, 240, 240], [20, 0, 0]], &centers);
        assert_eq!(counts, vec![2, 1]);
    }
}
