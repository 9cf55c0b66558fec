//! Core types produced and consumed by the compositing stages

use crate::{
    config::SurfaceType,
    error::{CompositeError, Result},
};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use uuid::Uuid;

/// 8-bit sRGB color, serialized as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// HSL lightness in [0,1]
    #[must_use]
    pub fn lightness(&self) -> f32 {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        (f32::from(max) + f32::from(min)) / (2.0 * 255.0)
    }

    /// Parse `#RRGGBB` (leading `#` optional)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(CompositeError::invalid_input(format!(
                "Invalid color '{}': expected #RRGGBB",
                hex
            )));
        }
        let channel = |range: std::ops::Range<usize>| {
            digits
                .get(range)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| CompositeError::invalid_input(format!("Invalid color '{}'", hex)))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Point in normalized image coordinates, both axes in [0,1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WallOrientation {
    Left,
    Front,
    Right,
    Back,
    Floor,
    Ceiling,
}

impl WallOrientation {
    /// Walls artwork can hang on
    #[must_use]
    pub fn is_vertical(self) -> bool {
        matches!(self, Self::Left | Self::Front | Self::Right | Self::Back)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub orientation: WallOrientation,
    pub angle_degrees: f32,
}

/// Unit vector pointing from the image center toward the light, y grows downward
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightDirection {
    pub x: f32,
    pub y: f32,
}

impl LightDirection {
    /// Light from directly above
    pub const TOP: Self = Self { x: 0.0, y: -1.0 };

    /// Normalize `(x, y)`; degenerate vectors fall back to `TOP`
    #[must_use]
    pub fn from_vector(x: f32, y: f32) -> Self {
        let len = (x * x + y * y).sqrt();
        if !len.is_finite() || len < 1e-6 {
            return Self::TOP;
        }
        Self {
            x: x / len,
            y: y / len,
        }
    }

    /// Named octant such as `top-left`
    #[must_use]
    pub fn octant(&self) -> &'static str {
        const NAMES: [&str; 8] = [
            "right",
            "bottom-right",
            "bottom",
            "bottom-left",
            "left",
            "top-left",
            "top",
            "top-right",
        ];
        let angle = self.y.atan2(self.x).to_degrees();
        let sector = ((angle + 360.0 + 22.5) / 45.0).floor() as usize % 8;
        NAMES.get(sector).copied().unwrap_or("top")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lighting {
    pub direction: LightDirection,
    /// Mean luminance in [0,1]
    pub intensity: f32,
    pub color_temperature_kelvin: u32,
    pub has_shadows: bool,
    pub has_highlights: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Perspective {
    pub vanishing_point: NormalizedPoint,
    pub horizon_line: f32,
    pub distortion: f32,
}

impl Default for Perspective {
    fn default() -> Self {
        Self {
            vanishing_point: NormalizedPoint::new(0.5, 0.33),
            horizon_line: 0.4,
            distortion: 0.1,
        }
    }
}

/// Scored place where artwork could go
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidatePlacement {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub score: f32,
    /// Surface the candidate lies on, if the analyzer could tell
    pub surface: Option<SurfaceType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    #[default]
    LivingRoom,
    Bedroom,
    Office,
    Kitchen,
    DiningRoom,
    Hallway,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub dominant: Color,
    pub secondary: Color,
    pub accent: Color,
    pub palette: Vec<Color>,
}

/// Everything the analyzer learned about the room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomModel {
    pub walls: Vec<Wall>,
    pub lighting: Lighting,
    pub perspective: Perspective,
    /// Sorted descending by score
    pub candidate_placements: Vec<CandidatePlacement>,
    pub room_type: RoomType,
    pub color_scheme: ColorScheme,
}

impl RoomModel {
    #[must_use]
    pub fn walls_detected(&self) -> bool {
        !self.walls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArtworkType {
    #[default]
    Painting,
    Sculpture,
    Photograph,
    Print,
    Drawing,
    Unknown,
}

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Whether the box lies entirely inside a `width`x`height` image
    #[must_use]
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DominantColor {
    pub color: Color,
    pub percentage: f32,
}

/// Everything the segmenter learned about the artwork
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtworkModel {
    /// Opacity per pixel, same dimensions as the artwork
    #[serde(skip, default = "empty_mask")]
    pub alpha_mask: GrayImage,
    pub bounding_box: BoundingBox,
    pub aspect_ratio: f32,
    /// Sorted descending by percentage, percentages sum to 1.0
    pub dominant_colors: Vec<DominantColor>,
    pub artwork_type: ArtworkType,
    pub has_frame: bool,
    /// Fraction of pixels decisively classified as foreground or background
    pub mask_quality: f32,
}

fn empty_mask() -> GrayImage {
    GrayImage::new(0, 0)
}

/// How the placement was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementSource {
    /// Best candidate tagged with the requested surface
    SurfaceMatch,
    /// Best candidate regardless of surface
    BestAvailable,
    /// No candidates at all
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub rotation_degrees: f32,
    pub surface_type: SurfaceType,
    pub source: PlacementSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessingDetails {
    pub perspective_corrected: bool,
    /// Tint or gain actually changed artwork pixels
    pub lighting_matched: bool,
    pub shadows_added: bool,
    pub reflections_added: bool,
    pub position_type: SurfaceType,
    pub room_type: RoomType,
    pub artwork_type: ArtworkType,
}

/// Detailed timing breakdown in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub preprocessing_ms: u64,
    pub room_analysis_ms: u64,
    pub segmentation_ms: u64,
    pub placement_ms: u64,
    pub composition_ms: u64,
    pub total_ms: u64,
}

/// Outcome of one successful pipeline run
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub composite: DynamicImage,
    /// In [0, 0.99]
    pub confidence: f32,
    /// Wall-clock seconds rounded to one decimal place
    pub processing_time_seconds: f32,
    pub details: ProcessingDetails,
    pub placement: Placement,
    pub timings: ProcessingTimings,
    pub run_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

/// Serializable summary of a `ProcessingResult`, without pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub run_id: Uuid,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
    pub confidence_percent: u8,
    pub processing_time_seconds: f32,
    pub details: ProcessingDetails,
    pub placement: Placement,
    pub timings: ProcessingTimings,
    pub completed_at: DateTime<Utc>,
}

impl ProcessingResult {
    /// Confidence as a rounded integer percentage
    #[must_use]
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round().clamp(0.0, 100.0) as u8
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.composite.width(), self.composite.height())
    }

    /// Encode the composite as JPEG
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        crate::services::format::encode_jpeg(&self.composite, quality)
    }

    /// Save the composite as JPEG
    pub fn save_jpeg<P: AsRef<Path>>(&self, path: P, quality: u8) -> Result<()> {
        let bytes = self.to_jpeg_bytes(quality)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    #[must_use]
    pub fn report(&self) -> ProcessingReport {
        let (width, height) = self.dimensions();
        ProcessingReport {
            run_id: self.run_id,
            width,
            height,
            confidence: self.confidence,
            confidence_percent: self.confidence_percent(),
            processing_time_seconds: self.processing_time_seconds,
            details: self.details,
            placement: self.placement,
            timings: self.timings.clone(),
            completed_at: self.completed_at,
        }
    }
}
