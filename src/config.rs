//! Configuration types for compositing operations

use crate::error::{CompositeError, Result};
use serde::{Deserialize, Serialize};

/// Surface the artwork should be placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceType {
    /// Hung on a vertical wall
    #[default]
    Wall,
    /// Standing on the floor
    Floor,
    /// Resting on a shelf
    Shelf,
    /// Above or on a fireplace mantel
    Fireplace,
}

impl SurfaceType {
    /// Whether a mirrored reflection makes physical sense on this surface
    #[must_use]
    pub fn supports_reflection(self) -> bool {
        matches!(self, Self::Floor | Self::Shelf)
    }
}

impl std::fmt::Display for SurfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wall => write!(f, "wall"),
            Self::Floor => write!(f, "floor"),
            Self::Shelf => write!(f, "shelf"),
            Self::Fireplace => write!(f, "fireplace"),
        }
    }
}

/// Lighting-match strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LightingMode {
    /// Use the room's measured temperature and intensity
    #[default]
    Match,
    /// Fixed warm preset
    Warm,
    /// Fixed cold preset
    Cold,
    /// Flattened shadows, neutral temperature, mid intensity
    Studio,
}

impl std::fmt::Display for LightingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Match => write!(f, "match"),
            Self::Warm => write!(f, "warm"),
            Self::Cold => write!(f, "cold"),
            Self::Studio => write!(f, "studio"),
        }
    }
}

/// Smallest accepted size multiplier, in percent
pub const MIN_SIZE_PERCENT: u32 = 10;
/// Largest accepted size multiplier, in percent
pub const MAX_SIZE_PERCENT: u32 = 200;

/// Per-request settings supplied alongside the two images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    /// Which candidate placements are eligible
    pub position: SurfaceType,
    /// Lighting-match strategy
    pub lighting: LightingMode,
    /// Render a soft drop shadow
    pub shadows: bool,
    /// Render a mirrored reflection (floor and shelf only)
    pub reflection: bool,
    /// Scale multiplier in percent, applied after placement selection
    pub size: u32,
    /// Additional rotation in degrees, applied after placement selection
    pub rotation: f32,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            position: SurfaceType::Wall,
            lighting: LightingMode::Match,
            shadows: true,
            reflection: false,
            size: 100,
            rotation: 0.0,
        }
    }
}

impl ProcessingSettings {
    /// Create a settings builder starting from the defaults
    #[must_use]
    pub fn builder() -> ProcessingSettingsBuilder {
        ProcessingSettingsBuilder::default()
    }

    /// Parse settings from a JSON document
    ///
    /// Missing fields take their defaults and an empty or blank document
    /// yields the default settings.
    ///
    /// ```rust
    /// use roomfit::{ProcessingSettings, SurfaceType};
    ///
    /// let settings = ProcessingSettings::from_json(r#"{"position":"floor","size":50}"#).unwrap();
    /// assert_eq!(settings.position, SurfaceType::Floor);
    /// assert_eq!(settings.size, 50);
    /// assert!(settings.shadows);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| CompositeError::invalid_input(format!("Malformed settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate ranges that serde cannot express
    ///
    /// # Errors
    /// - `size` outside 10-200
    /// - non-finite `rotation`
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SIZE_PERCENT..=MAX_SIZE_PERCENT).contains(&self.size) {
            return Err(CompositeError::config_value_error(
                "size",
                self.size,
                "10-200",
                Some(100),
            ));
        }
        if !self.rotation.is_finite() {
            return Err(CompositeError::invalid_input(
                "Invalid rotation: must be a finite number of degrees",
            ));
        }
        Ok(())
    }

    /// Scale multiplier as a fraction (100% == 1.0)
    #[must_use]
    pub fn size_factor(&self) -> f32 {
        self.size as f32 / 100.0
    }
}

/// Builder for `ProcessingSettings`
#[derive(Debug, Default)]
pub struct ProcessingSettingsBuilder {
    settings: ProcessingSettings,
}

impl ProcessingSettingsBuilder {
    #[must_use]
    pub fn position(mut self, position: SurfaceType) -> Self {
        self.settings.position = position;
        self
    }

    #[must_use]
    pub fn lighting(mut self, lighting: LightingMode) -> Self {
        self.settings.lighting = lighting;
        self
    }

    #[must_use]
    pub fn shadows(mut self, enabled: bool) -> Self {
        self.settings.shadows = enabled;
        self
    }

    #[must_use]
    pub fn reflection(mut self, enabled: bool) -> Self {
        self.settings.reflection = enabled;
        self
    }

    #[must_use]
    pub fn size(mut self, percent: u32) -> Self {
        self.settings.size = percent.clamp(MIN_SIZE_PERCENT, MAX_SIZE_PERCENT);
        self
    }

    #[must_use]
    pub fn rotation(mut self, degrees: f32) -> Self {
        self.settings.rotation = degrees;
        self
    }

    /// Build the settings
    ///
    /// # Errors
    /// - Non-finite rotation
    pub fn build(self) -> Result<ProcessingSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

/// Configuration for a `CompositingPipeline` instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rooms smaller than this on either side are rejected before any stage runs
    pub min_room_dimension: u32,
    /// Rooms are shrunk to fit inside this square
    pub room_max_dimension: u32,
    /// Artworks are shrunk to fit inside this square
    pub art_max_dimension: u32,
    /// Stretch room luminance to full range during preprocessing
    pub normalize_room: bool,
    /// JPEG quality used by result encoding helpers (0-100)
    pub jpeg_quality: u8,
    /// Enable debug mode (additional logging)
    pub debug: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_room_dimension: 512,
            room_max_dimension: 1024,
            art_max_dimension: 512,
            normalize_room: true,
            jpeg_quality: 90,
            debug: false,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Zero dimensions
    /// - Room maximum smaller than the room minimum
    /// - JPEG quality above 100
    pub fn validate(&self) -> Result<()> {
        if self.min_room_dimension == 0 || self.room_max_dimension == 0 {
            return Err(CompositeError::invalid_input(
                "Room dimension limits must be positive",
            ));
        }
        if self.art_max_dimension == 0 {
            return Err(CompositeError::invalid_input(
                "Artwork dimension limit must be positive",
            ));
        }
        if self.room_max_dimension < self.min_room_dimension {
            return Err(CompositeError::config_value_error(
                "room_max_dimension",
                self.room_max_dimension,
                &format!(">= min_room_dimension ({})", self.min_room_dimension),
                None,
            ));
        }
        if self.jpeg_quality > 100 {
            return Err(CompositeError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "0-100",
                Some(90),
            ));
        }
        Ok(())
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn min_room_dimension(mut self, pixels: u32) -> Self {
        self.config.min_room_dimension = pixels;
        self
    }

    #[must_use]
    pub fn room_max_dimension(mut self, pixels: u32) -> Self {
        self.config.room_max_dimension = pixels;
        self
    }

    #[must_use]
    pub fn art_max_dimension(mut self, pixels: u32) -> Self {
        self.config.art_max_dimension = pixels;
        self
    }

    #[must_use]
    pub fn normalize_room(mut self, enabled: bool) -> Self {
        self.config.normalize_room = enabled;
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.min(100);
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build the pipeline configuration
    ///
    /// # Errors
    /// - Any failure reported by `PipelineConfig::validate`
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
