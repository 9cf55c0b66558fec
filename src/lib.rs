#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Roomfit
//!
//! Places a photograph of an artwork into a photograph of a room so the result
//! looks like the artwork is physically hanging on a wall, resting on a floor
//! or standing on a shelf.
//!
//! A run goes through six stages:
//!
//! 1. **Preprocessing**: validate, flatten alpha, downscale, normalize the room
//! 2. **Room analysis**: walls, perspective, lighting, color scheme, candidate spots
//! 3. **Segmentation**: foreground mask, bounding box, dominant colors, frame detection
//! 4. **Placement**: pick the best candidate for the requested surface
//! 5. **Composition**: perspective warp, lighting match, shadow, reflection, blend
//! 6. **Scoring**: a confidence value from a small additive rule
//!
//! Room analysis and segmentation run concurrently; everything else is
//! sequential. The perception capability (geometry estimation and foreground
//! segmentation) sits behind the `PerceptionBackend` trait and is loaded once
//! per process, on first use.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomfit::{composite_images_from_bytes, ProcessingSettings, SurfaceType};
//!
//! # async fn example(room: Vec<u8>, art: Vec<u8>) -> anyhow::Result<()> {
//! let settings = ProcessingSettings::builder()
//!     .position(SurfaceType::Wall)
//!     .size(80)
//!     .build()?;
//! let result = composite_images_from_bytes(&room, &art, &settings).await?;
//! println!("confidence {}%", result.confidence_percent());
//! result.save_jpeg("composite.jpg", 90)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom perception
//!
//! ```rust,no_run
//! use image::RgbImage;
//! use ndarray::Array2;
//! use roomfit::{
//!     CompositingPipeline, PerceptionBackend, Perspective, PipelineConfig, Result,
//!     RoomGeometry, Wall, WallOrientation,
//! };
//! use std::sync::Arc;
//!
//! /// Treats every room as a single front wall and every pixel as foreground
//! struct FrontWallOnly;
//!
//! impl PerceptionBackend for FrontWallOnly {
//!     fn name(&self) -> &str {
//!         "front-wall-only"
//!     }
//!
//!     fn estimate_room_geometry(&self, _room: &RgbImage) -> Result<RoomGeometry> {
//!         Ok(RoomGeometry {
//!             walls: vec![Wall {
//!                 orientation: WallOrientation::Front,
//!                 angle_degrees: 90.0,
//!             }],
//!             perspective: Perspective::default(),
//!         })
//!     }
//!
//!     fn segment_foreground(&self, artwork: &RgbImage) -> Result<Array2<f32>> {
//!         let (width, height) = artwork.dimensions();
//!         Ok(Array2::ones((height as usize, width as usize)))
//!     }
//! }
//!
//! # fn example() -> anyhow::Result<()> {
//! let pipeline =
//!     CompositingPipeline::with_backend(PipelineConfig::default(), Arc::new(FrontWallOnly))?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tracing-init` (default): subscriber setup helpers in `tracing_config`
//! - `tracing-json`: JSON output format for those helpers
//! - `test-utils`: mock perception backends in `backends::test_utils`

pub mod backends;
pub mod compositor;
pub mod config;
pub mod error;
pub mod perception;
pub mod placement;
pub mod processor;
pub mod room;
pub mod segmentation;
pub mod services;
#[cfg(feature = "tracing-init")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::HeuristicPerception;
pub use compositor::{Composition, Compositor, Layer};
pub use config::{LightingMode, PipelineConfig, ProcessingSettings, SurfaceType};
pub use error::{CompositeError, ErrorCategory, Result};
pub use perception::{
    shared_perception, DefaultPerceptionFactory, LazyPerception, PerceptionBackend,
    PerceptionFactory, RoomGeometry,
};
pub use placement::PlacementSelector;
pub use processor::{CompositeRequest, CompositingPipeline};
pub use room::RoomAnalyzer;
pub use segmentation::ArtworkSegmenter;
pub use services::{
    ConsoleProgressReporter, NoOpProgressReporter, OutputFormatHandler, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use types::{
    ArtworkModel, ArtworkType, BoundingBox, CandidatePlacement, Color, ColorScheme,
    DominantColor, LightDirection, Lighting, NormalizedPoint, Perspective, Placement,
    PlacementSource, ProcessingDetails, ProcessingReport, ProcessingResult, ProcessingTimings,
    RoomModel, RoomType, Wall, WallOrientation,
};
pub use utils::{ImagePreprocessor, PreprocessingOptions};

#[cfg(feature = "tracing-init")]
pub use tracing_config::{init_library_tracing, TracingConfig, TracingFormat};

/// Composite an artwork into a room, both given as encoded bytes
///
/// Uses the default pipeline configuration and the process-wide perception
/// backend. Suitable for request handlers that receive uploads.
///
/// # Errors
/// - `InvalidInput` for empty or undecodable buffers and out-of-range settings
/// - `InvalidImage` for rooms below 512 pixels on either side
/// - `SegmentationFailed`, `PerceptionUnavailable` or `PipelineFailure` from the run
pub async fn composite_images_from_bytes(
    room_bytes: &[u8],
    artwork_bytes: &[u8],
    settings: &ProcessingSettings,
) -> Result<ProcessingResult> {
    let pipeline = CompositingPipeline::new(PipelineConfig::default())?;
    pipeline.run_bytes(room_bytes, artwork_bytes, settings).await
}

/// Composite an already decoded artwork into an already decoded room
///
/// # Errors
/// Same as `composite_images_from_bytes`, minus decoding failures.
pub async fn composite_images(
    room: &image::DynamicImage,
    artwork: &image::DynamicImage,
    settings: &ProcessingSettings,
) -> Result<ProcessingResult> {
    let pipeline = CompositingPipeline::new(PipelineConfig::default())?;
    pipeline.run(room, artwork, settings).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_bytes_rejected() {
        let err = composite_images_from_bytes(&[], &[], &ProcessingSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CompositeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_garbage_bytes_rejected() {
        let err = composite_images_from_bytes(
            b"not an image",
            b"also not an image",
            &ProcessingSettings::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CompositeError::InvalidInput(_)));
    }
}
