//! Compositing pipeline controller
//!
//! `CompositingPipeline` owns the end-to-end run: input gate, preprocessing,
//! the two concurrent analysis branches, placement, composition and
//! confidence scoring. Every failure leaves the run with one of the
//! `CompositeError` taxonomy kinds; no partial result is ever returned.

use crate::{
    compositor::{confidence, Compositor},
    config::{PipelineConfig, ProcessingSettings},
    error::{CompositeError, Result},
    perception::{
        shared_perception, LazyPerception, PerceptionBackend, PerceptionFactory,
    },
    placement::PlacementSelector,
    room::RoomAnalyzer,
    segmentation::ArtworkSegmenter,
    services::{
        format::OutputFormatHandler, NoOpProgressReporter, ProcessingStage, ProgressReporter,
        ProgressTracker,
    },
    types::{ArtworkModel, ProcessingResult, ProcessingTimings, RoomModel},
    utils::{preprocessing::ImagePreprocessor, validation::ImageValidator},
};
use chrono::Utc;
use image::{DynamicImage, RgbImage};
use instant::{Duration, Instant};
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, info, instrument, span, warn, Level};
use uuid::Uuid;

/// One request as it arrives from a caller; either image may be missing
#[derive(Debug, Clone, Default)]
pub struct CompositeRequest {
    pub room: Option<DynamicImage>,
    pub artwork: Option<DynamicImage>,
    pub settings: ProcessingSettings,
}

/// Where the pipeline gets its perception backend from
enum PerceptionSource {
    /// The process-wide handle
    Shared,
    /// A handle owned by this pipeline
    Owned(LazyPerception),
}

/// End-to-end compositing pipeline
///
/// Holds no per-request state, so one instance can serve concurrent runs.
pub struct CompositingPipeline {
    config: PipelineConfig,
    perception: PerceptionSource,
    reporter: Arc<dyn ProgressReporter>,
}

impl CompositingPipeline {
    /// Create a pipeline backed by the process-wide perception handle
    ///
    /// # Errors
    /// - Invalid pipeline configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::build(config, PerceptionSource::Shared)
    }

    /// Create a pipeline that loads its own backend through `factory` on first use
    ///
    /// # Errors
    /// - Invalid pipeline configuration
    pub fn with_factory(config: PipelineConfig, factory: Arc<dyn PerceptionFactory>) -> Result<Self> {
        Self::build(
            config,
            PerceptionSource::Owned(LazyPerception::new(factory)),
        )
    }

    /// Create a pipeline around an already loaded backend
    ///
    /// # Errors
    /// - Invalid pipeline configuration
    pub fn with_backend(config: PipelineConfig, backend: Arc<dyn PerceptionBackend>) -> Result<Self> {
        Self::build(
            config,
            PerceptionSource::Owned(LazyPerception::ready(backend)),
        )
    }

    fn build(config: PipelineConfig, perception: PerceptionSource) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            perception,
            reporter: Arc::new(NoOpProgressReporter),
        })
    }

    /// Report stage progress to `reporter`
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn perception(&self) -> Result<Arc<dyn PerceptionBackend>> {
        match &self.perception {
            PerceptionSource::Shared => shared_perception().await,
            PerceptionSource::Owned(lazy) => lazy.get().await,
        }
    }

    /// Run a request whose images may be missing
    ///
    /// # Errors
    /// - `InvalidInput` when either image is absent
    /// - Everything `run` can return
    pub async fn process_request(&self, request: &CompositeRequest) -> Result<ProcessingResult> {
        let (Some(room), Some(artwork)) = (request.room.as_ref(), request.artwork.as_ref()) else {
            return Err(CompositeError::invalid_input(
                "Both room and artwork images are required",
            ));
        };
        self.run(room, artwork, &request.settings).await
    }

    /// Run the pipeline on encoded image bytes
    ///
    /// # Errors
    /// - `InvalidInput` for empty or undecodable buffers
    /// - Everything `run` can return
    pub async fn run_bytes(
        &self,
        room_bytes: &[u8],
        artwork_bytes: &[u8],
        settings: &ProcessingSettings,
    ) -> Result<ProcessingResult> {
        if room_bytes.is_empty() || artwork_bytes.is_empty() {
            return Err(CompositeError::invalid_input(
                "Both room and artwork images are required",
            ));
        }
        let room = OutputFormatHandler::decode("Room", room_bytes)?;
        let artwork = OutputFormatHandler::decode("Artwork", artwork_bytes)?;
        self.run(&room, &artwork, settings).await
    }

    /// Composite `artwork` into `room`
    ///
    /// # Errors
    /// - `InvalidInput` for out-of-range settings
    /// - `InvalidImage` when the room is below the minimum size or either
    ///   image has fewer than 3 channels; checked before any stage runs
    /// - `PerceptionUnavailable` when the perception backend cannot be loaded
    ///   or reached
    /// - `SegmentationFailed` when the artwork has no foreground
    /// - `PipelineFailure` for anything unexpected, naming the stage
    #[instrument(
        skip_all,
        fields(
            run_id = tracing::field::Empty,
            room = %format!("{}x{}", room.width(), room.height()),
            artwork = %format!("{}x{}", artwork.width(), artwork.height()),
            position = %settings.position,
            lighting = %settings.lighting
        )
    )]
    pub async fn run(
        &self,
        room: &DynamicImage,
        artwork: &DynamicImage,
        settings: &ProcessingSettings,
    ) -> Result<ProcessingResult> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        match self.run_stages(run_id, room, artwork, settings, &mut tracker).await {
            Ok(result) => {
                tracker.report_stage(ProcessingStage::Completed);
                tracker.report_completion(&result.timings);
                info!(
                    confidence = result.confidence,
                    seconds = result.processing_time_seconds,
                    "Compositing finished"
                );
                Ok(result)
            },
            Err(e) => {
                tracker.report_error(&e.to_string());
                warn!(error = %e, category = ?e.category(), "Compositing failed");
                Err(e)
            },
        }
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        room: &DynamicImage,
        artwork: &DynamicImage,
        settings: &ProcessingSettings,
        tracker: &mut ProgressTracker,
    ) -> Result<ProcessingResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        settings.validate()?;

        // Input gate runs before anything else, perception included
        ImageValidator::validate_color_image("Room", room)?;
        ImageValidator::validate_room_size(room, self.config.min_room_dimension)?;
        ImageValidator::validate_color_image("Artwork", artwork)?;

        tracker.report_stage(ProcessingStage::Initialization);
        let perception = self.perception().await?;

        tracker.report_stage(ProcessingStage::Preprocessing);
        let (room_rgb, art_rgb) = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            let start = Instant::now();
            let room_rgb = ImagePreprocessor::preprocess_room(room, &self.config)
                .map_err(|e| e.in_stage(ProcessingStage::Preprocessing.name()))?;
            let art_rgb = ImagePreprocessor::preprocess_artwork(artwork, &self.config)
                .map_err(|e| e.in_stage(ProcessingStage::Preprocessing.name()))?;
            timings.preprocessing_ms = start.elapsed().as_millis() as u64;
            (Arc::new(room_rgb), Arc::new(art_rgb))
        };

        tracker.report_stage_with_description(
            ProcessingStage::RoomAnalysis,
            "Analyzing room and segmenting artwork".to_string(),
        );
        let ((room_model, room_time), (art_model, art_time)) =
            Self::analyze_concurrently(&perception, &room_rgb, &art_rgb).await?;
        timings.room_analysis_ms = room_time.as_millis() as u64;
        timings.segmentation_ms = art_time.as_millis() as u64;

        if self.config.debug {
            debug!(
                walls = ?room_model.walls,
                lighting = ?room_model.lighting,
                perspective = ?room_model.perspective,
                candidates = ?room_model.candidate_placements,
                bbox = ?art_model.bounding_box,
                dominant_colors = ?art_model.dominant_colors,
                "Analysis details"
            );
        }

        tracker.report_stage(ProcessingStage::Placement);
        let placement_start = Instant::now();
        let placement = PlacementSelector::select(&room_model, &art_model, settings);
        timings.placement_ms = placement_start.elapsed().as_millis() as u64;

        tracker.report_stage(ProcessingStage::Composition);
        let composition_start = Instant::now();
        let composition = {
            let room_rgb = Arc::clone(&room_rgb);
            let art_rgb = Arc::clone(&art_rgb);
            let settings = settings.clone();
            tokio::task::spawn_blocking(move || {
                Compositor::compose(
                    &room_rgb,
                    &room_model,
                    &art_rgb,
                    &art_model,
                    &placement,
                    &settings,
                )
            })
            .await
            .map_err(|e| Self::worker_failure(ProcessingStage::Composition, &e))?
            .map_err(|e| e.in_stage(ProcessingStage::Composition.name()))?
        };
        timings.composition_ms = composition_start.elapsed().as_millis() as u64;

        let elapsed = total_start.elapsed();
        timings.total_ms = elapsed.as_millis() as u64;

        Ok(ProcessingResult {
            composite: DynamicImage::ImageRgb8(composition.image),
            confidence: confidence(&composition.confidence_inputs, elapsed),
            processing_time_seconds: Self::round_seconds(elapsed),
            details: composition.details,
            placement,
            timings,
            run_id,
            completed_at: Utc::now(),
        })
    }

    /// Room analysis and segmentation as two concurrent blocking tasks
    async fn analyze_concurrently(
        perception: &Arc<dyn PerceptionBackend>,
        room: &Arc<RgbImage>,
        artwork: &Arc<RgbImage>,
    ) -> Result<((RoomModel, Duration), (ArtworkModel, Duration))> {
        let room_task = {
            let analyzer = RoomAnalyzer::new(Arc::clone(perception));
            let room = Arc::clone(room);
            tokio::task::spawn_blocking(move || {
                let start = Instant::now();
                analyzer.analyze(&room).map(|model| (model, start.elapsed()))
            })
        };
        let art_task = {
            let segmenter = ArtworkSegmenter::new(Arc::clone(perception));
            let artwork = Arc::clone(artwork);
            tokio::task::spawn_blocking(move || {
                let start = Instant::now();
                segmenter.segment(&artwork).map(|model| (model, start.elapsed()))
            })
        };

        let (room_result, art_result) = futures::future::try_join(room_task, art_task)
            .await
            .map_err(|e| Self::worker_failure(ProcessingStage::RoomAnalysis, &e))?;
        let room = room_result.map_err(|e| e.in_stage(ProcessingStage::RoomAnalysis.name()))?;
        let art = art_result.map_err(|e| e.in_stage(ProcessingStage::Segmentation.name()))?;
        Ok((room, art))
    }

    fn worker_failure(stage: ProcessingStage, error: &JoinError) -> CompositeError {
        CompositeError::pipeline_failure(stage.name(), format!("worker task failed: {}", error))
    }

    fn round_seconds(elapsed: Duration) -> f32 {
        ((elapsed.as_secs_f64() * 10.0).round() / 10.0) as f32
    }

    /// Room analysis on its own
    ///
    /// Applies the same input gate and preprocessing as `run`.
    ///
    /// # Errors
    /// - `InvalidImage` for rooms below the minimum size or without color
    /// - `PerceptionUnavailable` when the backend cannot be reached
    #[instrument(skip_all, fields(room = %format!("{}x{}", room.width(), room.height())))]
    pub async fn analyze_room(&self, room: &DynamicImage) -> Result<RoomModel> {
        ImageValidator::validate_color_image("Room", room)?;
        ImageValidator::validate_room_size(room, self.config.min_room_dimension)?;
        let perception = self.perception().await?;
        let room_rgb = ImagePreprocessor::preprocess_room(room, &self.config)
            .map_err(|e| e.in_stage(ProcessingStage::Preprocessing.name()))?;

        tokio::task::spawn_blocking(move || RoomAnalyzer::new(perception).analyze(&room_rgb))
            .await
            .map_err(|e| Self::worker_failure(ProcessingStage::RoomAnalysis, &e))?
            .map_err(|e| e.in_stage(ProcessingStage::RoomAnalysis.name()))
    }

    /// Artwork segmentation on its own
    ///
    /// # Errors
    /// - `InvalidImage` for artwork without color
    /// - `SegmentationFailed` when no foreground is found
    /// - `PerceptionUnavailable` when the backend cannot be reached
    #[instrument(skip_all, fields(artwork = %format!("{}x{}", artwork.width(), artwork.height())))]
    pub async fn segment_artwork(&self, artwork: &DynamicImage) -> Result<ArtworkModel> {
        ImageValidator::validate_color_image("Artwork", artwork)?;
        let perception = self.perception().await?;
        let art_rgb = ImagePreprocessor::preprocess_artwork(artwork, &self.config)
            .map_err(|e| e.in_stage(ProcessingStage::Preprocessing.name()))?;

        tokio::task::spawn_blocking(move || ArtworkSegmenter::new(perception).segment(&art_rgb))
            .await
            .map_err(|e| Self::worker_failure(ProcessingStage::Segmentation, &e))?
            .map_err(|e| e.in_stage(ProcessingStage::Segmentation.name()))
    }

    /// Composite several artworks into one room, strictly one after another
    ///
    /// Results come back in input order; a failed item does not stop the batch.
    pub async fn run_batch(
        &self,
        room: &DynamicImage,
        artworks: &[(String, DynamicImage)],
        settings: &ProcessingSettings,
    ) -> Vec<(String, Result<ProcessingResult>)> {
        let total = artworks.len();
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        let mut results = Vec::with_capacity(total);

        for (index, (id, artwork)) in artworks.iter().enumerate() {
            tracker.report_stage_with_description(
                ProcessingStage::BatchItemProcessing,
                format!("Processing {} ({}/{})", id, index + 1, total),
            );
            let result = self.run(room, artwork, settings).await;
            if let Err(e) = &result {
                debug!(item = %id, error = %e, "Batch item failed");
            }
            results.push((id.clone(), result));
        }

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(total, failed, "Batch finished");
        results
    }

    /// Encode a result's composite as JPEG at the configured quality
    pub fn encode_jpeg(&self, result: &ProcessingResult) -> Result<Vec<u8>> {
        result.to_jpeg_bytes(self.config.jpeg_quality)
    }
}
