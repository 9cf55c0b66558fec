//! Progress reporting service
//!
//! Keeps progress reporting out of the stage logic so embedding applications
//! can surface pipeline progress however they like.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::Arc;

/// Progress stages during a compositing run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Loading the perception capability
    Initialization,
    /// Validating and resizing inputs
    Preprocessing,
    /// Analyzing room geometry, lighting and palette
    RoomAnalysis,
    /// Extracting the artwork foreground
    Segmentation,
    /// Choosing where the artwork goes
    Placement,
    /// Warping, lighting and blending the artwork
    Composition,
    /// Processing completed
    Completed,
    /// Processing one request of a batch
    BatchItemProcessing,
}

impl ProcessingStage {
    /// Stable stage name used in errors and logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ProcessingStage::Initialization => "initialization",
            ProcessingStage::Preprocessing => "preprocessing",
            ProcessingStage::RoomAnalysis => "room_analysis",
            ProcessingStage::Segmentation => "segmentation",
            ProcessingStage::Placement => "placement",
            ProcessingStage::Composition => "composition",
            ProcessingStage::Completed => "completed",
            ProcessingStage::BatchItemProcessing => "batch_item",
        }
    }

    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Initialization => "Loading perception backend",
            ProcessingStage::Preprocessing => "Preprocessing images",
            ProcessingStage::RoomAnalysis => "Analyzing room",
            ProcessingStage::Segmentation => "Segmenting artwork",
            ProcessingStage::Placement => "Selecting placement",
            ProcessingStage::Composition => "Compositing artwork into room",
            ProcessingStage::Completed => "Processing completed",
            ProcessingStage::BatchItemProcessing => "Processing batch item",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Initialization => 5,
            ProcessingStage::Preprocessing => 15,
            // Room analysis and segmentation run concurrently
            ProcessingStage::RoomAnalysis | ProcessingStage::Segmentation => 40,
            ProcessingStage::Placement => 65,
            ProcessingStage::Composition => 80,
            ProcessingStage::Completed => 100,
            ProcessingStage::BatchItemProcessing => 50,
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }

    /// Create a progress update with custom description
    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
            description,
        }
    }
}

/// Trait for reporting progress during compositing runs
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Progress reporter that writes through the `log` facade
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to show per-stage timings
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        log::info!("Compositing completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  Detailed timings:");
            log::info!("    Preprocessing: {}ms", timings.preprocessing_ms);
            log::info!("    Room analysis: {}ms", timings.room_analysis_ms);
            log::info!("    Segmentation: {}ms", timings.segmentation_ms);
            log::info!("    Placement: {}ms", timings.placement_ms);
            log::info!("    Composition: {}ms", timings.composition_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("Error during {}: {}", stage.description(), error);
    }
}

/// Per-run progress tracker
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Create a progress tracker with no-op reporter
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    /// Create a progress tracker with console reporter
    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Arc::new(ConsoleProgressReporter::new(verbose)))
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report progress with custom description
    pub fn report_stage_with_description(&mut self, stage: ProcessingStage, description: String) {
        self.current_stage = Some(stage);
        self.reporter.report_progress(ProgressUpdate::with_description(
            stage,
            description,
            self.start_time,
        ));
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: &ProcessingTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error against the most recent stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Initialization);
        self.reporter.report_error(stage, error);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Get the current processing stage
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Test progress reporter that captures reports for verification
    #[derive(Default)]
    struct TestProgressReporter {
        progress_updates: Mutex<Vec<ProgressUpdate>>,
        completions: Mutex<Vec<ProcessingTimings>>,
        errors: Mutex<Vec<(ProcessingStage, String)>>,
    }

    impl ProgressReporter for TestProgressReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.progress_updates.lock().unwrap().push(update);
        }

        fn report_completion(&self, timings: &ProcessingTimings) {
            self.completions.lock().unwrap().push(timings.clone());
        }

        fn report_error(&self, stage: ProcessingStage, error: &str) {
            self.errors.lock().unwrap().push((stage, error.to_string()));
        }
    }

    #[test]
    fn test_stage_progress_is_monotonic_along_the_run() {
        let order = [
            ProcessingStage::Initialization,
            ProcessingStage::Preprocessing,
            ProcessingStage::RoomAnalysis,
            ProcessingStage::Placement,
            ProcessingStage::Composition,
            ProcessingStage::Completed,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].progress_percentage() < pair[1].progress_percentage());
        }
        assert_eq!(ProcessingStage::Completed.progress_percentage(), 100);
    }

    #[test]
    fn test_stage_names_are_distinct() {
        let stages = [
            ProcessingStage::Initialization,
            ProcessingStage::Preprocessing,
            ProcessingStage::RoomAnalysis,
            ProcessingStage::Segmentation,
            ProcessingStage::Placement,
            ProcessingStage::Composition,
            ProcessingStage::Completed,
            ProcessingStage::BatchItemProcessing,
        ];
        let mut names: Vec<_> = stages.iter().map(ProcessingStage::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), stages.len());
        assert_eq!(ProcessingStage::RoomAnalysis.to_string(), "room_analysis");
    }

    #[test]
    fn test_tracker_forwards_to_reporter() {
        let reporter = Arc::new(TestProgressReporter::default());
        let mut tracker = ProgressTracker::new(reporter.clone());

        tracker.report_stage(ProcessingStage::Preprocessing);
        tracker.report_stage_with_description(
            ProcessingStage::Composition,
            "Custom description".to_string(),
        );
        tracker.report_error("boom");
        tracker.report_completion(&ProcessingTimings::default());

        let updates = reporter.progress_updates.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].stage, ProcessingStage::Preprocessing);
        assert_eq!(updates[1].description, "Custom description");

        let errors = reporter.errors.lock().unwrap();
        assert_eq!(errors[0], (ProcessingStage::Composition, "boom".to_string()));
        assert_eq!(reporter.completions.lock().unwrap().len(), 1);
        assert_eq!(tracker.current_stage(), Some(ProcessingStage::Composition));
    }

    #[test]
    fn test_error_before_any_stage_defaults_to_initialization() {
        let reporter = Arc::new(TestProgressReporter::default());
        let tracker = ProgressTracker::new(reporter.clone());
        tracker.report_error("early");
        assert_eq!(
            reporter.errors.lock().unwrap()[0].0,
            ProcessingStage::Initialization
        );
    }

    #[test]
    fn test_builtin_reporters_accept_updates() {
        let start = Instant::now();
        for tracker in [ProgressTracker::no_op(), ProgressTracker::console(true)] {
            let mut tracker = tracker;
            tracker.report_stage(ProcessingStage::RoomAnalysis);
            tracker.report_completion(&ProcessingTimings::default());
        }
        let update = ProgressUpdate::new(ProcessingStage::Placement, start);
        assert_eq!(update.progress, 65);
    }
}
