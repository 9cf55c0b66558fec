//! Services that sit beside the compositing stages
//!
//! - `format`: image encoding and decoding
//! - `progress`: stage progress reporting

pub mod format;
pub mod progress;

pub use format::OutputFormatHandler;
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
