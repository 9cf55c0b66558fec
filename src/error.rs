//! Error types for compositing operations

use thiserror::Error;

/// Result type alias for compositing operations
pub type Result<T> = std::result::Result<T, CompositeError>;

/// How a failure should be surfaced to whoever called the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller supplied something unusable (4xx-equivalent, not retried)
    CallerError,
    /// A dependency was temporarily unreachable (5xx-equivalent, safe to retry)
    Transient,
    /// Unexpected failure inside a stage (5xx-equivalent, not retried)
    Internal,
}

/// Error taxonomy for the compositing pipeline
#[derive(Error, Debug)]
pub enum CompositeError {
    /// Missing or malformed images or settings
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Dimensions or channel layout fail a stage's precondition
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Artwork has no extractable foreground
    #[error("Segmentation failed: {0}")]
    SegmentationFailed(String),

    /// Perception capability could not be reached or initialized
    #[error("Perception unavailable: {0}")]
    PerceptionUnavailable(String),

    /// Unexpected failure inside a named stage
    #[error("Pipeline failure in stage '{stage}': {message}")]
    PipelineFailure { stage: String, message: String },

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding or decoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompositeError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new invalid image error
    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new segmentation failure
    pub fn segmentation_failed<S: Into<String>>(msg: S) -> Self {
        Self::SegmentationFailed(msg.into())
    }

    /// Create a new perception unavailable error
    pub fn perception_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::PerceptionUnavailable(msg.into())
    }

    /// Create a new pipeline failure for the given stage
    pub fn pipeline_failure<S: Into<String>, M: Into<String>>(stage: S, msg: M) -> Self {
        Self::PipelineFailure {
            stage: stage.into(),
            message: msg.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an image precondition error with the offending dimensions
    pub fn image_dimension_error(
        role: &str,
        dimensions: (u32, u32),
        channels: u8,
        requirement: &str,
    ) -> Self {
        Self::InvalidImage(format!(
            "{} image {}x{} with {} channel(s) rejected: {}",
            role, dimensions.0, dimensions.1, channels, requirement
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidInput(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Attach stage context
    ///
    /// Taxonomy kinds pass through unchanged; anything lower-level becomes a
    /// `PipelineFailure` naming the stage.
    #[must_use]
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            Self::InvalidInput(_)
            | Self::InvalidImage(_)
            | Self::SegmentationFailed(_)
            | Self::PerceptionUnavailable(_)
            | Self::PipelineFailure { .. } => self,
            other => Self::pipeline_failure(stage, other.to_string()),
        }
    }

    /// Classify the error for the caller
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) | Self::InvalidImage(_) | Self::SegmentationFailed(_) => {
                ErrorCategory::CallerError
            },
            Self::PerceptionUnavailable(_) => ErrorCategory::Transient,
            Self::PipelineFailure { .. } | Self::Io(_) | Self::Image(_) | Self::Internal(_) => {
                ErrorCategory::Internal
            },
        }
    }

    /// Whether the caller may retry the same request unchanged
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}
