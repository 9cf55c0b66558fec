//! Shared utilities used across the compositing stages
//!
//! - `colorspace`: per-pixel color operations
//! - `geometry`: homographies and quad math
//! - `preprocessing`: input normalization
//! - `validation`: image and map precondition checks

pub mod colorspace;
pub mod geometry;
pub mod preprocessing;
pub mod validation;

pub use colorspace::{ColorBin, ColorSpaceOps};
pub use geometry::{GeometryOps, Homography, Quad};
pub use preprocessing::{ImagePreprocessor, PreprocessingOptions};
pub use validation::{ImageValidator, TensorValidator};
