//! Input validation utilities
//!
//! Image preconditions checked before and between stages, and shape checks
//! for maps returned by the perception capability.

pub mod input;
pub mod tensor;

pub use self::input::ImageValidator;
pub use self::tensor::TensorValidator;
