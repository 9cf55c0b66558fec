//! Shape and value checks for perception output maps

use crate::error::{CompositeError, Result};
use ndarray::Array2;

/// Validator for maps returned by a perception backend
pub struct TensorValidator;

impl TensorValidator {
    /// A foreground map must be `height x width` and finite everywhere
    pub fn validate_foreground_map(map: &Array2<f32>, width: u32, height: u32) -> Result<()> {
        let (rows, cols) = map.dim();
        if rows != height as usize || cols != width as usize {
            return Err(CompositeError::internal(format!(
                "Foreground map shape mismatch. Expected [{}, {}], got [{}, {}]",
                height, width, rows, cols
            )));
        }
        if let Some(bad) = map.iter().find(|v| !v.is_finite()) {
            return Err(CompositeError::internal(format!(
                "Foreground map contains non-finite value {}",
                bad
            )));
        }
        Ok(())
    }
}
