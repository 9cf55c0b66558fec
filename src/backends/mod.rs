//! Perception backend implementations
//!
//! - `HeuristicPerception`: deterministic, no model weights (default)
//! - `test_utils`: mock backends with call recording and failure switches,
//!   behind the `test-utils` feature

pub mod heuristic;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use self::heuristic::HeuristicPerception;
