//! Mock perception backends for tests and benchmarks
//!
//! These let the pipeline be exercised without any real perception capability,
//! with switches for the failure modes the pipeline has to handle.

use crate::{
    error::{CompositeError, Result},
    perception::{PerceptionBackend, PerceptionFactory, RoomGeometry},
    types::{Perspective, Wall, WallOrientation},
};
use async_trait::async_trait;
use image::RgbImage;
use ndarray::Array2;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// Mock perception backend
///
/// Reports four vertical walls and segments a centered rectangle covering
/// 80% of each dimension.
#[derive(Debug, Clone)]
pub struct MockPerception {
    walls: Vec<Wall>,
    perspective: Perspective,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    /// Whether to simulate an unreachable capability
    should_fail: bool,
    /// Whether segmentation returns an all-background map
    empty_foreground: bool,
}

impl MockPerception {
    /// Create a new mock backend with four detected walls
    #[must_use]
    pub fn new() -> Self {
        let walls = [
            WallOrientation::Left,
            WallOrientation::Front,
            WallOrientation::Right,
            WallOrientation::Back,
        ]
        .into_iter()
        .map(|orientation| Wall {
            orientation,
            angle_degrees: 90.0,
        })
        .collect();
        Self {
            walls,
            perspective: Perspective::default(),
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail: false,
            empty_foreground: false,
        }
    }

    /// Mock that detects no surfaces at all
    #[must_use]
    pub fn without_walls() -> Self {
        let mut backend = Self::new();
        backend.walls.clear();
        backend
    }

    /// Mock that also detects a floor
    #[must_use]
    pub fn with_floor() -> Self {
        let mut backend = Self::new();
        backend.walls.push(Wall {
            orientation: WallOrientation::Floor,
            angle_degrees: 0.0,
        });
        backend
    }

    /// Mock whose every call fails with `PerceptionUnavailable`
    #[must_use]
    pub fn unavailable() -> Self {
        let mut backend = Self::new();
        backend.should_fail = true;
        backend
    }

    /// Mock whose segmentation finds nothing
    #[must_use]
    pub fn with_empty_foreground() -> Self {
        let mut backend = Self::new();
        backend.empty_foreground = true;
        backend
    }

    /// Override the reported perspective
    #[must_use]
    pub fn with_perspective(mut self, perspective: Perspective) -> Self {
        self.perspective = perspective;
        self
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.should_fail {
            return Err(CompositeError::perception_unavailable(
                "Mock perception backend is offline",
            ));
        }
        Ok(())
    }
}

impl Default for MockPerception {
    fn default() -> Self {
        Self::new()
    }
}

impl PerceptionBackend for MockPerception {
    fn name(&self) -> &str {
        "mock"
    }

    fn estimate_room_geometry(&self, _room: &RgbImage) -> Result<RoomGeometry> {
        self.record_call("estimate_room_geometry");
        self.check_available()?;
        Ok(RoomGeometry {
            walls: self.walls.clone(),
            perspective: self.perspective,
        })
    }

    fn segment_foreground(&self, artwork: &RgbImage) -> Result<Array2<f32>> {
        self.record_call("segment_foreground");
        self.check_available()?;

        let (width, height) = (artwork.width() as usize, artwork.height() as usize);
        if self.empty_foreground {
            return Ok(Array2::zeros((height, width)));
        }
        let (x0, x1) = (width / 10, width - width / 10);
        let (y0, y1) = (height / 10, height - height / 10);
        Ok(Array2::from_shape_fn((height, width), |(y, x)| {
            if (y0..y1).contains(&y) && (x0..x1).contains(&x) {
                1.0
            } else {
                0.0
            }
        }))
    }
}

/// Factory that counts loads and can fail the first few
pub struct MockPerceptionFactory {
    loads: AtomicUsize,
    failures_left: AtomicUsize,
}

impl MockPerceptionFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    /// Fail the first `count` loads
    #[must_use]
    pub fn failing_first(count: usize) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(count),
        }
    }

    /// Number of load attempts so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl Default for MockPerceptionFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PerceptionFactory for MockPerceptionFactory {
    async fn load(&self) -> Result<Arc<dyn PerceptionBackend>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CompositeError::internal("Mock model weights missing"));
        }
        Ok(Arc::new(MockPerception::new()))
    }
}
