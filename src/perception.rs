//! Perception capability abstraction and process-wide handle
//!
//! Room geometry and foreground separation come from a `PerceptionBackend`.
//! The pipeline makes no assumption about how a backend arrives at its answers;
//! a deterministic heuristic and a trained model sit behind the same trait.

use crate::{
    error::{CompositeError, Result},
    types::{ArtworkType, Perspective, RoomType, Wall},
};
use async_trait::async_trait;
use image::RgbImage;
use ndarray::Array2;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Geometry estimate for a room photograph
#[derive(Debug, Clone, PartialEq)]
pub struct RoomGeometry {
    /// Empty when no surfaces could be detected
    pub walls: Vec<Wall>,
    pub perspective: Perspective,
}

/// Trait for perception backends
///
/// Implementations must be safe to share read-only between concurrent runs.
pub trait PerceptionBackend: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Detect walls and estimate perspective
    ///
    /// # Errors
    /// - `PerceptionUnavailable` when the backend cannot serve requests
    fn estimate_room_geometry(&self, room: &RgbImage) -> Result<RoomGeometry>;

    /// Foreground probability per pixel, shape `(height, width)`, values in [0,1]
    ///
    /// # Errors
    /// - `PerceptionUnavailable` when the backend cannot serve requests
    fn segment_foreground(&self, artwork: &RgbImage) -> Result<Array2<f32>>;

    /// Classify the kind of room
    fn classify_room(&self, _room: &RgbImage) -> RoomType {
        RoomType::LivingRoom
    }

    /// Classify the kind of artwork
    fn classify_artwork(&self, _artwork: &RgbImage, _has_frame: bool) -> ArtworkType {
        ArtworkType::Painting
    }
}

/// Factory trait for loading perception backends
#[async_trait]
pub trait PerceptionFactory: Send + Sync {
    /// Load a ready-to-use backend
    ///
    /// # Errors
    /// Any error here is reported to callers as `PerceptionUnavailable`.
    async fn load(&self) -> Result<Arc<dyn PerceptionBackend>>;
}

/// Default factory producing the heuristic backend
pub struct DefaultPerceptionFactory;

#[async_trait]
impl PerceptionFactory for DefaultPerceptionFactory {
    async fn load(&self) -> Result<Arc<dyn PerceptionBackend>> {
        Ok(Arc::new(crate::backends::HeuristicPerception::default()))
    }
}

/// Lazily loaded perception backend
///
/// Initialized at most once; concurrent first callers wait on the same load.
/// A failed load is not cached, so the next caller retries it.
pub struct LazyPerception {
    cell: OnceCell<Arc<dyn PerceptionBackend>>,
    factory: Arc<dyn PerceptionFactory>,
}

impl LazyPerception {
    /// Load through `factory` on first use
    #[must_use]
    pub fn new(factory: Arc<dyn PerceptionFactory>) -> Self {
        Self {
            cell: OnceCell::new(),
            factory,
        }
    }

    /// Wrap an already loaded backend
    #[must_use]
    pub fn ready(backend: Arc<dyn PerceptionBackend>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(backend)),
            factory: Arc::new(DefaultPerceptionFactory),
        }
    }

    /// Get the backend, loading it if needed
    pub async fn get(&self) -> Result<Arc<dyn PerceptionBackend>> {
        load_into(&self.cell, self.factory.as_ref()).await
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

static SHARED_PERCEPTION: OnceCell<Arc<dyn PerceptionBackend>> = OnceCell::const_new();

/// Process-wide backend built by `DefaultPerceptionFactory`
pub async fn shared_perception() -> Result<Arc<dyn PerceptionBackend>> {
    load_into(&SHARED_PERCEPTION, &DefaultPerceptionFactory).await
}

async fn load_into(
    cell: &OnceCell<Arc<dyn PerceptionBackend>>,
    factory: &dyn PerceptionFactory,
) -> Result<Arc<dyn PerceptionBackend>> {
    let backend = cell
        .get_or_try_init(|| async {
            debug!("Loading perception backend");
            match factory.load().await {
                Ok(backend) => {
                    info!(backend = backend.name(), "Perception backend loaded");
                    Ok(backend)
                },
                Err(e) => {
                    warn!(error = %e, "Perception backend failed to load");
                    Err(match e {
                        CompositeError::PerceptionUnavailable(_) => e,
                        other => CompositeError::perception_unavailable(other.to_string()),
                    })
                },
            }
        })
        .await?;
    Ok(Arc::clone(backend))
}
