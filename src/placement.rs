//! Placement selection
//!
//! Total by construction: a surface match, else the best candidate of any
//! surface, else a fixed default.

use crate::{
    config::ProcessingSettings,
    types::{ArtworkModel, CandidatePlacement, Placement, PlacementSource, RoomModel},
};
use tracing::debug;

/// Placement used when the room offers no candidates at all
pub const DEFAULT_PLACEMENT: CandidatePlacement = CandidatePlacement {
    x: 0.5,
    y: 0.6,
    scale: 0.3,
    score: 0.0,
    surface: None,
};

/// Chooses where the artwork goes
pub struct PlacementSelector;

impl PlacementSelector {
    /// Select a placement; never fails
    ///
    /// Candidates are only filtered by surface when the room model tags any of
    /// them. The chosen scale is multiplied by `settings.size / 100` and the
    /// rotation is taken from `settings.rotation`.
    #[must_use]
    pub fn select(
        room: &RoomModel,
        _artwork: &ArtworkModel,
        settings: &ProcessingSettings,
    ) -> Placement {
        let candidates = &room.candidate_placements;
        let tagged = candidates.iter().any(|c| c.surface.is_some());
        let best = |filter: &dyn Fn(&CandidatePlacement) -> bool| {
            candidates
                .iter()
                .filter(|c| filter(c))
                .fold(None::<&CandidatePlacement>, |best, c| match best {
                    Some(b) if b.score >= c.score => Some(b),
                    _ => Some(c),
                })
                .copied()
        };

        let surface_match = if tagged {
            best(&|c| c.surface == Some(settings.position))
        } else {
            None
        };
        let (chosen, source) = match surface_match {
            Some(candidate) => (candidate, PlacementSource::SurfaceMatch),
            None => match best(&|_| true) {
                Some(candidate) => (candidate, PlacementSource::BestAvailable),
                None => (DEFAULT_PLACEMENT, PlacementSource::Default),
            },
        };

        let placement = Placement {
            x: chosen.x.clamp(0.0, 1.0),
            y: chosen.y.clamp(0.0, 1.0),
            scale: chosen.scale * settings.size_factor(),
            rotation_degrees: settings.rotation,
            surface_type: settings.position,
            source,
        };
        debug!(?placement, "Placement selected");
        placement
    }
}
