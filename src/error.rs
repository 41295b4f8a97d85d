use thiserror::Error;

use crate::section::SectionId;
use crate::track::TrackId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("confidence {0} is outside of (0, 1]")]
    InvalidConfidence(f64),

    #[error("bounding box {0:?} has a negative coordinate or dimension")]
    InvalidBoundingBox([f64; 4]),

    #[error("frame number {0} is not positive")]
    InvalidFrame(u32),

    #[error("track {0} has no detections")]
    EmptyTrack(TrackId),

    #[error("detections of track {0} are not ordered by occurrence")]
    UnsortedDetections(TrackId),

    #[error("detection of track {found} was passed to track {expected}")]
    MismatchedTrackId { expected: TrackId, found: TrackId },

    #[error("section {id} needs at least {required} coordinates, got {actual}")]
    TooFewCoordinates {
        id: SectionId,
        required: usize,
        actual: usize,
    },

    #[error("relative offset ({x}, {y}) is outside of the unit square")]
    InvalidOffset { x: f64, y: f64 },

    #[error("section {0} is an area and cannot cut tracks")]
    NotACuttingSection(SectionId),

    #[error("tracks not found: {}", join_ids(.0))]
    TrackNotFound(Vec<TrackId>),
}

fn join_ids(ids: &[TrackId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
