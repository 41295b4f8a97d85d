pub mod bbox;
pub mod config;
pub mod dataset;
pub mod detection;
pub mod error;
pub mod events;
pub mod geometry;
pub mod math;
pub mod repository;
pub mod section;
pub mod track;

pub use config::TrackDatasetConfig;
pub use dataset::{SharedTrackDataset, TrackDataset};
pub use detection::Detection;
pub use error::Error;
pub use events::{
    create_events, Event, IntersectAreaByTrackPoints, IntersectByIntersectionPoints,
    SectionIntersector,
};
pub use geometry::{IntersectionPoint, TrackGeometry, TrackGeometryDataset};
pub use math::{Coordinate, RelativeOffset};
pub use repository::{TrackRepository, TrackRepositoryEvent, TrackRepositoryObserver};
pub use section::{EventType, Section, SectionId, SectionKind};
pub use track::{ByMaxConfidence, Track, TrackClassificationCalculator, TrackId};
