use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltwh};
use crate::error::Error;
use crate::math::{Coordinate, RelativeOffset};
use crate::track::TrackId;

/// Single classified bounding box of a tracked road user in one video frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    #[serde(rename = "class")]
    classification: String,
    confidence: f64,
    bbox: BBox<Ltwh>,
    frame: u32,
    occurrence: DateTime<Utc>,
    video_name: String,
    track_id: TrackId,
}

impl Detection {
    pub fn new(
        track_id: TrackId,
        classification: impl Into<String>,
        confidence: f64,
        bbox: BBox<Ltwh>,
        frame: u32,
        occurrence: DateTime<Utc>,
        video_name: impl Into<String>,
    ) -> Result<Self, Error> {
        let detection = Self {
            classification: classification.into(),
            confidence,
            bbox,
            frame,
            occurrence,
            video_name: video_name.into(),
            track_id,
        };
        detection.validate()?;

        Ok(detection)
    }

    /// Checks the value constraints; deserialized detections bypass `new`.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.confidence > 0.0 && self.confidence <= 1.0) {
            return Err(Error::InvalidConfidence(self.confidence));
        }

        let raw = *self.bbox.as_slice();
        if raw.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::InvalidBoundingBox(raw));
        }

        if self.frame == 0 {
            return Err(Error::InvalidFrame(self.frame));
        }

        Ok(())
    }

    #[inline]
    pub fn classification(&self) -> &str {
        &self.classification
    }

    #[inline]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    #[inline]
    pub fn bbox(&self) -> &BBox<Ltwh> {
        &self.bbox
    }

    #[inline]
    pub fn frame(&self) -> u32 {
        self.frame
    }

    #[inline]
    pub fn occurrence(&self) -> DateTime<Utc> {
        self.occurrence
    }

    #[inline]
    pub fn video_name(&self) -> &str {
        &self.video_name
    }

    #[inline]
    pub fn track_id(&self) -> &TrackId {
        &self.track_id
    }

    #[inline(always)]
    pub fn anchor(&self, offset: &RelativeOffset) -> Coordinate {
        self.bbox.anchor(offset)
    }

    pub(crate) fn with_track_id(&self, track_id: TrackId) -> Self {
        Self {
            track_id,
            ..self.clone()
        }
    }
}
