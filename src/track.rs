use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::detection::Detection;
use crate::error::Error;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of the `counter`-th fragment cut from this track.
    pub fn derived(&self, separator: &str, counter: usize) -> TrackId {
        TrackId(format!("{}{}{}", self.0, separator, counter))
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait TrackClassificationCalculator: fmt::Debug + Send + Sync {
    fn calculate(&self, detections: &[Detection]) -> String;
}

/// Picks the label with the highest confidence sum, later labels win ties.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByMaxConfidence;

impl TrackClassificationCalculator for ByMaxConfidence {
    fn calculate(&self, detections: &[Detection]) -> String {
        let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
        for det in detections {
            *sums.entry(det.classification()).or_insert(0.0) += det.confidence();
        }

        let mut best: Option<(&str, f64)> = None;
        for (label, sum) in sums {
            match best {
                Some((_, best_sum)) if sum < best_sum => {}
                _ => best = Some((label, sum)),
            }
        }

        best.map(|(label, _)| label.to_string()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    id: TrackId,
    original_id: TrackId,
    classification: String,
    detections: Vec<Detection>,
}

impl Track {
    #[inline]
    pub fn new(id: TrackId, detections: Vec<Detection>) -> Result<Self, Error> {
        Self::with_calculator(id, detections, &ByMaxConfidence)
    }

    pub fn with_calculator(
        id: TrackId,
        detections: Vec<Detection>,
        calculator: &dyn TrackClassificationCalculator,
    ) -> Result<Self, Error> {
        if detections.is_empty() {
            return Err(Error::EmptyTrack(id));
        }

        for det in &detections {
            det.validate()?;

            if det.track_id() != &id {
                return Err(Error::MismatchedTrackId {
                    expected: id,
                    found: det.track_id().clone(),
                });
            }
        }

        if detections
            .windows(2)
            .any(|w| w[0].occurrence() >= w[1].occurrence())
        {
            return Err(Error::UnsortedDetections(id));
        }

        Ok(Self {
            classification: calculator.calculate(&detections),
            original_id: id.clone(),
            id,
            detections,
        })
    }

    /// Contiguous part of a cut track. Detections are relabelled to `id`.
    pub(crate) fn fragment(
        id: TrackId,
        original_id: TrackId,
        classification: String,
        detections: &[Detection],
    ) -> Self {
        Self {
            detections: detections
                .iter()
                .map(|d| d.with_track_id(id.clone()))
                .collect(),
            id,
            original_id,
            classification,
        }
    }

    /// Union of `detections` under `id`, ordered by occurrence with exact duplicates removed.
    /// The caller guarantees at least one detection.
    pub(crate) fn merged<I>(
        id: TrackId,
        original_id: TrackId,
        detections: I,
        calculator: &dyn TrackClassificationCalculator,
    ) -> Self
    where
        I: IntoIterator<Item = Detection>,
    {
        let mut sorted: Vec<Detection> = detections
            .into_iter()
            .map(|d| d.with_track_id(id.clone()))
            .collect();
        sorted.sort_by_key(|d| d.occurrence());

        let mut merged: Vec<Detection> = Vec::with_capacity(sorted.len());
        for det in sorted {
            let duplicate = merged
                .iter()
                .rev()
                .take_while(|d| d.occurrence() == det.occurrence())
                .any(|d| d == &det);

            if !duplicate {
                merged.push(det);
            }
        }
        debug_assert!(!merged.is_empty());

        Self {
            classification: calculator.calculate(&merged),
            id,
            original_id,
            detections: merged,
        }
    }

    #[inline]
    pub fn id(&self) -> &TrackId {
        &self.id
    }

    #[inline]
    pub fn original_id(&self) -> &TrackId {
        &self.original_id
    }

    /// `true` for fragments produced by cutting with a section.
    #[inline]
    pub fn is_cut(&self) -> bool {
        self.id != self.original_id
    }

    #[inline]
    pub fn classification(&self) -> &str {
        &self.classification
    }

    #[inline]
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    #[inline]
    pub fn first_detection(&self) -> &Detection {
        &self.detections[0]
    }

    #[inline]
    pub fn last_detection(&self) -> &Detection {
        &self.detections[self.detections.len() - 1]
    }

    #[inline]
    pub fn first_occurrence(&self) -> DateTime<Utc> {
        self.first_detection().occurrence()
    }

    #[inline]
    pub fn last_occurrence(&self) -> DateTime<Utc> {
        self.last_detection().occurrence()
    }

    pub fn max_confidence(&self) -> f64 {
        self.detections
            .iter()
            .map(Detection::confidence)
            .fold(f64::MIN, f64::max)
    }
}
