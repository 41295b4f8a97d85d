use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use crate::math::{Coordinate, RelativeOffset};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SectionId(String);

impl SectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SectionKind {
    /// Polyline, produces an event for every crossing
    Line,
    /// Closed polygon, produces enter and leave events
    Area,
    /// Polyline used to split tracks
    Cutting,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    SectionEnter,
    SectionLeave,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    id: SectionId,
    name: String,
    kind: SectionKind,
    coordinates: Vec<Coordinate>,
    relative_offsets: HashMap<EventType, RelativeOffset>,
    metadata: BTreeMap<String, String>,
}

impl Section {
    pub fn new(
        id: SectionId,
        name: impl Into<String>,
        kind: SectionKind,
        coordinates: Vec<Coordinate>,
        relative_offsets: HashMap<EventType, RelativeOffset>,
    ) -> Result<Self, Error> {
        let required = match kind {
            SectionKind::Area => 3,
            SectionKind::Line | SectionKind::Cutting => 2,
        };

        if coordinates.len() < required {
            return Err(Error::TooFewCoordinates {
                id,
                required,
                actual: coordinates.len(),
            });
        }

        Ok(Self {
            id,
            name: name.into(),
            kind,
            coordinates,
            relative_offsets,
            metadata: BTreeMap::new(),
        })
    }

    #[inline]
    pub fn line(id: &str, coordinates: Vec<Coordinate>, offset: RelativeOffset) -> Result<Self, Error> {
        Self::new(
            SectionId::from(id),
            id,
            SectionKind::Line,
            coordinates,
            HashMap::from([(EventType::SectionEnter, offset)]),
        )
    }

    #[inline]
    pub fn area(id: &str, coordinates: Vec<Coordinate>, offset: RelativeOffset) -> Result<Self, Error> {
        Self::new(
            SectionId::from(id),
            id,
            SectionKind::Area,
            coordinates,
            HashMap::from([
                (EventType::SectionEnter, offset),
                (EventType::SectionLeave, offset),
            ]),
        )
    }

    #[inline]
    pub fn cutting(id: &str, coordinates: Vec<Coordinate>, offset: RelativeOffset) -> Result<Self, Error> {
        Self::new(
            SectionId::from(id),
            id,
            SectionKind::Cutting,
            coordinates,
            HashMap::from([(EventType::SectionEnter, offset)]),
        )
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[inline]
    pub fn id(&self) -> &SectionId {
        &self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    #[inline]
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    #[inline]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    #[inline]
    pub fn relative_offset(&self, event_type: EventType) -> Option<RelativeOffset> {
        self.relative_offsets.get(&event_type).copied()
    }

    /// `true` for sections whose geometry is a polyline.
    #[inline]
    pub fn is_line_like(&self) -> bool {
        matches!(self.kind, SectionKind::Line | SectionKind::Cutting)
    }

    /// Consecutive coordinate pairs of a line section.
    pub fn legs(&self) -> impl Iterator<Item = (&Coordinate, &Coordinate)> {
        self.coordinates.windows(2).map(|w| (&w[0], &w[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_needs_two_coordinates() {
        let res = Section::line("l", vec![Coordinate::new(0., 0.)], RelativeOffset::BOTTOM);

        assert_eq!(
            res,
            Err(Error::TooFewCoordinates {
                id: SectionId::from("l"),
                required: 2,
                actual: 1,
            })
        );
    }

    #[test]
    fn area_needs_three_coordinates() {
        let coords = vec![Coordinate::new(0., 0.), Coordinate::new(1., 0.)];

        assert!(Section::area("a", coords.clone(), RelativeOffset::BOTTOM).is_err());
        assert!(Section::cutting("c", coords, RelativeOffset::BOTTOM).is_ok());
    }

    #[test]
    fn legs_follow_coordinates() {
        let coords = vec![
            Coordinate::new(0., 0.),
            Coordinate::new(1., 0.),
            Coordinate::new(1., 1.),
        ];
        let section = Section::line("l", coords, RelativeOffset::CENTER)
            .unwrap()
            .with_metadata("color", "red");

        assert_eq!(section.legs().count(), 2);
        assert_eq!(
            section.relative_offset(EventType::SectionEnter),
            Some(RelativeOffset::CENTER)
        );
        assert_eq!(section.relative_offset(EventType::SectionLeave), None);
        assert_eq!(section.metadata()["color"], "red");
    }
}
