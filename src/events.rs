//! Turns crossings and containment of sections into enter and leave events.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use nalgebra as na;

use crate::dataset::TrackDataset;
use crate::detection::Detection;
use crate::geometry::IntersectionPoint;
use crate::math::{lerp, lerp_point, Coordinate, RelativeOffset};
use crate::section::{EventType, Section, SectionId, SectionKind};
use crate::track::{Track, TrackId};

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub road_user_id: TrackId,
    pub road_user_type: String,
    pub occurrence: DateTime<Utc>,
    pub frame_number: u32,
    pub video_name: String,
    pub section_id: SectionId,
    pub event_type: EventType,
    pub event_coordinate: Coordinate,
    /// Movement between the two detections around the event
    pub direction_vector: na::Vector2<f64>,
}

pub trait SectionIntersector {
    fn events<D: TrackDataset>(&self, dataset: &D, sections: &[Section]) -> Vec<Event>;
}

/// Sections of `kind` grouped by their offset for `event_type`.
fn sections_by_offset<D: TrackDataset>(
    dataset: &D,
    sections: &[Section],
    kind: SectionKind,
    event_type: EventType,
) -> BTreeMap<RelativeOffset, Vec<Section>> {
    let mut groups: BTreeMap<RelativeOffset, Vec<Section>> = BTreeMap::new();

    for section in sections.iter().filter(|s| s.kind() == kind) {
        let offset = section
            .relative_offset(event_type)
            .unwrap_or(dataset.config().default_offset);
        groups.entry(offset).or_default().push(section.clone());
    }

    groups
}

fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.occurrence
            .cmp(&b.occurrence)
            .then_with(|| a.road_user_id.cmp(&b.road_user_id))
            .then_with(|| a.section_id.cmp(&b.section_id))
            .then_with(|| a.event_type.cmp(&b.event_type))
    });
}

fn interpolate_occurrence(from: &Detection, to: &Detection, factor: f64) -> DateTime<Utc> {
    let span = (to.occurrence() - from.occurrence())
        .num_microseconds()
        .unwrap_or(i64::MAX) as f64;

    from.occurrence() + Duration::microseconds(lerp(0.0, span, factor).round() as i64)
}

/// One `SectionEnter` event per crossing of a line section, located between
/// the two detections around the crossing.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntersectByIntersectionPoints;

impl IntersectByIntersectionPoints {
    fn event(
        track: &Track,
        section_id: &SectionId,
        point: &IntersectionPoint,
        offset: &RelativeOffset,
    ) -> Event {
        let lower = &track.detections()[point.lower_index()];
        let upper = &track.detections()[point.upper_index];
        let (from, to) = (lower.anchor(offset), upper.anchor(offset));

        Event {
            road_user_id: track.id().clone(),
            road_user_type: track.classification().to_string(),
            occurrence: interpolate_occurrence(lower, upper, point.relative_position),
            frame_number: upper.frame(),
            video_name: upper.video_name().to_string(),
            section_id: section_id.clone(),
            event_type: EventType::SectionEnter,
            event_coordinate: lerp_point(&from, &to, point.relative_position),
            direction_vector: to - from,
        }
    }
}

impl SectionIntersector for IntersectByIntersectionPoints {
    fn events<D: TrackDataset>(&self, dataset: &D, sections: &[Section]) -> Vec<Event> {
        let mut events = Vec::new();

        let groups = sections_by_offset(dataset, sections, SectionKind::Line, EventType::SectionEnter);

        for (offset, group) in groups {
            for (track_id, crossings) in dataset.intersection_points(&group, offset) {
                let track = match dataset.get_for(&track_id) {
                    Some(track) => track,
                    None => continue,
                };

                events.extend(
                    crossings
                        .iter()
                        .map(|(section_id, point)| Self::event(track, section_id, point, &offset)),
                );
            }
        }

        debug!("created {} line crossing events", events.len());
        sort_events(&mut events);
        events
    }
}

/// `SectionEnter` where a track moves into an area (or starts inside it),
/// `SectionLeave` where it moves out again.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntersectAreaByTrackPoints;

impl IntersectAreaByTrackPoints {
    fn event(
        track: &Track,
        section_id: &SectionId,
        index: usize,
        event_type: EventType,
        offset: &RelativeOffset,
    ) -> Event {
        let detection = &track.detections()[index];
        let position = detection.anchor(offset);
        let direction_vector = match index {
            0 => na::Vector2::zeros(),
            _ => position - track.detections()[index - 1].anchor(offset),
        };

        Event {
            road_user_id: track.id().clone(),
            road_user_type: track.classification().to_string(),
            occurrence: detection.occurrence(),
            frame_number: detection.frame(),
            video_name: detection.video_name().to_string(),
            section_id: section_id.clone(),
            event_type,
            event_coordinate: position,
            direction_vector,
        }
    }
}

impl IntersectAreaByTrackPoints {
    /// Transitions of kind `event_type`, measured at each section's offset for it.
    fn transitions<D: TrackDataset>(
        dataset: &D,
        sections: &[Section],
        event_type: EventType,
        events: &mut Vec<Event>,
    ) {
        let groups = sections_by_offset(dataset, sections, SectionKind::Area, event_type);

        for (offset, group) in groups {
            for (track_id, masks) in dataset.contained_by_sections(&group, offset) {
                let track = match dataset.get_for(&track_id) {
                    Some(track) => track,
                    None => continue,
                };

                for (section_id, mask) in &masks {
                    let mut inside = false;

                    for (index, &contained) in mask.iter().enumerate() {
                        let transition = match (inside, contained) {
                            (false, true) => EventType::SectionEnter,
                            (true, false) => EventType::SectionLeave,
                            _ => continue,
                        };
                        inside = contained;

                        if transition == event_type {
                            events.push(Self::event(track, section_id, index, event_type, &offset));
                        }
                    }
                }
            }
        }
    }
}

impl SectionIntersector for IntersectAreaByTrackPoints {
    fn events<D: TrackDataset>(&self, dataset: &D, sections: &[Section]) -> Vec<Event> {
        let mut events = Vec::new();

        Self::transitions(dataset, sections, EventType::SectionEnter, &mut events);
        Self::transitions(dataset, sections, EventType::SectionLeave, &mut events);

        debug!("created {} area events", events.len());
        sort_events(&mut events);
        events
    }
}

/// Events of all line and area sections ordered by occurrence.
pub fn create_events<D: TrackDataset>(dataset: &D, sections: &[Section]) -> Vec<Event> {
    let mut events = IntersectByIntersectionPoints.events(dataset, sections);
    events.extend(IntersectAreaByTrackPoints.events(dataset, sections));

    sort_events(&mut events);

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::dataset::SharedTrackDataset;
    use crate::track::tests::track;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use approx::assert_abs_diff_eq;

    fn pt(x: f64, y: f64) -> Coordinate {
        Coordinate::new(x, y)
    }

    #[test]
    fn line_crossing_is_interpolated() {
        let ds = SharedTrackDataset::from_tracks(vec![track("1", &[(0., 0.), (2., 0.), (6., 0.)])]);
        let line = Section::line("l", vec![pt(3., -1.), pt(3., 1.)], RelativeOffset::CENTER).unwrap();

        let events = IntersectByIntersectionPoints.events(&ds, &[line]);

        assert_eq!(events.len(), 1);
        let event = &events[0];
        let dets = ds.get_for(&TrackId::from("1")).unwrap().detections();
        assert_eq!(event.event_type, EventType::SectionEnter);
        assert_eq!(event.section_id, SectionId::from("l"));
        assert_eq!(event.road_user_type, "car");
        assert_eq!(event.frame_number, 3);
        assert_abs_diff_eq!(event.event_coordinate.x, 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(event.direction_vector.x, 4.0, epsilon = 1e-9);
        assert_eq!(
            event.occurrence,
            dets[1].occurrence() + Duration::milliseconds(25)
        );
    }

    #[test]
    fn sections_without_offset_use_default() {
        let ds = SharedTrackDataset::from_tracks(vec![track("1", &[(0., 0.), (4., 0.)])]);
        let line = Section::new(
            SectionId::from("l"),
            "l",
            SectionKind::Line,
            vec![pt(2., -1.), pt(2., 1.)],
            Default::default(),
        )
        .unwrap();

        assert_eq!(IntersectByIntersectionPoints.events(&ds, &[line]).len(), 1);
    }

    #[test]
    fn area_enter_and_leave() {
        let ds = SharedTrackDataset::from_tracks(vec![
            track("1", &[(0., 0.), (2., 0.), (3., 0.), (5., 0.)]),
            track("2", &[(2., 0.5), (8., 8.)]),
        ]);
        let area = Section::area(
            "a",
            vec![pt(1., -1.), pt(4., -1.), pt(4., 1.), pt(1., 1.)],
            RelativeOffset::CENTER,
        )
        .unwrap();

        let events = create_events(&ds, &[area]);

        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.road_user_id.as_str(), e.event_type, e.frame_number))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("2", EventType::SectionEnter, 1),
                ("1", EventType::SectionEnter, 2),
                ("2", EventType::SectionLeave, 2),
                ("1", EventType::SectionLeave, 4),
            ]
        );
        assert_eq!(events[0].direction_vector, na::Vector2::zeros());
        assert_eq!(events[1].direction_vector, na::Vector2::new(2.0, 0.0));
    }

    #[test]
    fn leave_events_use_the_leave_offset() {
        let start = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        let detections = [0., 2., 4., 6.]
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                Detection::new(
                    TrackId::from("1"),
                    "car",
                    0.9,
                    BBox::ltwh(x, 0., 2., 2.).unwrap(),
                    i as u32 + 1,
                    start + Duration::seconds(i as i64),
                    "video.mp4",
                )
                .unwrap()
            })
            .collect();
        let ds = SharedTrackDataset::from_tracks(vec![Track::new(TrackId::from("1"), detections).unwrap()]);
        let area = Section::new(
            SectionId::from("a"),
            "a",
            SectionKind::Area,
            vec![pt(1., -1.), pt(5., -1.), pt(5., 3.), pt(1., 3.)],
            HashMap::from([
                (EventType::SectionEnter, RelativeOffset::TOP_LEFT),
                (EventType::SectionLeave, RelativeOffset::BOTTOM),
            ]),
        )
        .unwrap();

        let events = IntersectAreaByTrackPoints.events(&ds, &[area]);

        let summary: Vec<_> = events.iter().map(|e| (e.event_type, e.frame_number)).collect();
        assert_eq!(
            summary,
            vec![(EventType::SectionEnter, 2), (EventType::SectionLeave, 3)]
        );
        assert_eq!(events[1].event_coordinate, pt(5., 2.));
    }

    #[test]
    fn cutting_sections_do_not_create_events() {
        let ds = SharedTrackDataset::from_tracks(vec![track("1", &[(0., 0.), (4., 0.)])]);
        let cut = Section::cutting("c", vec![pt(2., -1.), pt(2., 1.)], RelativeOffset::CENTER).unwrap();

        assert!(create_events(&ds, &[cut]).is_empty());
    }
}
