use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, trace};
use ndarray::prelude::*;

use crate::math::{
    cumulative_distances, in_polygon, ring_edges, search_sorted_right, segment_intersection,
    Coordinate, RelativeOffset, SegmentIntersection, EPSILON,
};
use crate::section::{Section, SectionId, SectionKind};
use crate::track::{Track, TrackId};

/// Position of a crossing along a track: between the detections at
/// `lower_index()` and `upper_index`, at `relative_position` of that segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionPoint {
    pub upper_index: usize,
    pub relative_position: f64,
}

impl IntersectionPoint {
    #[inline]
    pub fn lower_index(&self) -> usize {
        self.upper_index.saturating_sub(1)
    }
}

impl PartialOrd for IntersectionPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(
            self.upper_index
                .cmp(&other.upper_index)
                .then_with(|| self.relative_position.total_cmp(&other.relative_position)),
        )
    }
}

/// Planar polyline of one track for a fixed offset.
///
/// Vertices are stored row-wise in an `n x 2` array, `distances[i]` is the
/// arc length from the first vertex to vertex `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackGeometry {
    points: Array2<f64>,
    distances: Array1<f64>,
}

impl TrackGeometry {
    /// `None` for tracks with less than two detections.
    pub fn from_track(track: &Track, offset: &RelativeOffset) -> Option<Self> {
        if track.len() < 2 {
            return None;
        }

        let mut points = Array2::zeros((track.len(), 2));
        for (mut row, det) in points.axis_iter_mut(Axis(0)).zip(track.detections()) {
            let p = det.anchor(offset);
            row[0] = p.x;
            row[1] = p.y;
        }

        let distances = cumulative_distances(points.view());
        Some(Self { points, distances })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    #[inline(always)]
    pub fn point(&self, idx: usize) -> Coordinate {
        Coordinate::new(self.points[[idx, 0]], self.points[[idx, 1]])
    }

    #[inline]
    pub fn points(&self) -> ArrayView2<'_, f64> {
        self.points.view()
    }

    #[inline]
    pub fn distances(&self) -> ArrayView1<'_, f64> {
        self.distances.view()
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.distances[self.len() - 1]
    }

    fn segments(&self) -> impl Iterator<Item = (usize, Coordinate, Coordinate)> + '_ {
        (1..self.len()).map(move |i| (i - 1, self.point(i - 1), self.point(i)))
    }

    pub fn intersects_line(&self, a: &Coordinate, b: &Coordinate) -> bool {
        self.segments()
            .any(|(_, p, q)| !segment_intersection(&p, &q, a, b).is_disjoint())
    }

    /// Touching the boundary counts as intersecting.
    pub fn intersects_polygon(&self, poly: &[Coordinate]) -> bool {
        (0..self.len()).any(|i| in_polygon(&self.point(i), poly))
            || self.segments().any(|(_, p, q)| {
                ring_edges(poly).any(|(a, b)| !segment_intersection(&p, &q, a, b).is_disjoint())
            })
    }

    /// Crossings with all legs of a line section, ordered along the track.
    pub fn intersections_with(&self, section: &Section) -> Vec<IntersectionPoint> {
        let mut arcs = Vec::new();

        for (a, b) in section.legs() {
            for (k, p, q) in self.segments() {
                match segment_intersection(&p, &q, a, b) {
                    SegmentIntersection::Point { along, .. } => {
                        // snap onto vertices so that a crossing through a shared vertex is found once
                        let arc = if along <= EPSILON {
                            self.distances[k]
                        } else if along >= 1.0 - EPSILON {
                            self.distances[k + 1]
                        } else {
                            self.distances[k] + along * (self.distances[k + 1] - self.distances[k])
                        };
                        arcs.push(arc);
                    }
                    SegmentIntersection::Overlap => {
                        trace!("segment {} overlaps section {}, no crossing", k, section.id());
                    }
                    SegmentIntersection::Disjoint => {}
                }
            }
        }

        arcs.sort_by(f64::total_cmp);
        arcs.dedup_by(|a, b| (*a - *b).abs() <= EPSILON);
        arcs.into_iter().map(|arc| self.project(arc)).collect()
    }

    /// Locates arc length `arc` on the vertex grid.
    pub fn project(&self, arc: f64) -> IntersectionPoint {
        let n = self.len();
        let upper_index = search_sorted_right(self.distances.view(), arc);

        if upper_index >= n {
            return IntersectionPoint {
                upper_index: n - 1,
                relative_position: 1.0,
            };
        }

        let lower_index = upper_index.saturating_sub(1);
        let span = self.distances[upper_index] - self.distances[lower_index];
        let relative_position = if span > 0.0 {
            ((arc - self.distances[lower_index]) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };

        IntersectionPoint {
            upper_index,
            relative_position,
        }
    }

    pub fn contained_in(&self, poly: &[Coordinate]) -> Vec<bool> {
        (0..self.len())
            .map(|i| in_polygon(&self.point(i), poly))
            .collect()
    }
}

/// Geometries of all tracks with at least two detections for one offset.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackGeometryDataset {
    offset: RelativeOffset,
    geometries: BTreeMap<TrackId, Arc<TrackGeometry>>,
}

impl TrackGeometryDataset {
    pub fn empty(offset: RelativeOffset) -> Self {
        Self {
            offset,
            geometries: BTreeMap::new(),
        }
    }

    pub fn from_tracks<'a, I>(tracks: I, offset: RelativeOffset) -> Self
    where
        I: IntoIterator<Item = &'a Track>,
    {
        let geometries: BTreeMap<_, _> = tracks
            .into_iter()
            .filter_map(|t| Some((t.id().clone(), Arc::new(TrackGeometry::from_track(t, &offset)?))))
            .collect();

        debug!(
            "built geometries of {} tracks for offset ({}, {})",
            geometries.len(),
            offset.x(),
            offset.y()
        );

        Self { offset, geometries }
    }

    #[inline]
    pub fn offset(&self) -> RelativeOffset {
        self.offset
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn track_ids(&self) -> BTreeSet<TrackId> {
        self.geometries.keys().cloned().collect()
    }

    #[inline]
    pub fn contains(&self, id: &TrackId) -> bool {
        self.geometries.contains_key(id)
    }

    #[inline]
    pub fn geometry(&self, id: &TrackId) -> Option<&TrackGeometry> {
        self.geometries.get(id).map(|g| g.as_ref())
    }

    /// Subset restricted to `ids`, unknown ids are ignored.
    pub fn get_for<'a, I>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = &'a TrackId>,
    {
        let geometries = ids
            .into_iter()
            .filter_map(|id| Some((id.clone(), self.geometries.get(id)?.clone())))
            .collect();

        Self {
            offset: self.offset,
            geometries,
        }
    }

    pub fn remove<'a, I>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = &'a TrackId>,
    {
        let mut geometries = self.geometries.clone();
        for id in ids {
            geometries.remove(id);
        }

        Self {
            offset: self.offset,
            geometries,
        }
    }

    /// Inserts or replaces the geometries of `tracks`.
    pub fn add_all<'a, I>(&self, tracks: I) -> Self
    where
        I: IntoIterator<Item = &'a Track>,
    {
        let mut geometries = self.geometries.clone();
        for track in tracks {
            match TrackGeometry::from_track(track, &self.offset) {
                Some(geometry) => {
                    geometries.insert(track.id().clone(), Arc::new(geometry));
                }
                None => {
                    geometries.remove(track.id());
                }
            }
        }

        Self {
            offset: self.offset,
            geometries,
        }
    }

    pub fn intersecting_tracks(&self, sections: &[Section]) -> BTreeSet<TrackId> {
        self.geometries
            .iter()
            .filter(|(_, geometry)| {
                sections.iter().any(|section| match section.kind() {
                    SectionKind::Line | SectionKind::Cutting => section
                        .legs()
                        .any(|(a, b)| geometry.intersects_line(a, b)),
                    SectionKind::Area => geometry.intersects_polygon(section.coordinates()),
                })
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Crossings per track with all line-like `sections`, ordered along the track.
    pub fn intersection_points(
        &self,
        sections: &[Section],
    ) -> BTreeMap<TrackId, Vec<(SectionId, IntersectionPoint)>> {
        let mut result = BTreeMap::new();

        for (id, geometry) in &self.geometries {
            let mut points: Vec<(SectionId, IntersectionPoint)> = sections
                .iter()
                .filter(|s| s.is_line_like())
                .flat_map(|s| {
                    geometry
                        .intersections_with(s)
                        .into_iter()
                        .map(move |p| (s.id().clone(), p))
                })
                .collect();

            if points.is_empty() {
                continue;
            }

            points.sort_by(|(s1, p1), (s2, p2)| {
                p1.partial_cmp(p2)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| s1.cmp(s2))
            });
            result.insert(id.clone(), points);
        }

        result
    }

    /// Per-vertex containment in every area section; tracks never inside are omitted.
    pub fn contained_by_sections(
        &self,
        sections: &[Section],
    ) -> BTreeMap<TrackId, Vec<(SectionId, Vec<bool>)>> {
        let mut result = BTreeMap::new();

        for (id, geometry) in &self.geometries {
            let masks: Vec<(SectionId, Vec<bool>)> = sections
                .iter()
                .filter(|s| s.kind() == SectionKind::Area)
                .map(|s| (s.id().clone(), geometry.contained_in(s.coordinates())))
                .filter(|(_, mask)| mask.iter().any(|&inside| inside))
                .collect();

            if !masks.is_empty() {
                result.insert(id.clone(), masks);
            }
        }

        result
    }

    /// Per-vertex ids after cutting with `section`. Vertex `j` is renamed by the
    /// number of crossings with `upper_index <= j`; uncrossed tracks and tracks
    /// ending on the section are omitted.
    pub fn track_ids_after_cut(
        &self,
        section: &Section,
        separator: &str,
    ) -> BTreeMap<TrackId, Vec<TrackId>> {
        let mut result = BTreeMap::new();

        for (id, geometry) in &self.geometries {
            let last = geometry.len() - 1;
            // touching the line with the last vertex leaves nothing to cut off
            let crossings: Vec<_> = geometry
                .intersections_with(section)
                .into_iter()
                .filter(|c| !(c.upper_index == last && c.relative_position >= 1.0))
                .collect();
            if crossings.is_empty() {
                continue;
            }

            let mut counts = vec![0usize; geometry.len()];
            for crossing in &crossings {
                counts[crossing.upper_index] += 1;
            }

            let mut running = 0;
            let ids = counts
                .into_iter()
                .map(|count| {
                    running += count;
                    if running == 0 {
                        id.clone()
                    } else {
                        id.derived(separator, running)
                    }
                })
                .collect();

            result.insert(id.clone(), ids);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::tests::track;
    use approx::assert_abs_diff_eq;

    fn pt(x: f64, y: f64) -> Coordinate {
        Coordinate::new(x, y)
    }

    fn vertical_line(id: &str, x: f64) -> Section {
        Section::line(id, vec![pt(x, -10.), pt(x, 10.)], RelativeOffset::CENTER).unwrap()
    }

    fn square(id: &str) -> Section {
        Section::area(
            id,
            vec![pt(1., -1.), pt(3., -1.), pt(3., 1.), pt(1., 1.)],
            RelativeOffset::CENTER,
        )
        .unwrap()
    }

    fn dataset(tracks: &[Track]) -> TrackGeometryDataset {
        TrackGeometryDataset::from_tracks(tracks, RelativeOffset::CENTER)
    }

    #[test]
    fn single_detection_tracks_have_no_geometry() {
        let ds = dataset(&[track("1", &[(0., 0.)]), track("2", &[(0., 0.), (1., 0.)])]);

        assert_eq!(ds.track_ids(), BTreeSet::from([TrackId::from("2")]));

        let ds = ds.add_all([&track("3", &[(5., 5.)])]);
        assert!(!ds.contains(&TrackId::from("3")));
    }

    #[test]
    fn add_all_replaces_geometry_and_drops_shrunk_tracks() {
        let ds = dataset(&[track("1", &[(0., 0.), (1., 0.)])]);

        let ds = ds.add_all([&track("1", &[(0., 0.), (1., 0.), (2., 0.)])]);
        assert_eq!(ds.geometry(&TrackId::from("1")).unwrap().len(), 3);

        let ds = ds.add_all([&track("1", &[(0., 0.)])]);
        assert!(ds.is_empty());
    }

    #[test]
    fn distances_are_cumulative() {
        let ds = dataset(&[track("1", &[(0., 0.), (3., 4.), (3., 8.)])]);
        let geometry = ds.geometry(&TrackId::from("1")).unwrap();

        assert_eq!(geometry.distances(), array![0., 5., 9.]);
        assert_abs_diff_eq!(geometry.length(), 9.0, epsilon = 1e-9);
    }

    #[test]
    fn intersecting_tracks_by_line_and_area() {
        let ds = dataset(&[
            track("1", &[(0., 0.), (4., 0.)]),
            track("2", &[(0., 5.), (4., 5.)]),
            track("3", &[(1.5, 0.5), (2.5, -0.5)]),
        ]);

        assert_eq!(
            ds.intersecting_tracks(&[vertical_line("l", 2.)]),
            BTreeSet::from([TrackId::from("1"), TrackId::from("2"), TrackId::from("3")])
        );
        assert_eq!(
            ds.intersecting_tracks(&[square("a")]),
            BTreeSet::from([TrackId::from("1"), TrackId::from("3")])
        );
        assert!(ds.intersecting_tracks(&[vertical_line("far", 20.)]).is_empty());
    }

    #[test]
    fn intersection_point_inside_segment() {
        let ds = dataset(&[track("1", &[(0., 0.), (2., 0.), (4., 0.)])]);

        let points = ds.intersection_points(&[vertical_line("l", 3.)]);
        let crossings = &points[&TrackId::from("1")];

        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].0, SectionId::from("l"));
        assert_eq!(crossings[0].1.upper_index, 2);
        assert_eq!(crossings[0].1.lower_index(), 1);
        assert_abs_diff_eq!(crossings[0].1.relative_position, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn crossing_at_vertex_belongs_to_the_segment_after_it() {
        let ds = dataset(&[track("1", &[(0., 0.), (2., 0.), (4., 0.)])]);

        let points = ds.intersection_points(&[vertical_line("l", 2.)]);

        assert_eq!(
            points[&TrackId::from("1")],
            vec![(
                SectionId::from("l"),
                IntersectionPoint {
                    upper_index: 2,
                    relative_position: 0.0
                }
            )]
        );
    }

    #[test]
    fn crossing_at_last_vertex_is_clamped() {
        let ds = dataset(&[track("1", &[(0., 0.), (2., 0.)])]);

        let points = ds.intersection_points(&[vertical_line("l", 2.)]);

        assert_eq!(
            points[&TrackId::from("1")][0].1,
            IntersectionPoint {
                upper_index: 1,
                relative_position: 1.0
            }
        );
    }

    #[test]
    fn two_crossings_are_ordered_along_the_track() {
        // goes right across x=2, turns and comes back
        let ds = dataset(&[track("1", &[(0., 0.), (4., 0.), (4., 2.), (0., 2.)])]);

        let points = ds.intersection_points(&[vertical_line("l", 2.)]);
        let crossings: Vec<_> = points[&TrackId::from("1")].iter().map(|(_, p)| *p).collect();

        assert_eq!(crossings.len(), 2);
        assert_eq!(crossings[0].upper_index, 1);
        assert_abs_diff_eq!(crossings[0].relative_position, 0.5, epsilon = 1e-9);
        assert_eq!(crossings[1].upper_index, 3);
        assert_abs_diff_eq!(crossings[1].relative_position, 0.5, epsilon = 1e-9);
        assert!(crossings[0] < crossings[1]);
    }

    #[test]
    fn crossings_of_several_legs_and_sections_are_merged() {
        let ds = dataset(&[track("1", &[(0., 0.), (10., 0.)])]);
        let zigzag = Section::line(
            "z",
            vec![pt(2., -1.), pt(4., 1.), pt(6., -1.)],
            RelativeOffset::CENTER,
        )
        .unwrap();

        let points = ds.intersection_points(&[vertical_line("l", 5.), zigzag, square("a")]);
        let crossings = &points[&TrackId::from("1")];

        let ids: Vec<_> = crossings.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(ids, vec!["z", "l", "z"]);
        assert_abs_diff_eq!(crossings[0].1.relative_position, 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(crossings[1].1.relative_position, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(crossings[2].1.relative_position, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn containment_excludes_boundary() {
        let ds = dataset(&[
            track("1", &[(0., 0.), (1., 0.), (2., 0.), (4., 0.)]),
            track("2", &[(10., 10.), (11., 11.)]),
        ]);

        let contained = ds.contained_by_sections(&[square("a"), vertical_line("l", 2.)]);

        assert_eq!(contained.len(), 1);
        assert_eq!(
            contained[&TrackId::from("1")],
            vec![(SectionId::from("a"), vec![false, false, true, false])]
        );
    }

    #[test]
    fn ids_after_cut_count_crossings() {
        let ds = dataset(&[
            track("1", &[(0., 0.), (4., 0.), (4., 2.), (0., 2.)]),
            track("2", &[(0., 5.), (1., 5.)]),
        ]);

        let ids = ds.track_ids_after_cut(&vertical_line("l", 2.), "_");

        assert_eq!(ids.len(), 1);
        let names: Vec<_> = ids[&TrackId::from("1")].iter().map(|id| id.as_str()).collect();
        assert_eq!(names, vec!["1", "1_1", "1_1", "1_2"]);
    }

    #[test]
    fn ending_on_the_cut_leaves_the_track_whole() {
        let ds = dataset(&[
            track("1", &[(0., 0.), (1., 0.), (2., 0.)]),
            track("2", &[(0., 1.), (2., 1.), (4., 1.), (2., 3.)]),
        ]);

        let ids = ds.track_ids_after_cut(&vertical_line("l", 2.), "_");

        assert!(!ids.contains_key(&TrackId::from("1")));
        let names: Vec<_> = ids[&TrackId::from("2")].iter().map(|id| id.as_str()).collect();
        assert_eq!(names, vec!["2", "2", "2_1", "2_1"]);
    }

    #[test]
    fn subsets_share_geometries() {
        let ds = dataset(&[
            track("1", &[(0., 0.), (1., 0.)]),
            track("2", &[(0., 1.), (1., 1.)]),
            track("3", &[(0., 2.), (1., 2.)]),
        ]);

        let subset = ds.get_for([&TrackId::from("1"), &TrackId::from("3"), &TrackId::from("9")]);
        assert_eq!(
            subset.track_ids(),
            BTreeSet::from([TrackId::from("1"), TrackId::from("3")])
        );

        let rest = ds.remove([&TrackId::from("1")]);
        assert_eq!(
            rest.track_ids(),
            BTreeSet::from([TrackId::from("2"), TrackId::from("3")])
        );
        assert_eq!(ds.len(), 3);
    }
}
