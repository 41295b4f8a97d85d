use std::cmp::Ordering;
use std::convert::TryFrom;
use std::hash::{Hash, Hasher};

use nalgebra as na;
use ndarray::prelude::*;
use num_traits::Float;
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

pub type Coordinate = na::Point2<f64>;

/// Absolute tolerance used by all predicates in this module.
pub const EPSILON: f64 = 1e-9;

/// Fractional position inside a bounding box, `(0, 0)` is the top-left corner
/// and `(1, 1)` the bottom-right one.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct RelativeOffset {
    x: f64,
    y: f64,
}

impl RelativeOffset {
    pub const TOP_LEFT: RelativeOffset = RelativeOffset { x: 0.0, y: 0.0 };
    pub const CENTER: RelativeOffset = RelativeOffset { x: 0.5, y: 0.5 };
    pub const BOTTOM: RelativeOffset = RelativeOffset { x: 0.5, y: 1.0 };

    pub fn new(x: f64, y: f64) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return Err(Error::InvalidOffset { x, y });
        }

        // collapse -0.0 so that equal offsets hash equally
        Ok(Self { x: x + 0.0, y: y + 0.0 })
    }

    #[inline(always)]
    pub fn x(&self) -> f64 {
        self.x
    }

    #[inline(always)]
    pub fn y(&self) -> f64 {
        self.y
    }
}

impl Default for RelativeOffset {
    fn default() -> Self {
        Self::BOTTOM
    }
}

impl PartialEq for RelativeOffset {
    fn eq(&self, other: &Self) -> bool {
        self.x.to_bits() == other.x.to_bits() && self.y.to_bits() == other.y.to_bits()
    }
}

impl Eq for RelativeOffset {}

impl Hash for RelativeOffset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.to_bits().hash(state);
        self.y.to_bits().hash(state);
    }
}

impl PartialOrd for RelativeOffset {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RelativeOffset {
    fn cmp(&self, other: &Self) -> Ordering {
        self.x
            .total_cmp(&other.x)
            .then_with(|| self.y.total_cmp(&other.y))
    }
}

impl TryFrom<[f64; 2]> for RelativeOffset {
    type Error = Error;

    fn try_from(value: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(value[0], value[1])
    }
}

impl From<RelativeOffset> for [f64; 2] {
    fn from(offset: RelativeOffset) -> Self {
        [offset.x, offset.y]
    }
}

#[inline(always)]
pub fn lerp<F: Float>(from: F, to: F, factor: F) -> F {
    from * (F::one() - factor) + to * factor
}

#[inline(always)]
pub fn lerp_point(from: &Coordinate, to: &Coordinate, factor: f64) -> Coordinate {
    Coordinate::new(lerp(from.x, to.x, factor), lerp(from.y, to.y, factor))
}

#[inline(always)]
fn cross(a: &na::Vector2<f64>, b: &na::Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentIntersection {
    Disjoint,
    /// Single shared point, `along` is its parameter on the first segment
    Point { point: Coordinate, along: f64 },
    /// The segments are collinear and share more than one point
    Overlap,
}

impl SegmentIntersection {
    #[inline]
    pub fn is_disjoint(&self) -> bool {
        matches!(self, SegmentIntersection::Disjoint)
    }
}

/// Intersects segment `p1-p2` with segment `q1-q2`, endpoints included.
pub fn segment_intersection(
    p1: &Coordinate,
    p2: &Coordinate,
    q1: &Coordinate,
    q2: &Coordinate,
) -> SegmentIntersection {
    let r = p2 - p1;
    let s = q2 - q1;
    let qp = q1 - p1;
    let rr = r.dot(&r);
    let denom = cross(&r, &s);
    let tol = EPSILON * (r.norm() * s.norm()).max(1.0);

    if denom.abs() > tol {
        let t = cross(&qp, &s) / denom;
        let u = cross(&qp, &r) / denom;

        if (-EPSILON..=1.0 + EPSILON).contains(&t) && (-EPSILON..=1.0 + EPSILON).contains(&u) {
            let t = t.clamp(0.0, 1.0);
            return SegmentIntersection::Point {
                point: p1 + r * t,
                along: t,
            };
        }

        return SegmentIntersection::Disjoint;
    }

    if rr <= EPSILON * EPSILON {
        return if point_on_segment(p1, q1, q2) {
            SegmentIntersection::Point {
                point: *p1,
                along: 0.0,
            }
        } else {
            SegmentIntersection::Disjoint
        };
    }

    if cross(&qp, &r).abs() > EPSILON * r.norm().max(1.0) {
        // parallel, not collinear
        return SegmentIntersection::Disjoint;
    }

    let t0 = qp.dot(&r) / rr;
    let t1 = t0 + s.dot(&r) / rr;
    let (lo, hi) = (t0.min(t1).max(0.0), t0.max(t1).min(1.0));

    if lo > hi + EPSILON {
        SegmentIntersection::Disjoint
    } else if hi - lo <= EPSILON {
        let t = lo.clamp(0.0, 1.0);
        SegmentIntersection::Point {
            point: p1 + r * t,
            along: t,
        }
    } else {
        SegmentIntersection::Overlap
    }
}

pub fn point_on_segment(p: &Coordinate, a: &Coordinate, b: &Coordinate) -> bool {
    let ab = b - a;
    let ap = p - a;
    let len2 = ab.dot(&ab);

    if len2 <= EPSILON * EPSILON {
        return na::distance(p, a) <= EPSILON;
    }

    if cross(&ab, &ap).abs() > EPSILON * ab.norm().max(1.0) {
        return false;
    }

    let t = ap.dot(&ab) / len2;
    (-EPSILON..=1.0 + EPSILON).contains(&t)
}

/// Edges of the closed ring through `poly`, the closing edge included.
pub fn ring_edges(poly: &[Coordinate]) -> impl Iterator<Item = (&Coordinate, &Coordinate)> {
    let n = poly.len();
    (0..n).map(move |i| (&poly[i], &poly[(i + 1) % n]))
}

/// Even-odd containment test, points on the boundary are outside.
pub fn in_polygon(p: &Coordinate, poly: &[Coordinate]) -> bool {
    if poly.len() < 3 || ring_edges(poly).any(|(a, b)| point_on_segment(p, a, b)) {
        return false;
    }

    let n = poly.len();
    let mut inside = false;
    let mut p1 = poly[0];

    for i in 1..=n {
        let p2 = poly[i % n];

        if (p1.y > p.y) != (p2.y > p.y) {
            let xints = (p.y - p1.y) * (p2.x - p1.x) / (p2.y - p1.y) + p1.x;

            if p.x < xints {
                inside = !inside;
            }
        }

        p1 = p2;
    }

    inside
}

/// Running euclidean length of the polyline stored row-wise in `points`.
pub fn cumulative_distances(points: ArrayView2<'_, f64>) -> Array1<f64> {
    let n = points.nrows();
    let mut distances = Array1::zeros(n);

    for i in 1..n {
        let dx = points[[i, 0]] - points[[i - 1, 0]];
        let dy = points[[i, 1]] - points[[i - 1, 1]];
        distances[i] = distances[i - 1] + (dx * dx + dy * dy).sqrt();
    }

    distances
}

/// Index of the first element strictly greater than `value`.
pub fn search_sorted_right(values: ArrayView1<'_, f64>, value: f64) -> usize {
    let (mut lo, mut hi) = (0, values.len());

    while lo < hi {
        let mid = (lo + hi) / 2;

        if values[mid] <= value {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pt(x: f64, y: f64) -> Coordinate {
        Coordinate::new(x, y)
    }

    #[test]
    fn crossing_segments_meet_in_one_point() {
        let res = segment_intersection(&pt(0., 0.), &pt(4., 0.), &pt(1., -1.), &pt(1., 1.));

        match res {
            SegmentIntersection::Point { point, along } => {
                assert_abs_diff_eq!(point.x, 1.0, epsilon = 1e-9);
                assert_abs_diff_eq!(point.y, 0.0, epsilon = 1e-9);
                assert_abs_diff_eq!(along, 0.25, epsilon = 1e-9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn touching_endpoint_is_an_intersection() {
        let res = segment_intersection(&pt(0., 0.), &pt(2., 0.), &pt(2., -1.), &pt(2., 1.));

        assert!(matches!(res, SegmentIntersection::Point { along, .. } if along == 1.0));
    }

    #[test]
    fn parallel_segments_are_disjoint() {
        let res = segment_intersection(&pt(0., 0.), &pt(2., 0.), &pt(0., 1.), &pt(2., 1.));

        assert!(res.is_disjoint());
    }

    #[test]
    fn collinear_segments_overlap() {
        let res = segment_intersection(&pt(0., 0.), &pt(2., 0.), &pt(1., 0.), &pt(3., 0.));
        assert_eq!(res, SegmentIntersection::Overlap);

        let res = segment_intersection(&pt(0., 0.), &pt(2., 0.), &pt(2., 0.), &pt(3., 0.));
        assert!(matches!(res, SegmentIntersection::Point { along, .. } if along == 1.0));
    }

    #[test]
    fn boundary_points_are_not_in_polygon() {
        let square = [pt(0., 0.), pt(4., 0.), pt(4., 4.), pt(0., 4.)];

        assert!(in_polygon(&pt(2., 2.), &square));
        assert!(!in_polygon(&pt(4., 2.), &square));
        assert!(!in_polygon(&pt(0., 0.), &square));
        assert!(!in_polygon(&pt(5., 2.), &square));
    }

    #[test]
    fn distances_accumulate() {
        let points = array![[0., 0.], [3., 4.], [3., 4.], [6., 8.]];
        let distances = cumulative_distances(points.view());

        assert_eq!(distances, array![0., 5., 5., 10.]);
        assert_eq!(search_sorted_right(distances.view(), 5.0), 3);
        assert_eq!(search_sorted_right(distances.view(), 0.0), 1);
        assert_eq!(search_sorted_right(distances.view(), 10.0), 4);
    }

    #[test]
    fn offsets_are_validated() {
        assert!(RelativeOffset::new(0.5, 1.0).is_ok());
        assert_eq!(
            RelativeOffset::new(1.5, 0.0),
            Err(Error::InvalidOffset { x: 1.5, y: 0.0 })
        );
        assert_eq!(RelativeOffset::new(-0.0, 0.0).unwrap(), RelativeOffset::TOP_LEFT);
    }
}
