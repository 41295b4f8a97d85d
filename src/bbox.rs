use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

use crate::error::Error;
use crate::math::{Coordinate, RelativeOffset};

pub trait BBoxFormat: std::fmt::Debug + Copy + PartialEq {}

/// Left-top-width-height format, contains left top corner and width-height
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Ltwh;
impl BBoxFormat for Ltwh {}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox<F: BBoxFormat>([f64; 4], PhantomData<F>);

impl<F: BBoxFormat> From<[f64; 4]> for BBox<F> {
    fn from(values: [f64; 4]) -> Self {
        BBox(values, Default::default())
    }
}

impl<F: BBoxFormat> From<BBox<F>> for [f64; 4] {
    fn from(bbox: BBox<F>) -> Self {
        bbox.0
    }
}

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f64; 4] {
        &self.0
    }
}

impl BBox<Ltwh> {
    /// Image-space box, all values must be finite and non-negative.
    pub fn ltwh(x: f64, y: f64, w: f64, h: f64) -> Result<Self, Error> {
        let raw = [x, y, w, h];

        if raw.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::InvalidBoundingBox(raw));
        }

        Ok(BBox(raw, Default::default()))
    }

    #[inline(always)]
    pub fn left(&self) -> f64 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f64 {
        self.0[1]
    }

    #[inline(always)]
    pub fn width(&self) -> f64 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f64 {
        self.0[3]
    }

    /// Point at `offset` inside the box.
    #[inline]
    pub fn anchor(&self, offset: &RelativeOffset) -> Coordinate {
        Coordinate::new(
            self.left() + self.width() * offset.x(),
            self.top() + self.height() * offset.y(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_applies_relative_offset() {
        let bbox = BBox::ltwh(10.0, 20.0, 4.0, 8.0).unwrap();

        assert_eq!(bbox.anchor(&RelativeOffset::TOP_LEFT), Coordinate::new(10.0, 20.0));
        assert_eq!(bbox.anchor(&RelativeOffset::CENTER), Coordinate::new(12.0, 24.0));
        assert_eq!(bbox.anchor(&RelativeOffset::BOTTOM), Coordinate::new(12.0, 28.0));
    }

    #[test]
    fn negative_dimensions_are_rejected() {
        assert_eq!(
            BBox::ltwh(0.0, 0.0, -1.0, 2.0),
            Err(Error::InvalidBoundingBox([0.0, 0.0, -1.0, 2.0]))
        );
    }
}
