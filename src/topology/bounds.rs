//! Axis-aligned bounding boxes.
//!
//! Regions produced by the partition oracle, cell extents and the global
//! domain are all described by [`Bounds`]. An *empty* box has `min > max`
//! on at least one axis and is the identity for [`Bounds::union`].

use serde::{Deserialize, Serialize};

/// Closed axis-aligned box `[min, max]` in 3D.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Bounds {
    /// The empty box.
    pub const EMPTY: Bounds = Bounds {
        min: [f64::INFINITY; 3],
        max: [f64::NEG_INFINITY; 3],
    };

    #[inline]
    pub const fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Build from the `(xmin, xmax, ymin, ymax, zmin, zmax)` ordering.
    pub const fn from_xyz(b: [f64; 6]) -> Self {
        Self {
            min: [b[0], b[2], b[4]],
            max: [b[1], b[3], b[5]],
        }
    }

    /// The `(xmin, xmax, ymin, ymax, zmin, zmax)` ordering.
    pub fn to_xyz(&self) -> [f64; 6] {
        [
            self.min[0],
            self.max[0],
            self.min[1],
            self.max[1],
            self.min[2],
            self.max[2],
        ]
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f64; 3]>) -> Self {
        let mut b = Self::EMPTY;
        for p in points {
            b.include_point(*p);
        }
        b
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|a| !(self.min[a] <= self.max[a]))
    }

    #[inline]
    pub fn include_point(&mut self, p: [f64; 3]) {
        for a in 0..3 {
            self.min[a] = self.min[a].min(p[a]);
            self.max[a] = self.max[a].max(p[a]);
        }
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        let mut out = *self;
        for a in 0..3 {
            out.min[a] = out.min[a].min(other.min[a]);
            out.max[a] = out.max[a].max(other.max[a]);
        }
        out
    }

    #[inline]
    pub fn extent(&self, axis: usize) -> f64 {
        (self.max[axis] - self.min[axis]).max(0.0)
    }

    /// Axis with the largest extent; ties resolve to the lowest axis index.
    pub fn longest_axis(&self) -> usize {
        let mut best = 0;
        for a in 1..3 {
            if self.extent(a) > self.extent(best) {
                best = a;
            }
        }
        best
    }

    pub fn center(&self) -> [f64; 3] {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    /// Closed containment test.
    #[inline]
    pub fn contains(&self, p: [f64; 3]) -> bool {
        (0..3).all(|a| self.min[a] <= p[a] && p[a] <= self.max[a])
    }

    /// Overlap test used for boundary-cell membership.
    ///
    /// On axes where both boxes have positive extent the overlap must be
    /// strict, so boxes that merely share a face do not overlap. Flat axes
    /// fall back to closed comparison.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        (0..3).all(|a| {
            if self.extent(a) > 0.0 && other.extent(a) > 0.0 {
                self.min[a] < other.max[a] && self.max[a] > other.min[a]
            } else {
                self.min[a] <= other.max[a] && self.max[a] >= other.min[a]
            }
        })
    }

    /// Product of extents over `axes`; `0.0` for an empty box.
    pub fn measure(&self, axes: &[usize]) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        axes.iter().map(|&a| self.extent(a)).product()
    }

    /// Axes along which the box has positive extent.
    pub fn spanned_axes(&self) -> Vec<usize> {
        (0..3).filter(|&a| self.extent(a) > 0.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_union_identity() {
        let b = Bounds::new([0.0, 1.0, 2.0], [1.0, 2.0, 3.0]);
        assert!(Bounds::EMPTY.is_empty());
        assert_eq!(Bounds::EMPTY.union(&b), b);
    }

    #[test]
    fn face_sharing_boxes_do_not_overlap() {
        let a = Bounds::new([0.0; 3], [1.0; 3]);
        let b = Bounds::new([1.0, 0.0, 0.0], [2.0, 1.0, 1.0]);
        let c = Bounds::new([0.5, 0.0, 0.0], [2.0, 1.0, 1.0]);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
    }

    #[test]
    fn flat_axis_uses_closed_overlap() {
        let a = Bounds::new([0.0, 0.0, 0.0], [1.0, 1.0, 0.0]);
        let b = Bounds::new([0.5, 0.5, 0.0], [2.0, 2.0, 1.0]);
        assert!(a.overlaps(&b));
    }

    #[test]
    fn xyz_ordering_roundtrips() {
        let raw = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(Bounds::from_xyz(raw).to_xyz(), raw);
        assert_eq!(Bounds::from_xyz(raw).longest_axis(), 0);
    }
}
