//! Inclusive integer index ranges over a 3D grid.

use serde::{Deserialize, Serialize};

/// Inclusive structured-grid extent `[x0, x1, y0, y1, z0, z1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent(pub [i32; 6]);

impl Extent {
    /// Creates an extent from its six bounds.
    #[must_use]
    pub const fn new(x0: i32, x1: i32, y0: i32, y1: i32, z0: i32, z1: i32) -> Self {
        Self([x0, x1, y0, y1, z0, z1])
    }

    /// Extent of a `[nx, ny, nz]` grid starting at the origin.
    ///
    /// Dimensions beyond `i32::MAX` saturate.
    #[must_use]
    pub fn from_dimensions(dims: [usize; 3]) -> Self {
        let last = |n: usize| i32::try_from(n).unwrap_or(i32::MAX) - 1;
        Self([0, last(dims[0]), 0, last(dims[1]), 0, last(dims[2])])
    }

    /// Lower and upper bound along `axis`.
    #[must_use]
    pub fn axis(&self, axis: usize) -> (i32, i32) {
        (self.0[2 * axis], self.0[2 * axis + 1])
    }

    /// Number of samples along `axis` (zero when the range is inverted).
    #[must_use]
    pub fn axis_len(&self, axis: usize) -> usize {
        let (lo, hi) = self.axis(axis);
        usize::try_from(i64::from(hi) - i64::from(lo) + 1).unwrap_or(0)
    }

    /// Samples along each axis.
    #[must_use]
    pub fn dimensions(&self) -> [usize; 3] {
        [self.axis_len(0), self.axis_len(1), self.axis_len(2)]
    }

    /// Total number of grid points.
    #[must_use]
    pub fn num_points(&self) -> usize {
        self.dimensions().iter().product()
    }

    /// Whether any axis has an inverted range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_points() == 0
    }

    /// Whether `axis` collapses to a single sample.
    #[must_use]
    pub fn is_flat(&self, axis: usize) -> bool {
        let (lo, hi) = self.axis(axis);
        lo == hi
    }

    /// Whether `other` lies entirely inside this extent.
    #[must_use]
    pub fn contains(&self, other: &Extent) -> bool {
        (0..3).all(|axis| {
            let (lo, hi) = self.axis(axis);
            let (olo, ohi) = other.axis(axis);
            olo >= lo && ohi <= hi && olo <= ohi
        })
    }

    /// Returns a copy with the bounds along `axis` replaced.
    #[must_use]
    pub fn with_axis(mut self, axis: usize, lo: i32, hi: i32) -> Self {
        self.0[2 * axis] = lo;
        self.0[2 * axis + 1] = hi;
        self
    }

    /// Intersection of two extents, if non-empty.
    #[must_use]
    pub fn intersect(&self, other: &Extent) -> Option<Extent> {
        let mut out = [0; 6];
        for axis in 0..3 {
            let (lo, hi) = self.axis(axis);
            let (olo, ohi) = other.axis(axis);
            out[2 * axis] = lo.max(olo);
            out[2 * axis + 1] = hi.min(ohi);
            if out[2 * axis] > out[2 * axis + 1] {
                return None;
            }
        }
        Some(Extent(out))
    }
}

impl From<[i32; 6]> for Extent {
    fn from(bounds: [i32; 6]) -> Self {
        Self(bounds)
    }
}
