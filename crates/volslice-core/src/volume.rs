//! Structured image volumes.

use glam::DVec3;

use crate::error::{Result, VolsliceError};
use crate::extent::Extent;
use crate::mtime::TimeStamp;
use crate::scalar::{Scalar, ScalarArray, ScalarView};

/// A 3D grid of scalar samples with physical placement.
///
/// Samples are stored x-fastest, then y, then z, with components
/// interleaved. The extent need not start at zero.
#[derive(Debug, Clone)]
pub struct ImageVolume {
    extent: Extent,
    spacing: DVec3,
    origin: DVec3,
    scalars: ScalarArray,
    mtime: TimeStamp,
}

impl ImageVolume {
    /// Creates a volume, checking that the sample count matches the extent.
    pub fn new(extent: Extent, spacing: DVec3, origin: DVec3, scalars: ScalarArray) -> Result<Self> {
        if extent.is_empty() {
            return Err(VolsliceError::InvalidExtent(extent.0));
        }
        if scalars.num_tuples() != extent.num_points() {
            return Err(VolsliceError::SizeMismatch {
                expected: extent.num_points() * scalars.num_components(),
                actual: scalars.len(),
            });
        }
        Ok(Self {
            extent,
            spacing,
            origin,
            scalars,
            mtime: TimeStamp::new(),
        })
    }

    /// Builds a volume by evaluating `f(i, j, k, component)` at every sample.
    pub fn from_fn<T: Scalar>(
        extent: Extent,
        components: usize,
        spacing: DVec3,
        origin: DVec3,
        mut f: impl FnMut(i32, i32, i32, usize) -> T,
    ) -> Result<Self> {
        let mut values = Vec::with_capacity(extent.num_points() * components);
        let [x0, x1, y0, y1, z0, z1] = extent.0;
        for k in z0..=z1 {
            for j in y0..=y1 {
                for i in x0..=x1 {
                    for c in 0..components {
                        values.push(f(i, j, k, c));
                    }
                }
            }
        }
        Self::new(extent, spacing, origin, ScalarArray::from_vec(values, components)?)
    }

    /// The whole extent of the stored samples.
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Physical distance between samples.
    #[must_use]
    pub fn spacing(&self) -> DVec3 {
        self.spacing
    }

    /// Physical position of index `(0, 0, 0)`.
    #[must_use]
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    /// The stored samples.
    #[must_use]
    pub fn scalars(&self) -> &ScalarArray {
        &self.scalars
    }

    /// Mutable samples; marks the volume modified.
    pub fn scalars_mut(&mut self) -> &mut ScalarArray {
        self.mtime.modified();
        &mut self.scalars
    }

    /// Components per sample.
    #[must_use]
    pub fn num_components(&self) -> usize {
        self.scalars.num_components()
    }

    /// Sets the spacing.
    pub fn set_spacing(&mut self, spacing: DVec3) {
        if spacing != self.spacing {
            self.spacing = spacing;
            self.mtime.modified();
        }
    }

    /// Sets the origin.
    pub fn set_origin(&mut self, origin: DVec3) {
        if origin != self.origin {
            self.origin = origin;
            self.mtime.modified();
        }
    }

    /// Marks the volume modified.
    pub fn modified(&mut self) {
        self.mtime.modified();
    }

    /// Last modification time.
    #[must_use]
    pub fn mtime(&self) -> TimeStamp {
        self.mtime
    }

    /// Value increments between neighbouring samples along x, y and z.
    #[must_use]
    pub fn increments(&self) -> [usize; 3] {
        let [nx, ny, _] = self.extent.dimensions();
        let comps = self.num_components();
        [comps, comps * nx, comps * nx * ny]
    }

    /// Values to skip after each row and after each slice when walking
    /// `extent` row by row.
    ///
    /// The x increment is always zero because rows are read contiguously.
    pub fn continuous_increments(&self, extent: &Extent) -> Result<[usize; 3]> {
        self.check_sub_extent(extent)?;
        let [_, inc_y, inc_z] = self.increments();
        let [nx, ny, _] = extent.dimensions();
        Ok([
            0,
            inc_y - nx * self.num_components(),
            inc_z - ny * inc_y,
        ])
    }

    /// Value offset of sample `(i, j, k)`.
    #[must_use]
    pub fn value_offset(&self, i: i32, j: i32, k: i32) -> usize {
        let [inc_x, inc_y, inc_z] = self.increments();
        let rel = |v: i32, axis: usize| {
            usize::try_from(i64::from(v) - i64::from(self.extent.0[2 * axis])).unwrap_or(0)
        };
        rel(i, 0) * inc_x + rel(j, 1) * inc_y + rel(k, 2) * inc_z
    }

    /// View of all values from the first sample of `extent` to the end of
    /// the storage.
    pub fn view_for_extent(&self, extent: &Extent) -> Result<ScalarView<'_>> {
        self.check_sub_extent(extent)?;
        let start = self.value_offset(extent.0[0], extent.0[2], extent.0[4]);
        let view = self.scalars.view();
        Ok(view.slice(start, view.len() - start))
    }

    /// Reads one component of one sample as a double.
    #[must_use]
    pub fn sample(&self, i: i32, j: i32, k: i32, component: usize) -> f64 {
        self.scalars
            .view()
            .get_f64(self.value_offset(i, j, k) + component)
    }

    /// Physical position of a (possibly fractional) index.
    #[must_use]
    pub fn index_to_physical(&self, index: DVec3) -> DVec3 {
        self.origin + index * self.spacing
    }

    /// Fractional index of a physical position.
    #[must_use]
    pub fn physical_to_index(&self, point: DVec3) -> DVec3 {
        (point - self.origin) / self.spacing
    }

    /// Axis-aligned physical bounds `[xmin, xmax, ymin, ymax, zmin, zmax]`.
    ///
    /// Negative spacing flips the bound order along that axis.
    #[must_use]
    pub fn bounds(&self) -> [f64; 6] {
        let spacing = self.spacing.to_array();
        let origin = self.origin.to_array();
        let mut bounds = [0.0; 6];
        for axis in 0..3 {
            let (lo, hi) = self.extent.axis(axis);
            let (lo, hi) = if spacing[axis] < 0.0 { (hi, lo) } else { (lo, hi) };
            bounds[2 * axis] = origin[axis] + f64::from(lo) * spacing[axis];
            bounds[2 * axis + 1] = origin[axis] + f64::from(hi) * spacing[axis];
        }
        bounds
    }

    fn check_sub_extent(&self, extent: &Extent) -> Result<()> {
        if self.extent.contains(extent) {
            Ok(())
        } else {
            Err(VolsliceError::InvalidExtent(extent.0))
        }
    }
}
