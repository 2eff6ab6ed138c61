//! Slab projection of a volume along one axis.
//!
//! A run of consecutive slices is collapsed into one by averaging, summing,
//! or taking the per-sample minimum or maximum. With multi-slice output the
//! slab slides along the axis instead: output slice `i` combines input
//! slices `i + range[0]` through `i + range[1]`.

use glam::DVec3;
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

use crate::color_convert::unpack_bits;
use crate::error::{Result, VolsliceError};
use crate::extent::Extent;
use crate::scalar::{Scalar, ScalarArray, ScalarView};
use crate::volume::ImageVolume;

/// How the samples of a slab are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionOperation {
    #[default]
    Average,
    Sum,
    Minimum,
    Maximum,
}

impl ProjectionOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectionOperation::Average => "average",
            ProjectionOperation::Sum => "sum",
            ProjectionOperation::Minimum => "minimum",
            ProjectionOperation::Maximum => "maximum",
        }
    }
}

/// Scalar type of the projected volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionOutputType {
    /// Same type as the input. Sums saturate at the type's bounds.
    #[default]
    Input,
    F32,
    F64,
}

/// Placement of a projection's output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionGeometry {
    pub extent: Extent,
    /// Shifted along the projection axis to the middle of the slab.
    pub origin: DVec3,
    /// Slice range after clamping to the input extent.
    pub slice_range: [i32; 2],
}

/// Projects a volume through a slab of slices.
///
/// Defaults to averaging all slices along z into a single output slice of
/// the input's scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageProjection {
    operation: ProjectionOperation,
    slice_direction: usize,
    slice_range: [i32; 2],
    output_type: ProjectionOutputType,
    multi_slice_output: bool,
}

impl Default for ImageProjection {
    fn default() -> Self {
        Self {
            operation: ProjectionOperation::Average,
            slice_direction: 2,
            slice_range: [i32::MIN, i32::MAX],
            output_type: ProjectionOutputType::Input,
            multi_slice_output: false,
        }
    }
}

impl ImageProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation(&self) -> ProjectionOperation {
        self.operation
    }

    pub fn set_operation(&mut self, operation: ProjectionOperation) {
        self.operation = operation;
    }

    /// Axis the slab runs along: 0 for x, 1 for y, 2 for z.
    pub fn slice_direction(&self) -> usize {
        self.slice_direction
    }

    /// Sets the projection axis, clamped to 2.
    pub fn set_slice_direction(&mut self, axis: usize) {
        self.slice_direction = axis.min(2);
    }

    pub fn slice_range(&self) -> [i32; 2] {
        self.slice_range
    }

    /// Sets the slices to combine. The range is clamped to the input
    /// extent when the projection runs.
    pub fn set_slice_range(&mut self, range: [i32; 2]) {
        self.slice_range = range;
    }

    pub fn output_type(&self) -> ProjectionOutputType {
        self.output_type
    }

    pub fn set_output_type(&mut self, output_type: ProjectionOutputType) {
        self.output_type = output_type;
    }

    pub fn multi_slice_output(&self) -> bool {
        self.multi_slice_output
    }

    pub fn set_multi_slice_output(&mut self, enabled: bool) {
        self.multi_slice_output = enabled;
    }

    /// Output extent and origin for `input`.
    pub fn geometry(&self, input: &ImageVolume) -> Result<ProjectionGeometry> {
        let axis = self.slice_direction;
        let whole = input.extent();
        let (lo, hi) = whole.axis(axis);
        let range = [self.slice_range[0].max(lo), self.slice_range[1].min(hi)];
        if range[0] > range[1] {
            return Err(VolsliceError::InvalidExtent(
                whole.with_axis(axis, range[0], range[1]).0,
            ));
        }

        let mut origin = input.origin();
        origin[axis] += 0.5 * input.spacing()[axis] * (f64::from(range[0]) + f64::from(range[1]));
        let extent = if self.multi_slice_output {
            whole.with_axis(axis, lo - range[0], hi - range[1])
        } else {
            whole.with_axis(axis, 0, 0)
        };
        Ok(ProjectionGeometry {
            extent,
            origin,
            slice_range: range,
        })
    }

    /// Runs the projection. Bitmaps are projected as unsigned bytes.
    pub fn execute(&self, input: &ImageVolume) -> Result<ImageVolume> {
        let geometry = self.geometry(input)?;
        log::debug!(
            "projecting {:?} along axis {} over slices {:?} ({})",
            input.extent().0,
            self.slice_direction,
            geometry.slice_range,
            self.operation.as_str()
        );
        let plan = SlabPlan {
            operation: self.operation,
            axis: self.slice_direction,
            range: geometry.slice_range,
            output_extent: geometry.extent,
            input_extent: input.extent(),
            increments: input.increments(),
            components: input.num_components(),
        };
        let view = input.scalars().view();
        let scalars = match view {
            ScalarView::Bit { bytes, offset, len } => {
                let unpacked = unpack_bits(bytes, offset, len)?;
                project_typed(&unpacked, &plan, self.output_type)?
            }
            _ => crate::with_scalar_slice!(
                view,
                values => project_typed(values, &plan, self.output_type)?,
                bits => return Err(VolsliceError::UnsupportedScalarType(view.scalar_type().to_string()))
            ),
        };
        ImageVolume::new(geometry.extent, input.spacing(), geometry.origin, scalars)
    }
}

fn project_typed<T>(
    values: &[T],
    plan: &SlabPlan,
    output_type: ProjectionOutputType,
) -> Result<ScalarArray>
where
    T: Scalar + AsPrimitive<T> + AsPrimitive<f32>,
{
    match output_type {
        ProjectionOutputType::Input => ScalarArray::from_vec(plan.run::<T, T>(values), plan.components),
        ProjectionOutputType::F32 => ScalarArray::from_vec(plan.run::<T, f32>(values), plan.components),
        ProjectionOutputType::F64 => ScalarArray::from_vec(plan.run::<T, f64>(values), plan.components),
    }
}

/// Rounds half up for integer outputs; floats pass through.
fn store<O: Scalar>(value: f64) -> O {
    if O::TYPE.is_integer() {
        O::from_f64_saturating((value + 0.5).floor())
    } else {
        O::from_f64_saturating(value)
    }
}

struct SlabPlan {
    operation: ProjectionOperation,
    axis: usize,
    range: [i32; 2],
    output_extent: Extent,
    input_extent: Extent,
    increments: [usize; 3],
    components: usize,
}

impl SlabPlan {
    fn run<T, O>(&self, values: &[T]) -> Vec<O>
    where
        T: Scalar + AsPrimitive<O>,
        O: Scalar,
    {
        let slices = usize::try_from(i64::from(self.range[1]) - i64::from(self.range[0]) + 1)
            .unwrap_or(0);
        let step = self.increments[self.axis];
        let [x0, x1, y0, y1, z0, z1] = self.output_extent.0;
        let mut out = Vec::with_capacity(self.output_extent.num_points() * self.components);
        for k in z0..=z1 {
            for j in y0..=y1 {
                for i in x0..=x1 {
                    let mut first = [i, j, k];
                    first[self.axis] += self.range[0];
                    let base = self.offset(first);
                    for c in 0..self.components {
                        let slab = (0..slices).map(|s| values[base + s * step + c]);
                        out.push(self.combine(slab, slices));
                    }
                }
            }
        }
        out
    }

    fn offset(&self, index: [i32; 3]) -> usize {
        (0..3)
            .map(|axis| {
                let rel = i64::from(index[axis]) - i64::from(self.input_extent.0[2 * axis]);
                usize::try_from(rel).unwrap_or(0) * self.increments[axis]
            })
            .sum()
    }

    #[allow(clippy::cast_precision_loss)]
    fn combine<T, O>(&self, slab: impl Iterator<Item = T>, slices: usize) -> O
    where
        T: Scalar + AsPrimitive<O>,
        O: Scalar,
    {
        let pick = |best: Option<T>| best.map_or_else(|| store(0.0), AsPrimitive::<O>::as_);
        match self.operation {
            ProjectionOperation::Average => {
                let sum: f64 = slab.map(AsPrimitive::<f64>::as_).sum();
                store(sum * (1.0 / slices as f64))
            }
            ProjectionOperation::Sum => store(slab.map(AsPrimitive::<f64>::as_).sum()),
            ProjectionOperation::Minimum => pick(slab.reduce(|a, b| if b < a { b } else { a })),
            ProjectionOperation::Maximum => pick(slab.reduce(|a, b| if b > a { b } else { a })),
        }
    }
}
