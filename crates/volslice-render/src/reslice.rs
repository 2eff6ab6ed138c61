//! Resampling a volume on an oblique plane.

use glam::{DMat4, DVec3};
use volslice_core::color_convert::unpack_bits;
use volslice_core::{
    Extent, ImageVolume, Interpolation, Scalar, ScalarArray, ScalarView, TimeStamp, VolsliceError,
};

use crate::error::RenderResult;
use crate::geometry::ResliceInformation;

const EDGE_TOLERANCE: f64 = 1e-7;
const LANCZOS_RADIUS: i32 = 3;

/// Interpolation taps along one axis.
#[derive(Debug, Clone, Copy)]
struct Taps {
    index: [i32; 6],
    weight: [f64; 6],
    len: usize,
}

impl Taps {
    fn single(index: i32) -> Self {
        let mut taps = Self {
            index: [0; 6],
            weight: [0.0; 6],
            len: 1,
        };
        taps.index[0] = index;
        taps.weight[0] = 1.0;
        taps
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

/// Taps for continuous index `x` on the inclusive range `[lo, hi]`, or
/// `None` when `x` falls outside the data.
#[allow(clippy::cast_possible_truncation)]
fn axis_taps(x: f64, lo: i32, hi: i32, interpolation: Interpolation) -> Option<Taps> {
    let (flo, fhi) = (f64::from(lo), f64::from(hi));
    if interpolation == Interpolation::Nearest {
        if x < flo - 0.5 - EDGE_TOLERANCE || x >= fhi + 0.5 + EDGE_TOLERANCE {
            return None;
        }
        let i = ((x + 0.5).floor() as i32).clamp(lo, hi);
        return Some(Taps::single(i));
    }

    if x < flo - EDGE_TOLERANCE || x > fhi + EDGE_TOLERANCE {
        return None;
    }
    let x = x.clamp(flo, fhi);
    let base = x.floor();
    let f = x - base;
    let i0 = base as i32;
    if f < EDGE_TOLERANCE {
        return Some(Taps::single(i0));
    }

    let mut taps = Taps {
        index: [0; 6],
        weight: [0.0; 6],
        len: 0,
    };
    let mut push = |i: i32, w: f64| {
        taps.index[taps.len] = i.clamp(lo, hi);
        taps.weight[taps.len] = w;
        taps.len += 1;
    };
    match interpolation {
        Interpolation::Nearest | Interpolation::Linear => {
            push(i0, 1.0 - f);
            push(i0 + 1, f);
        }
        Interpolation::Cubic => {
            // Catmull-Rom
            let f2 = f * f;
            let f3 = f2 * f;
            push(i0 - 1, 0.5 * (-f3 + 2.0 * f2 - f));
            push(i0, 0.5 * (3.0 * f3 - 5.0 * f2 + 2.0));
            push(i0 + 1, 0.5 * (-3.0 * f3 + 4.0 * f2 + f));
            push(i0 + 2, 0.5 * (f3 - f2));
        }
        Interpolation::Lanczos => {
            let a = f64::from(LANCZOS_RADIUS);
            let mut weights = [0.0; 6];
            let mut sum = 0.0;
            for (n, w) in weights.iter_mut().enumerate() {
                let offset = n as i32 - LANCZOS_RADIUS + 1;
                let t = f - f64::from(offset);
                *w = sinc(t) * sinc(t / a);
                sum += *w;
            }
            for (n, w) in weights.iter().enumerate() {
                push(i0 + n as i32 - LANCZOS_RADIUS + 1, w / sum);
            }
        }
    }
    Some(taps)
}

/// Geometry of one reslice output.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ResliceKey {
    input_mtime: TimeStamp,
    input_extent: Extent,
    axes: DMat4,
    spacing: DVec3,
    origin: DVec3,
    extent: Extent,
    interpolation: Interpolation,
}

/// Resamples a volume onto the output grid of a [`ResliceInformation`].
///
/// Output pixel `(i, j)` sits at slice coordinates
/// `origin + (i * spacing.x, j * spacing.y, 0)`; the reslice matrix takes
/// it to data coordinates. Samples outside the volume are zero. The output
/// keeps the input's scalar type and component count, except that bitmaps
/// become unsigned bytes.
#[derive(Debug, Default)]
pub struct ImageReslice {
    output: Option<ImageVolume>,
    key: Option<ResliceKey>,
    executions: usize,
}

impl ImageReslice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the output was recomputed.
    pub fn executions(&self) -> usize {
        self.executions
    }

    /// The last output, if any.
    pub fn output(&self) -> Option<&ImageVolume> {
        self.output.as_ref()
    }

    /// Drops the cached output.
    pub fn clear(&mut self) {
        self.output = None;
        self.key = None;
    }

    /// Brings the output up to date and returns it.
    ///
    /// When nothing changed since the last call the cached output, and its
    /// modification time, are returned untouched.
    pub fn update(
        &mut self,
        input: &ImageVolume,
        info: &ResliceInformation,
        interpolation: Interpolation,
    ) -> RenderResult<&ImageVolume> {
        let key = ResliceKey {
            input_mtime: input.mtime(),
            input_extent: input.extent(),
            axes: info.reslice_matrix,
            spacing: info.output_spacing,
            origin: info.output_origin,
            extent: info.output_extent,
            interpolation,
        };
        let output = match self.output.take() {
            Some(output) if self.key == Some(key) => output,
            _ => {
                log::debug!(
                    "reslicing {:?} onto {:?} ({})",
                    input.extent().0,
                    info.output_extent.0,
                    interpolation.as_str()
                );
                let output = reslice(input, info, interpolation)?;
                self.key = Some(key);
                self.executions += 1;
                output
            }
        };
        Ok(self.output.insert(output))
    }
}

/// Resamples `input` on the plane described by `info`.
pub fn reslice(
    input: &ImageVolume,
    info: &ResliceInformation,
    interpolation: Interpolation,
) -> RenderResult<ImageVolume> {
    let components = input.num_components();
    let plan = SamplePlan::new(input, info, interpolation);
    let view = input.scalars().view();
    let scalars = match view {
        ScalarView::Bit { bytes, offset, len } => {
            let unpacked = unpack_bits(bytes, offset, len)?;
            ScalarArray::from_vec(plan.run(&unpacked, components), components)?
        }
        _ => volslice_core::with_scalar_slice!(
            view,
            values => ScalarArray::from_vec(plan.run(values, components), components)?,
            bits => return Err(VolsliceError::UnsupportedScalarType(view.scalar_type().to_string()).into())
        ),
    };
    let output = ImageVolume::new(
        info.output_extent,
        DVec3::new(info.output_spacing.x, info.output_spacing.y, 1.0),
        DVec3::new(info.output_origin.x, info.output_origin.y, 0.0),
        scalars,
    )?;
    Ok(output)
}

/// Per-pixel continuous indices for one reslice.
struct SamplePlan {
    /// Continuous input index per output pixel, row by row.
    indices: Vec<DVec3>,
    input_extent: Extent,
    increments: [usize; 3],
    interpolation: Interpolation,
}

impl SamplePlan {
    fn new(input: &ImageVolume, info: &ResliceInformation, interpolation: Interpolation) -> Self {
        let [nx, ny, _] = info.output_extent.dimensions();
        let [x0, _, y0, _, z0, _] = info.output_extent.0;
        let mut indices = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let local = info.output_origin
                    + DVec3::new(
                        (f64::from(x0) + i as f64) * info.output_spacing.x,
                        (f64::from(y0) + j as f64) * info.output_spacing.y,
                        f64::from(z0) * info.output_spacing.z,
                    );
                let data = info.reslice_matrix.transform_point3(local);
                indices.push(input.physical_to_index(data));
            }
        }
        Self {
            indices,
            input_extent: input.extent(),
            increments: input.increments(),
            interpolation,
        }
    }

    #[allow(clippy::cast_sign_loss)]
    fn run<T: Scalar>(&self, values: &[T], components: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(self.indices.len() * components);
        let [lx, hx, ly, hy, lz, hz] = self.input_extent.0;
        let offset = |i: i32, lo: i32, inc: usize| (i - lo) as usize * inc;
        for index in &self.indices {
            let taps = (
                axis_taps(index.x, lx, hx, self.interpolation),
                axis_taps(index.y, ly, hy, self.interpolation),
                axis_taps(index.z, lz, hz, self.interpolation),
            );
            let (Some(tx), Some(ty), Some(tz)) = taps else {
                out.resize(out.len() + components, T::from_f64_saturating(0.0));
                continue;
            };
            for c in 0..components {
                let mut sum = 0.0;
                for z in 0..tz.len {
                    let oz = offset(tz.index[z], lz, self.increments[2]);
                    for y in 0..ty.len {
                        let oy = oz + offset(ty.index[y], ly, self.increments[1]);
                        let wzy = tz.weight[z] * ty.weight[y];
                        for x in 0..tx.len {
                            let o = oy + offset(tx.index[x], lx, self.increments[0]) + c;
                            let v: f64 = values[o].as_();
                            sum += wzy * tx.weight[x] * v;
                        }
                    }
                }
                out.push(T::from_f64_saturating(sum));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{build_reslice_information, SliceSettings};
    use volslice_core::{Camera, ProjectionMode, ScalarType};

    fn ramp_volume() -> ImageVolume {
        ImageVolume::from_fn(
            Extent::new(0, 9, 0, 9, 0, 4),
            1,
            DVec3::ONE,
            DVec3::ZERO,
            |i, j, k, _| u8::try_from(i + 10 * j + k).unwrap_or(u8::MAX),
        )
        .unwrap()
    }

    /// Axis-aligned slice through `z`, one output pixel per voxel.
    fn axial_info(z: f64) -> ResliceInformation {
        let mut camera = Camera::new();
        camera.projection_mode = ProjectionMode::Orthographic;
        camera.target = DVec3::new(4.5, 4.5, z);
        camera.position = DVec3::new(4.5, 4.5, z + 20.0);
        camera.ortho_scale = 4.5;
        camera.near = 1.0;
        camera.far = 100.0;
        build_reslice_information(&camera, (10, 10), &SliceSettings::default(), &DMat4::IDENTITY)
    }

    #[test]
    fn test_axis_taps_nearest() {
        let taps = axis_taps(2.4, 0, 9, Interpolation::Nearest).unwrap();
        assert_eq!((taps.len, taps.index[0]), (1, 2));
        assert!(axis_taps(-0.6, 0, 9, Interpolation::Nearest).is_none());
        assert!(axis_taps(9.6, 0, 9, Interpolation::Nearest).is_none());
    }

    #[test]
    fn test_axis_taps_weights_sum_to_one() {
        for interpolation in [
            Interpolation::Linear,
            Interpolation::Cubic,
            Interpolation::Lanczos,
        ] {
            let taps = axis_taps(3.3, 0, 9, interpolation).unwrap();
            let sum: f64 = taps.weight[..taps.len].iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "{interpolation:?}");
        }
        assert!(axis_taps(9.5, 0, 9, Interpolation::Linear).is_none());
    }

    #[test]
    fn test_flat_axis_accepts_exact_index() {
        let taps = axis_taps(0.0, 0, 0, Interpolation::Cubic).unwrap();
        assert_eq!(taps.len, 1);
    }

    #[test]
    fn test_nearest_axial_slice_reproduces_volume() {
        let volume = ramp_volume();
        let output = reslice(&volume, &axial_info(2.0), Interpolation::Nearest).unwrap();
        assert_eq!(output.extent(), Extent::new(0, 9, 0, 9, 0, 0));
        assert_eq!(output.scalars().scalar_type(), ScalarType::U8);
        for j in 0..10 {
            for i in 0..10 {
                assert_eq!(
                    output.sample(i, j, 0, 0),
                    volume.sample(i, j, 2, 0),
                    "pixel ({i}, {j})"
                );
            }
        }
    }

    #[test]
    fn test_linear_between_slices() {
        let volume = ramp_volume();
        let output = reslice(&volume, &axial_info(2.5), Interpolation::Linear).unwrap();
        // Halfway between 13 and 14.
        let v = output.sample(1, 1, 0, 0);
        assert!((v - 13.5).abs() <= 0.5 + 1e-9, "{v}");
    }

    #[test]
    fn test_outside_is_zero() {
        let volume = ramp_volume();
        let output = reslice(&volume, &axial_info(40.0), Interpolation::Cubic).unwrap();
        assert!(output.scalars().as_u8().unwrap().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_bitmap_becomes_bytes() {
        let bits = ScalarArray::from_bits(vec![0b1010_0000], 4, 1).unwrap();
        let volume =
            ImageVolume::new(Extent::new(0, 1, 0, 1, 0, 0), DVec3::ONE, DVec3::ZERO, bits).unwrap();
        let mut camera = Camera::new();
        camera.projection_mode = ProjectionMode::Orthographic;
        camera.target = DVec3::new(0.5, 0.5, 0.0);
        camera.position = DVec3::new(0.5, 0.5, 5.0);
        camera.ortho_scale = 0.5;
        let info =
            build_reslice_information(&camera, (2, 2), &SliceSettings::default(), &DMat4::IDENTITY);
        let output = reslice(&volume, &info, Interpolation::Nearest).unwrap();
        assert_eq!(output.scalars().as_u8().unwrap(), &[1, 0, 1, 0]);
    }

    #[test]
    fn test_update_caches_output() {
        let mut volume = ramp_volume();
        let info = axial_info(1.0);
        let mut reslicer = ImageReslice::new();
        let first = reslicer
            .update(&volume, &info, Interpolation::Nearest)
            .unwrap()
            .mtime();
        let second = reslicer
            .update(&volume, &info, Interpolation::Nearest)
            .unwrap()
            .mtime();
        assert_eq!(first, second);
        assert_eq!(reslicer.executions(), 1);

        volume.modified();
        let third = reslicer
            .update(&volume, &info, Interpolation::Nearest)
            .unwrap()
            .mtime();
        assert!(third > second);
        reslicer
            .update(&volume, &info, Interpolation::Linear)
            .unwrap();
        assert_eq!(reslicer.executions(), 3);
    }
}
