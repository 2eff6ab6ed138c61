//! Slice plane geometry derived from the camera.
//!
//! [`build_reslice_information`] finds where the slice plane sits, how big
//! one screen pixel is on that plane, and the matrices that take output
//! slice pixels to world and to data coordinates.

use glam::{DMat4, DVec3, DVec4};
use volslice_core::{Extent, ViewCamera};

/// How the slice plane is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceSettings {
    /// Follow the camera focal point instead of `slice_point`.
    pub slice_at_focal_point: bool,
    /// Face the camera instead of using `slice_normal`.
    pub slice_faces_camera: bool,
    /// Point on the plane when not following the focal point.
    pub slice_point: DVec3,
    /// Plane normal when not facing the camera.
    pub slice_normal: DVec3,
}

impl Default for SliceSettings {
    fn default() -> Self {
        Self {
            slice_at_focal_point: true,
            slice_faces_camera: true,
            slice_point: DVec3::ZERO,
            slice_normal: DVec3::Z,
        }
    }
}

/// Everything the reslicer and the loader need about one slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResliceInformation {
    /// Point the plane passes through, in world coordinates.
    pub point: DVec3,
    /// Unit plane normal.
    pub normal: DVec3,
    /// Unit in-plane horizontal axis.
    pub v1: DVec3,
    /// Unit in-plane vertical axis.
    pub v2: DVec3,
    /// Slice coordinates to world coordinates.
    pub slice_to_world: DMat4,
    /// Slice coordinates to data coordinates, handed to the reslicer.
    pub reslice_matrix: DMat4,
    /// World units per output pixel along each axis.
    pub output_spacing: DVec3,
    /// Slice coordinates of output pixel `(0, 0)`.
    pub output_origin: DVec3,
    /// `[0, width - 1, 0, height - 1, 0, 0]`.
    pub output_extent: Extent,
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Pixel spacing for `length` world units across `pixels` pixels.
fn pixel_spacing(length: f64, pixels: u32) -> f64 {
    if pixels <= 1 {
        return 1.0;
    }
    let spacing = length / f64::from(pixels - 1);
    if spacing.is_finite() && spacing > 0.0 {
        spacing
    } else {
        1.0
    }
}

/// Builds the slice plane and reslice transforms for a viewport of
/// `viewport` pixels.
///
/// The in-plane basis is orthonormal even when the camera is degenerate;
/// in that case spacing falls back to 1.0 and the frame is still drawable.
pub fn build_reslice_information<C: ViewCamera + ?Sized>(
    camera: &C,
    viewport: (u32, u32),
    settings: &SliceSettings,
    world_to_data: &DMat4,
) -> ResliceInformation {
    let point = if settings.slice_at_focal_point {
        camera.focal_point()
    } else {
        settings.slice_point
    };
    let normal = if settings.slice_faces_camera {
        camera.view_plane_normal()
    } else {
        settings.slice_normal
    }
    .normalize_or(DVec3::Z);

    let (width, height) = viewport;
    let aspect = if height > 0 && width > 0 {
        f64::from(width) / f64::from(height)
    } else {
        1.0
    };
    let world_to_view = camera.projection_matrix(aspect, 0.0, 1.0) * camera.view_matrix();
    let det = world_to_view.determinant();
    let view_to_world = if det.is_finite() && det.abs() > f64::MIN_POSITIVE {
        world_to_view.inverse()
    } else {
        log::warn!("singular view transform, slice spacing falls back to 1.0");
        DMat4::IDENTITY
    };

    // Depth of the slice point, then the viewport corners at that depth.
    let depth = finite_or(world_to_view.project_point3(point).z, 0.0);
    let unproject = |x: f64, y: f64| {
        let p = view_to_world * DVec4::new(x, y, depth, 1.0);
        if p.w.abs() > f64::MIN_POSITIVE {
            p.truncate() / p.w
        } else {
            p.truncate()
        }
    };
    let corner = unproject(-1.0, -1.0);
    let raw_v1 = unproject(1.0, -1.0) - corner;
    let raw_v2 = unproject(-1.0, 1.0) - corner;
    let l1 = finite_or(raw_v1.length(), 0.0);
    let l2 = finite_or(raw_v2.length(), 0.0);

    let v1 = (raw_v1 - normal * normal.dot(raw_v1)).normalize_or(normal.any_orthonormal_vector());
    let mut v2 = normal.cross(v1);
    if v2.dot(raw_v2) < 0.0 {
        v2 = -v2;
    }

    let output_spacing = DVec3::new(pixel_spacing(l1, width), pixel_spacing(l2, height), 1.0);
    let output_origin = DVec3::new(
        finite_or(v1.dot(corner), 0.0),
        finite_or(v2.dot(corner), 0.0),
        0.0,
    );
    let last = |n: u32| i32::try_from(n.max(1) - 1).unwrap_or(i32::MAX);
    let output_extent = Extent::new(0, last(width), 0, last(height), 0, 0);

    // Plane offset along the normal equals normal . point exactly.
    let offset = normal.dot(point);
    let slice_to_world = DMat4::from_cols(
        v1.extend(0.0),
        v2.extend(0.0),
        normal.extend(0.0),
        (normal * offset).extend(1.0),
    );
    let reslice_matrix = *world_to_data * slice_to_world;

    ResliceInformation {
        point,
        normal,
        v1,
        v2,
        slice_to_world,
        reslice_matrix,
        output_spacing,
        output_origin,
        output_extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use volslice_core::{Camera, ProjectionMode};

    fn assert_orthonormal(info: &ResliceInformation) {
        let ResliceInformation { v1, v2, normal, .. } = *info;
        assert!(v1.dot(v2).abs() < 1e-9);
        assert!(v1.dot(normal).abs() < 1e-9);
        assert!(v2.dot(normal).abs() < 1e-9);
        assert!((v1.length() - 1.0).abs() < 1e-9);
        assert!((v2.length() - 1.0).abs() < 1e-9);
        assert!((normal.length() - 1.0).abs() < 1e-9);
    }

    fn ortho_camera(scale: f64) -> Camera {
        let mut camera = Camera::new();
        camera.projection_mode = ProjectionMode::Orthographic;
        camera.ortho_scale = scale;
        camera.position = DVec3::new(0.0, 0.0, 10.0);
        camera.near = 0.1;
        camera.far = 100.0;
        camera
    }

    #[test]
    fn test_axis_aligned_orthographic() {
        let camera = ortho_camera(5.0);
        let info =
            build_reslice_information(&camera, (11, 11), &SliceSettings::default(), &DMat4::IDENTITY);
        assert_orthonormal(&info);
        assert!((info.v1 - DVec3::X).length() < 1e-9);
        assert!((info.v2 - DVec3::Y).length() < 1e-9);
        assert!((info.normal - DVec3::Z).length() < 1e-9);
        // 10 world units across 11 pixels.
        assert!((info.output_spacing.x - 1.0).abs() < 1e-9);
        assert!((info.output_spacing.y - 1.0).abs() < 1e-9);
        assert!((info.output_origin.x + 5.0).abs() < 1e-9);
        assert!((info.output_origin.y + 5.0).abs() < 1e-9);
        assert_eq!(info.output_extent, Extent::new(0, 10, 0, 10, 0, 0));
    }

    #[test]
    fn test_plane_passes_through_point() {
        let camera = ortho_camera(2.0);
        let settings = SliceSettings {
            slice_at_focal_point: false,
            slice_faces_camera: false,
            slice_point: DVec3::new(1.0, 2.0, 3.0),
            slice_normal: DVec3::new(1.0, 1.0, 1.0),
        };
        let info = build_reslice_information(&camera, (64, 32), &settings, &DMat4::IDENTITY);
        assert_orthonormal(&info);
        let offset = info.slice_to_world.w_axis.truncate();
        assert!((info.normal.dot(offset) - info.normal.dot(settings.slice_point)).abs() < 1e-9);
        // The point lies on the plane z = 0 in slice coordinates.
        let local = info.slice_to_world.inverse().transform_point3(settings.slice_point);
        assert!(local.z.abs() < 1e-9);
    }

    #[test]
    fn test_reslice_matrix_composes_world_to_data() {
        let camera = ortho_camera(1.0);
        let world_to_data = DMat4::from_translation(DVec3::new(-4.0, 0.0, 2.0));
        let info =
            build_reslice_information(&camera, (8, 8), &SliceSettings::default(), &world_to_data);
        let p = DVec3::new(0.25, -0.5, 0.0);
        let expected = world_to_data.transform_point3(info.slice_to_world.transform_point3(p));
        assert!((info.reslice_matrix.transform_point3(p) - expected).length() < 1e-12);
    }

    #[test]
    fn test_single_pixel_viewport() {
        let camera = Camera::new();
        let info =
            build_reslice_information(&camera, (1, 1), &SliceSettings::default(), &DMat4::IDENTITY);
        assert_eq!(info.output_spacing, DVec3::ONE);
        assert_eq!(info.output_extent, Extent::new(0, 0, 0, 0, 0, 0));
    }

    #[test]
    fn test_zero_viewport_is_drawable() {
        let camera = Camera::new();
        let info =
            build_reslice_information(&camera, (0, 0), &SliceSettings::default(), &DMat4::IDENTITY);
        assert_orthonormal(&info);
        assert_eq!(info.output_spacing, DVec3::ONE);
    }

    #[test]
    fn test_camera_on_plane_stays_orthonormal() {
        let mut camera = Camera::new();
        camera.position = DVec3::new(3.0, 0.0, 0.0);
        let settings = SliceSettings {
            slice_faces_camera: false,
            slice_normal: DVec3::Y,
            ..SliceSettings::default()
        };
        let info = build_reslice_information(&camera, (100, 50), &settings, &DMat4::IDENTITY);
        assert_orthonormal(&info);
        assert!(info.output_spacing.x.is_finite() && info.output_spacing.x > 0.0);
        assert!(info.output_spacing.y.is_finite() && info.output_spacing.y > 0.0);
    }

    proptest! {
        #[test]
        fn prop_basis_is_orthonormal(
            px in -50.0f64..50.0, py in -50.0f64..50.0, pz in -50.0f64..50.0,
            tx in -5.0f64..5.0, ty in -5.0f64..5.0, tz in -5.0f64..5.0,
            ux in -1.0f64..1.0, uy in -1.0f64..1.0, uz in -1.0f64..1.0,
            width in 1u32..2000, height in 1u32..2000,
            parallel in any::<bool>(),
        ) {
            let position = DVec3::new(px, py, pz);
            let target = DVec3::new(tx, ty, tz);
            let up = DVec3::new(ux, uy, uz);
            let forward = target - position;
            prop_assume!(forward.length() > 1e-3);
            prop_assume!(up.length() > 1e-3);
            prop_assume!(forward.normalize().cross(up.normalize()).length() > 1e-3);

            let mut camera = Camera::new();
            camera.position = position;
            camera.target = target;
            camera.up = up;
            if parallel {
                camera.projection_mode = ProjectionMode::Orthographic;
            }
            let info = build_reslice_information(
                &camera,
                (width, height),
                &SliceSettings::default(),
                &DMat4::IDENTITY,
            );
            prop_assert!(info.v1.dot(info.v2).abs() < 1e-9);
            prop_assert!(info.v1.dot(info.normal).abs() < 1e-9);
            prop_assert!(info.v2.dot(info.normal).abs() < 1e-9);
            prop_assert!((info.v1.length() - 1.0).abs() < 1e-9);
            prop_assert!((info.v2.length() - 1.0).abs() < 1e-9);
            prop_assert!((info.normal.length() - 1.0).abs() < 1e-9);
        }
    }
}
