//! Camera and view management.

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

/// Camera projection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionMode {
    /// Perspective projection.
    #[default]
    Perspective,
    /// Orthographic (parallel) projection.
    Orthographic,
}

/// What the slice mapper needs to know about a camera.
pub trait ViewCamera {
    /// Point the camera is looking at; the slice passes through it.
    fn focal_point(&self) -> DVec3;

    /// Unit vector from the focal point towards the camera.
    fn view_plane_normal(&self) -> DVec3;

    /// World to camera coordinates.
    fn view_matrix(&self) -> DMat4;

    /// Camera to clip coordinates, with clip-space depth remapped so the
    /// near plane lands on `near_z` and the far plane on `far_z`.
    fn projection_matrix(&self, aspect: f64, near_z: f64, far_z: f64) -> DMat4;

    /// Near and far clipping distances.
    fn clipping_range(&self) -> [f64; 2];

    /// Whether the projection is parallel.
    fn is_parallel(&self) -> bool;

    /// Distance from the camera to the focal point.
    fn distance(&self) -> f64;
}

/// A 3D camera for viewing the scene.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space.
    pub position: DVec3,
    /// Point the camera is looking at.
    pub target: DVec3,
    /// Up vector.
    pub up: DVec3,
    /// Vertical field of view in radians.
    pub fov: f64,
    /// Near clipping distance.
    pub near: f64,
    /// Far clipping distance.
    pub far: f64,
    /// Projection mode.
    pub projection_mode: ProjectionMode,
    /// Half the viewport height in world units (orthographic only).
    pub ortho_scale: f64,
}

impl Camera {
    /// Creates a new camera with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: DVec3::new(0.0, 0.0, 3.0),
            target: DVec3::ZERO,
            up: DVec3::Y,
            fov: std::f64::consts::FRAC_PI_4,
            near: 0.01,
            far: 1000.0,
            projection_mode: ProjectionMode::Perspective,
            ortho_scale: 1.0,
        }
    }

    /// Returns the camera's forward direction.
    #[must_use]
    pub fn forward(&self) -> DVec3 {
        (self.target - self.position).normalize_or(DVec3::NEG_Z)
    }

    /// Frames an axis-aligned box, looking down the negative z axis.
    pub fn look_at_box(&mut self, min: DVec3, max: DVec3, aspect: f64) {
        let center = (min + max) * 0.5;
        let extents = max - min;
        let size = extents.length().max(1e-6);

        self.target = center;
        self.position = center + DVec3::new(0.0, 0.0, size * 1.5);
        self.up = DVec3::Y;
        self.near = size * 0.001;
        self.far = size * 100.0;

        let half_height = extents.y.max(extents.x / aspect.max(1e-6)) * 0.6;
        self.ortho_scale = half_height.max(0.1);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewCamera for Camera {
    fn focal_point(&self) -> DVec3 {
        self.target
    }

    fn view_plane_normal(&self) -> DVec3 {
        -self.forward()
    }

    fn view_matrix(&self) -> DMat4 {
        DMat4::look_at_rh(self.position, self.target, self.up)
    }

    fn clipping_range(&self) -> [f64; 2] {
        [self.near, self.far]
    }

    fn is_parallel(&self) -> bool {
        self.projection_mode == ProjectionMode::Orthographic
    }

    fn distance(&self) -> f64 {
        self.position.distance(self.target)
    }

    fn projection_matrix(&self, aspect: f64, near_z: f64, far_z: f64) -> DMat4 {
        let gl = match self.projection_mode {
            ProjectionMode::Perspective => {
                DMat4::perspective_rh_gl(self.fov, aspect, self.near, self.far)
            }
            ProjectionMode::Orthographic => {
                let half_height = self.ortho_scale;
                let half_width = half_height * aspect;
                DMat4::orthographic_rh_gl(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    self.near,
                    self.far,
                )
            }
        };
        // Clip z in [-1, 1] to [near_z, far_z].
        let half = 0.5 * (far_z - near_z);
        let depth = DMat4::from_cols_array(&[
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, half, 0.0, //
            0.0, 0.0, half + near_z, 1.0,
        ]);
        depth * gl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec4;

    #[test]
    fn test_camera_defaults() {
        let camera = Camera::default();
        assert_eq!(camera.projection_mode, ProjectionMode::Perspective);
        assert_eq!(camera.view_plane_normal(), DVec3::Z);
        assert_eq!(camera.focal_point(), DVec3::ZERO);
    }

    #[test]
    fn test_depth_remap() {
        let mut camera = Camera::new();
        camera.near = 1.0;
        camera.far = 5.0;
        camera.position = DVec3::new(0.0, 0.0, 3.0);
        let view = camera.view_matrix();
        for (near_z, far_z) in [(-1.0, 1.0), (0.0, 1.0)] {
            let m = camera.projection_matrix(1.0, near_z, far_z) * view;
            let near = m * DVec4::new(0.0, 0.0, 2.0, 1.0);
            let far = m * DVec4::new(0.0, 0.0, -2.0, 1.0);
            assert!((near.z / near.w - near_z).abs() < 1e-9);
            assert!((far.z / far.w - far_z).abs() < 1e-9);
        }
    }

    #[test]
    fn test_projection_mode_orthographic() {
        let mut camera = Camera::new();
        camera.projection_mode = ProjectionMode::Orthographic;
        camera.ortho_scale = 5.0;
        let proj = camera.projection_matrix(1.0, -1.0, 1.0);
        assert!((proj.w_axis.w - 1.0).abs() < 1e-9);
        let p = proj * DVec4::new(5.0, -5.0, -1.0, 1.0);
        assert!((p.x - 1.0).abs() < 1e-9);
        assert!((p.y + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_and_normal() {
        let mut camera = Camera::new();
        camera.target = DVec3::new(1.0, 2.0, 3.0);
        camera.position = DVec3::new(1.0, 6.0, 3.0);
        assert!((ViewCamera::distance(&camera) - 4.0).abs() < 1e-12);
        assert_eq!(camera.view_plane_normal(), DVec3::Y);
    }

    #[test]
    fn test_look_at_box() {
        let mut camera = Camera::new();
        camera.look_at_box(DVec3::ZERO, DVec3::new(10.0, 4.0, 2.0), 2.0);
        assert_eq!(camera.target, DVec3::new(5.0, 2.0, 1.0));
        assert!(camera.position.z > camera.target.z);
        assert!((camera.ortho_scale - 3.0).abs() < 1e-9);
    }
}
