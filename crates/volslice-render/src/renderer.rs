//! Frame driver: one backend, one camera, any number of image slices.

use glam::{DMat4, DVec3, DVec4};
use volslice_core::{Camera, Options, ViewCamera};

use crate::backend::RenderBackend;
use crate::error::RenderResult;
use crate::image_slice::ImageSlice;
use crate::mapper::RenderOutcome;

/// Renders image slices with a camera into a backend.
pub struct Renderer<B: RenderBackend> {
    backend: B,
    camera: Camera,
    options: Options,
}

impl<B: RenderBackend> Renderer<B> {
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, Options::default())
    }

    pub fn with_options(backend: B, options: Options) -> Self {
        Self {
            backend,
            camera: Camera::new(),
            options,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Viewport width over height.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        let (width, height) = self.backend.viewport_size();
        if width == 0 || height == 0 {
            1.0
        } else {
            f64::from(width) / f64::from(height)
        }
    }

    /// World to clip coordinates with clip depth in `[0, 1]`.
    #[must_use]
    pub fn world_to_clip(&self) -> DMat4 {
        self.camera.projection_matrix(self.aspect_ratio(), 0.0, 1.0) * self.camera.view_matrix()
    }

    /// Frames `bounds` (`[xmin, xmax, ymin, ymax, zmin, zmax]`), looking
    /// down the negative z axis.
    pub fn reset_camera(&mut self, bounds: [f64; 6]) {
        let min = DVec3::new(bounds[0], bounds[2], bounds[4]);
        let max = DVec3::new(bounds[1], bounds[3], bounds[5]);
        let aspect = self.aspect_ratio();
        self.camera.look_at_box(min, max, aspect);
    }

    /// Clears the frame to the background color.
    pub fn begin_frame(&mut self) -> RenderResult<()> {
        let bg = self.options.background_color.as_dvec3();
        self.backend.begin_frame(DVec4::new(bg.x, bg.y, bg.z, 1.0))
    }

    /// Draws one image into the current frame.
    pub fn render_image(&mut self, image: &mut ImageSlice) -> RenderOutcome {
        image.render(&mut self.backend, &self.camera, &self.options)
    }

    /// Clears the frame and draws `images` in order.
    pub fn render(&mut self, images: &mut [ImageSlice]) -> RenderResult<Vec<RenderOutcome>> {
        self.begin_frame()?;
        Ok(images
            .iter_mut()
            .map(|image| self.render_image(image))
            .collect())
    }

    /// The color target as RGBA rows, top row first.
    pub fn read_pixels(&mut self) -> RenderResult<Vec<u8>> {
        self.backend.read_pixels()
    }
}
