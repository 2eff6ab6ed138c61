//! The reslice mapper: camera to slice plane to texture to quad.

use glam::{DMat4, DVec4};
use volslice_core::{ImageProperty, ImageVolume, Interpolation, Options, TimeStamp, ViewCamera};

use crate::backend::{RenderBackend, TextureFilter};
use crate::error::RenderError;
use crate::geometry::{build_reslice_information, ResliceInformation, SliceSettings};
use crate::loader::{LoadContext, LoadReport, LoadStats, TextureLoader};
use crate::reslice::ImageReslice;

/// What happened to one image during a render.
#[derive(Debug)]
pub enum RenderOutcome {
    /// The slice was drawn; some tiles may have been skipped.
    Drawn(LoadReport),
    /// The image was left out of the frame.
    Failed(RenderError),
}

impl RenderOutcome {
    #[must_use]
    pub fn is_drawn(&self) -> bool {
        matches!(self, Self::Drawn(_))
    }

    /// The tile report of a successful render.
    #[must_use]
    pub fn report(&self) -> Option<&LoadReport> {
        match self {
            Self::Drawn(report) => Some(report),
            Self::Failed(_) => None,
        }
    }
}

/// Draws a planar slice through a volume, facing the camera by default.
///
/// Each render computes the slice plane from the camera, resamples the
/// volume on it at screen resolution, and draws the result as one or more
/// textured quads. Errors are logged and the image is skipped; they never
/// abort the frame.
#[derive(Debug)]
pub struct ImageResliceMapper {
    slice: SliceSettings,
    reslice: ImageReslice,
    loader: TextureLoader,
    world_to_data: DMat4,
    world_to_data_mtime: TimeStamp,
    mtime: TimeStamp,
    last_info: Option<ResliceInformation>,
}

impl Default for ImageResliceMapper {
    fn default() -> Self {
        Self {
            slice: SliceSettings::default(),
            reslice: ImageReslice::new(),
            loader: TextureLoader::new(),
            world_to_data: DMat4::IDENTITY,
            world_to_data_mtime: TimeStamp::default(),
            mtime: TimeStamp::new(),
            last_info: None,
        }
    }
}

impl ImageResliceMapper {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn slice_settings(&self) -> &SliceSettings {
        &self.slice
    }

    pub fn set_slice_settings(&mut self, settings: SliceSettings) {
        if self.slice != settings {
            self.slice = settings;
            self.mtime.modified();
        }
    }

    /// Marks the mapper as modified, forcing the next render to rebuild
    /// its texture.
    pub fn modified(&mut self) {
        self.mtime.modified();
    }

    #[must_use]
    pub fn mtime(&self) -> TimeStamp {
        self.mtime
    }

    /// World to data matrix used by the last render.
    #[must_use]
    pub fn world_to_data(&self) -> DMat4 {
        self.world_to_data
    }

    /// Stores a new world-to-data matrix, stamping it only if it changed.
    pub fn set_world_to_data(&mut self, matrix: DMat4) {
        if self.world_to_data != matrix {
            self.world_to_data = matrix;
            self.world_to_data_mtime.modified();
        }
    }

    /// Slice plane of the last successful render.
    #[must_use]
    pub fn last_reslice_information(&self) -> Option<&ResliceInformation> {
        self.last_info.as_ref()
    }

    /// Loader counters since creation.
    #[must_use]
    pub fn load_stats(&self) -> LoadStats {
        self.loader.stats()
    }

    #[must_use]
    pub fn reslice_executions(&self) -> usize {
        self.reslice.executions()
    }

    /// Physical bounds of `volume` in data coordinates.
    #[must_use]
    pub fn bounds(&self, volume: &ImageVolume) -> [f64; 6] {
        volume.bounds()
    }

    /// Draws the slice of `volume` seen by `camera` into `backend`.
    ///
    /// `data_to_world` places the volume in the scene.
    pub fn render<B, C>(
        &mut self,
        backend: &mut B,
        camera: &C,
        volume: &ImageVolume,
        property: &ImageProperty,
        data_to_world: DMat4,
        options: &Options,
    ) -> RenderOutcome
    where
        B: RenderBackend + ?Sized,
        C: ViewCamera + ?Sized,
    {
        match self.try_render(backend, camera, volume, property, data_to_world, options) {
            Ok(report) => RenderOutcome::Drawn(report),
            Err(err) => {
                log::error!("slice render failed: {err}");
                RenderOutcome::Failed(err)
            }
        }
    }

    fn try_render<B, C>(
        &mut self,
        backend: &mut B,
        camera: &C,
        volume: &ImageVolume,
        property: &ImageProperty,
        data_to_world: DMat4,
        options: &Options,
    ) -> Result<LoadReport, RenderError>
    where
        B: RenderBackend + ?Sized,
        C: ViewCamera + ?Sized,
    {
        let det = data_to_world.determinant();
        if !det.is_finite() || det.abs() < f64::MIN_POSITIVE {
            return Err(RenderError::SingularTransform);
        }
        self.set_world_to_data(data_to_world.inverse());

        let viewport = backend.viewport_size();
        let info = build_reslice_information(camera, viewport, &self.slice, &self.world_to_data);
        let output = self.reslice.update(volume, &info, property.interpolation())?;

        let (width, height) = viewport;
        let aspect = if width > 0 && height > 0 {
            f64::from(width) / f64::from(height)
        } else {
            1.0
        };
        let model_to_clip =
            camera.projection_matrix(aspect, 0.0, 1.0) * camera.view_matrix() * info.slice_to_world;
        let color = if property.lookup_table().is_some() {
            DVec4::ONE
        } else {
            DVec4::new(1.0, 1.0, 1.0, property.opacity())
        };
        let filter = match property.interpolation() {
            Interpolation::Nearest => TextureFilter::Nearest,
            _ => TextureFilter::Linear,
        };
        let ctx = LoadContext {
            property: Some(property),
            volume: output,
            model_to_clip,
            color,
            filter,
            mapper_mtime: self.mtime,
            world_to_data_mtime: self.world_to_data_mtime,
            options,
        };

        let mut report = LoadReport::default();
        self.loader.recursive_load(backend, &ctx, output.extent(), &mut report)?;
        self.last_info = Some(info);
        Ok(report)
    }

    /// Frees the texture and the cached reslice output.
    pub fn release_graphics_resources<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        self.loader.release_graphics_resources(backend);
        self.reslice.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::SoftwareBackend;
    use glam::DVec3;
    use volslice_core::{Camera, Extent, ProjectionMode};

    fn camera() -> Camera {
        let mut camera = Camera::new();
        camera.projection_mode = ProjectionMode::Orthographic;
        camera.ortho_scale = 4.5;
        camera.target = DVec3::new(4.5, 4.5, 2.0);
        camera.position = DVec3::new(4.5, 4.5, 20.0);
        camera.near = 0.1;
        camera.far = 100.0;
        camera
    }

    fn volume() -> ImageVolume {
        ImageVolume::from_fn(
            Extent::new(0, 9, 0, 9, 0, 4),
            1,
            DVec3::ONE,
            DVec3::ZERO,
            |i, j, k, _| (i * 10 + j + k * 50) as u8,
        )
        .unwrap()
    }

    #[test]
    fn test_render_draws_one_quad() {
        let volume = volume();
        let property = ImageProperty::new();
        let mut backend = SoftwareBackend::new(10, 10);
        let mut mapper = ImageResliceMapper::new();
        let outcome = mapper.render(
            &mut backend,
            &camera(),
            &volume,
            &property,
            DMat4::IDENTITY,
            &Options::default(),
        );
        assert!(outcome.is_drawn());
        assert_eq!(backend.draws().len(), 1);
        assert!(mapper.last_reslice_information().is_some());
    }

    #[test]
    fn test_second_render_reuses_texture() {
        let volume = volume();
        let property = ImageProperty::new();
        let options = Options::default();
        let camera = camera();
        let mut backend = SoftwareBackend::new(10, 10);
        let mut mapper = ImageResliceMapper::new();
        for _ in 0..3 {
            let outcome =
                mapper.render(&mut backend, &camera, &volume, &property, DMat4::IDENTITY, &options);
            assert!(outcome.is_drawn());
        }
        assert_eq!(mapper.reslice_executions(), 1);
        let stats = mapper.load_stats();
        assert_eq!(stats.texture_builds, 1);
        assert_eq!(stats.draws, 3);
    }

    #[test]
    fn test_moving_the_volume_reloads() {
        let volume = volume();
        let property = ImageProperty::new();
        let options = Options::default();
        let camera = camera();
        let mut backend = SoftwareBackend::new(10, 10);
        let mut mapper = ImageResliceMapper::new();
        mapper.render(&mut backend, &camera, &volume, &property, DMat4::IDENTITY, &options);
        let shifted = DMat4::from_translation(DVec3::new(0.0, 0.0, -1.0));
        mapper.render(&mut backend, &camera, &volume, &property, shifted, &options);
        assert_eq!(mapper.reslice_executions(), 2);
        assert_eq!(mapper.load_stats().texture_builds, 2);
    }

    #[test]
    fn test_singular_transform_fails_without_drawing() {
        let volume = volume();
        let mut backend = SoftwareBackend::new(10, 10);
        let mut mapper = ImageResliceMapper::new();
        let outcome = mapper.render(
            &mut backend,
            &camera(),
            &volume,
            &ImageProperty::new(),
            DMat4::ZERO,
            &Options::default(),
        );
        assert!(matches!(outcome, RenderOutcome::Failed(_)));
        assert!(backend.draws().is_empty());
    }

    #[test]
    fn test_release_graphics_resources() {
        let volume = volume();
        let mut backend = SoftwareBackend::new(10, 10);
        let mut mapper = ImageResliceMapper::new();
        mapper.render(
            &mut backend,
            &camera(),
            &volume,
            &ImageProperty::new(),
            DMat4::IDENTITY,
            &Options::default(),
        );
        assert_eq!(backend.texture_count(), 1);
        mapper.release_graphics_resources(&mut backend);
        assert_eq!(backend.texture_count(), 0);
    }
}
