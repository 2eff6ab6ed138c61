//! A volume placed in the scene with its display property and mapper.

use glam::{DMat4, DVec3};
use volslice_core::{ImageProperty, ImageVolume, Options, ViewCamera};

use crate::backend::RenderBackend;
use crate::mapper::{ImageResliceMapper, RenderOutcome};

/// A volume, how it is displayed, and where it sits in the world.
#[derive(Debug)]
pub struct ImageSlice {
    volume: ImageVolume,
    property: ImageProperty,
    transform: DMat4,
    mapper: ImageResliceMapper,
}

impl ImageSlice {
    /// Places `volume` at the world origin with a default property.
    pub fn new(volume: ImageVolume) -> Self {
        Self {
            volume,
            property: ImageProperty::new(),
            transform: DMat4::IDENTITY,
            mapper: ImageResliceMapper::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, property: ImageProperty) -> Self {
        self.property = property;
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: DMat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn volume(&self) -> &ImageVolume {
        &self.volume
    }

    /// Mutable access to the samples. Call [`ImageVolume::modified`] after
    /// editing them in place.
    pub fn volume_mut(&mut self) -> &mut ImageVolume {
        &mut self.volume
    }

    pub fn property(&self) -> &ImageProperty {
        &self.property
    }

    pub fn property_mut(&mut self) -> &mut ImageProperty {
        &mut self.property
    }

    /// Data to world matrix.
    pub fn transform(&self) -> DMat4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: DMat4) {
        self.transform = transform;
    }

    pub fn mapper(&self) -> &ImageResliceMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut ImageResliceMapper {
        &mut self.mapper
    }

    /// World-space bounding box `[xmin, xmax, ymin, ymax, zmin, zmax]` of
    /// the transformed volume.
    #[must_use]
    pub fn bounds(&self) -> [f64; 6] {
        let [x0, x1, y0, y1, z0, z1] = self.mapper.bounds(&self.volume);
        let mut min = DVec3::splat(f64::INFINITY);
        let mut max = DVec3::splat(f64::NEG_INFINITY);
        for corner in 0..8 {
            let p = DVec3::new(
                if corner & 1 == 0 { x0 } else { x1 },
                if corner & 2 == 0 { y0 } else { y1 },
                if corner & 4 == 0 { z0 } else { z1 },
            );
            let w = self.transform.transform_point3(p);
            min = min.min(w);
            max = max.max(w);
        }
        [min.x, max.x, min.y, max.y, min.z, max.z]
    }

    /// Draws this image's slice into `backend`.
    pub fn render<B, C>(&mut self, backend: &mut B, camera: &C, options: &Options) -> RenderOutcome
    where
        B: RenderBackend + ?Sized,
        C: ViewCamera + ?Sized,
    {
        let Self {
            volume,
            property,
            transform,
            mapper,
        } = self;
        mapper.render(backend, camera, volume, property, *transform, options)
    }

    pub fn release_graphics_resources<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        self.mapper.release_graphics_resources(backend);
    }
}
