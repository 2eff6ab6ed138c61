//! Uploading slice images as textures, tiled to fit the backend.
//!
//! [`TextureLoader::recursive_load`] asks the backend whether the texture
//! for an extent fits; if not it halves the larger texture axis and tries
//! each half, down to a floor of `min_tile_size` texels. A fitting tile is
//! converted, uploaded and drawn by [`TextureLoader::internal_load`], which
//! skips the conversion when nothing changed since the last load.

use glam::{DMat4, DVec4};
use volslice_core::{Extent, ImageProperty, ImageVolume, Options, TimeStamp};

use crate::backend::{QuadDraw, RenderBackend, TextureFilter, TextureId, TextureRegion};
use crate::error::RenderResult;
use crate::texture_data::{
    compute_texture_size, make_texture_data, quad_geometry, ExistingTexture, QuadGeometry,
};

/// Depth used when probing whether a texture fits: the worst case, RGBA.
pub const PROBE_BYTES_PER_PIXEL: usize = 4;

/// Counters of the work done by a loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Calls into the byte conversion.
    pub texture_builds: usize,
    /// Texture allocations followed by a full upload.
    pub full_uploads: usize,
    /// Uploads into an existing texture.
    pub partial_uploads: usize,
    /// Quads drawn.
    pub draws: usize,
    /// Tiles left blank because they could not be made small enough.
    pub skipped_tiles: usize,
}

/// Tiles drawn and skipped by one [`TextureLoader::recursive_load`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub drawn: Vec<Extent>,
    pub skipped: Vec<Extent>,
}

/// Inputs of one load besides the backend.
#[derive(Debug, Clone, Copy)]
pub struct LoadContext<'a> {
    pub property: Option<&'a ImageProperty>,
    /// The image to draw, in slice coordinates.
    pub volume: &'a ImageVolume,
    /// Slice coordinates to clip coordinates.
    pub model_to_clip: DMat4,
    /// Vertex color; its alpha carries the opacity when no table does.
    pub color: DVec4,
    pub filter: TextureFilter,
    /// Modification time of the owning mapper.
    pub mapper_mtime: TimeStamp,
    /// Modification time of the world-to-data matrix.
    pub world_to_data_mtime: TimeStamp,
    pub options: &'a Options,
}

/// Owns the texture of one mapper and the state deciding when to refill it.
#[derive(Debug, Default)]
pub struct TextureLoader {
    texture: Option<TextureId>,
    texture_size: [u32; 2],
    bytes_per_pixel: usize,
    context_id: Option<u64>,
    load_time: TimeStamp,
    loaded_extent: Option<Extent>,
    quad: Option<QuadGeometry>,
    stats: LoadStats,
}

impl TextureLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Work counters since creation or the last [`TextureLoader::reset_stats`].
    pub fn stats(&self) -> LoadStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = LoadStats::default();
    }

    /// The texture currently held, if any.
    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    /// Size of the held texture.
    pub fn texture_size(&self) -> [u32; 2] {
        self.texture_size
    }

    /// When the texture contents were last regenerated.
    pub fn load_time(&self) -> TimeStamp {
        self.load_time
    }

    fn forget_texture(&mut self) {
        self.texture = None;
        self.texture_size = [0, 0];
        self.bytes_per_pixel = 0;
        self.loaded_extent = None;
        self.quad = None;
    }

    /// Draws `extent` of `ctx.volume`, tiling it until each tile's texture
    /// fits the backend.
    ///
    /// Tiles that still do not fit at the size floor are logged and left
    /// out of the frame; they are reported in `report.skipped`.
    pub fn recursive_load<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        ctx: &LoadContext<'_>,
        extent: Extent,
        report: &mut LoadReport,
    ) -> RenderResult<()> {
        let layout = compute_texture_size(&extent)?;
        let [tw, th] = layout.texture_size;

        if backend.texture_fits(tw, th, PROBE_BYTES_PER_PIXEL)? {
            self.internal_load(backend, ctx, extent)?;
            report.drawn.push(extent);
            return Ok(());
        }

        let floor = ctx.options.min_tile_size;
        if (tw > floor || th > floor) && tw.max(th) > 1 {
            // Halve the larger texture axis; ties split texture y.
            let (axis, size) = if tw > th {
                (layout.xdim, tw)
            } else {
                (layout.ydim, th)
            };
            let half = i32::try_from(size / 2).unwrap_or(i32::MAX);
            let (lo, hi) = extent.axis(axis);
            log::debug!("splitting {:?} along axis {axis} ({tw}x{th} does not fit)", extent.0);
            self.recursive_load(backend, ctx, extent.with_axis(axis, lo, lo + half - 1), report)?;
            self.recursive_load(backend, ctx, extent.with_axis(axis, lo + half, hi), report)?;
            return Ok(());
        }

        log::error!(
            "texture of {tw}x{th} for extent {:?} does not fit and cannot be subdivided further",
            extent.0
        );
        self.stats.skipped_tiles += 1;
        report.skipped.push(extent);
        Ok(())
    }

    /// Loads `extent` into the texture if anything changed since the last
    /// load, then draws it.
    ///
    /// The texture is regenerated when the mapper, property (including its
    /// table), world-to-data matrix or image changed after the last load,
    /// when the context was recreated, or when a different extent is
    /// requested. A texture of the same size and depth is refilled in
    /// place with a partial upload.
    pub fn internal_load<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        ctx: &LoadContext<'_>,
        extent: Extent,
    ) -> RenderResult<()> {
        let context = backend.context_id();
        if self.context_id.is_some_and(|id| id != context) {
            // Handles of a dead context are meaningless to the new one.
            log::debug!("context changed, dropping texture {:?}", self.texture);
            self.forget_texture();
        }
        if self.texture.is_some_and(|t| !backend.is_texture(t)) {
            self.forget_texture();
        }

        let load_time = self.load_time;
        let property_mtime = ctx.property.map_or(TimeStamp::default(), ImageProperty::mtime);
        let stale = self.texture.is_none()
            || ctx.mapper_mtime > load_time
            || property_mtime > load_time
            || ctx.world_to_data_mtime > load_time
            || ctx.volume.mtime() > load_time
            || backend.context_creation_time() > load_time
            || self.loaded_extent != Some(extent);

        if stale {
            self.load(backend, ctx, extent, context)?;
        } else if let Some(texture) = self.texture {
            backend.bind_texture(texture)?;
        }

        let Some(quad) = self.quad else {
            return Ok(());
        };
        backend.draw_quad(&QuadDraw {
            corners: quad.corners,
            tcoords: quad.tcoords,
            color: ctx.color,
            filter: ctx.filter,
            model_to_clip: ctx.model_to_clip,
        })?;
        self.stats.draws += 1;
        Ok(())
    }

    fn load<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        ctx: &LoadContext<'_>,
        extent: Extent,
        context: u64,
    ) -> RenderResult<()> {
        let existing = self.texture.map(|_| ExistingTexture {
            texture_size: self.texture_size,
            bytes_per_pixel: self.bytes_per_pixel,
        });
        let data = make_texture_data(ctx.property, ctx.volume, &extent, existing, ctx.options)?;
        self.stats.texture_builds += 1;

        match self.texture {
            Some(texture) if data.reuse_texture => {
                backend.bind_texture(texture)?;
                let region = TextureRegion {
                    x: 0,
                    y: 0,
                    width: data.width,
                    height: data.height,
                };
                backend.upload_partial(texture, region, &data.bytes)?;
                self.stats.partial_uploads += 1;
            }
            _ => {
                if let Some(old) = self.texture.take() {
                    backend.release_texture(old);
                }
                self.forget_texture();
                let [width, height] = data.texture_size;
                let texture = backend.allocate_texture(width, height, data.format)?;
                self.texture = Some(texture);
                self.texture_size = data.texture_size;
                self.bytes_per_pixel = data.bytes_per_pixel;
                backend.bind_texture(texture)?;
                backend.upload_full(texture, &data.bytes)?;
                self.stats.full_uploads += 1;
                log::debug!("allocated texture {texture} of {width}x{height}");
            }
        }

        let layout = compute_texture_size(&extent)?;
        self.quad = Some(quad_geometry(ctx.volume, &extent, &layout));
        self.loaded_extent = Some(extent);
        self.context_id = Some(context);
        self.load_time.modified();
        Ok(())
    }

    /// Frees the texture if it belongs to `backend`'s current context.
    pub fn release_graphics_resources<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(texture) = self.texture {
            if self.context_id == Some(backend.context_id()) {
                backend.release_texture(texture);
            }
        }
        self.forget_texture();
        self.context_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::SoftwareBackend;
    use glam::DVec3;
    use volslice_core::ColorFormat;

    fn image(width: i32, height: i32) -> ImageVolume {
        ImageVolume::from_fn(
            Extent::new(0, width - 1, 0, height - 1, 0, 0),
            1,
            DVec3::ONE,
            DVec3::ZERO,
            |i, j, _, _| ((i + j) % 256) as u8,
        )
        .unwrap()
    }

    fn context<'a>(volume: &'a ImageVolume, options: &'a Options) -> LoadContext<'a> {
        LoadContext {
            property: None,
            volume,
            model_to_clip: DMat4::IDENTITY,
            color: DVec4::ONE,
            filter: TextureFilter::Nearest,
            mapper_mtime: TimeStamp::default(),
            world_to_data_mtime: TimeStamp::default(),
            options,
        }
    }

    /// Each sample of `extent` is covered by exactly one tile.
    fn assert_exact_cover(extent: Extent, tiles: &[Extent]) {
        let [nx, ny, _] = extent.dimensions();
        let mut hits = vec![0u32; nx * ny];
        for tile in tiles {
            assert!(extent.contains(tile), "{tile:?} outside {extent:?}");
            for j in tile.0[2]..=tile.0[3] {
                for i in tile.0[0]..=tile.0[1] {
                    hits[(j - extent.0[2]) as usize * nx + (i - extent.0[0]) as usize] += 1;
                }
            }
        }
        assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn test_single_tile_when_it_fits() {
        let volume = image(100, 60);
        let options = Options::default();
        let mut backend = SoftwareBackend::new(8, 8);
        let mut loader = TextureLoader::new();
        let mut report = LoadReport::default();
        loader
            .recursive_load(&mut backend, &context(&volume, &options), volume.extent(), &mut report)
            .unwrap();
        assert_eq!(report.drawn, vec![volume.extent()]);
        assert_eq!(loader.texture_size(), [128, 64]);
        assert_eq!(backend.draws().len(), 1);
        assert_eq!(
            backend.texture_info(loader.texture().unwrap()).unwrap().format,
            ColorFormat::Luminance
        );
    }

    #[test]
    fn test_tiles_cover_extent_without_overlap() {
        let volume = image(1500, 700);
        let options = Options::default();
        let mut backend = SoftwareBackend::new(8, 8).with_max_texture_size(512);
        let mut loader = TextureLoader::new();
        let mut report = LoadReport::default();
        loader
            .recursive_load(&mut backend, &context(&volume, &options), volume.extent(), &mut report)
            .unwrap();
        assert!(report.skipped.is_empty());
        assert!(report.drawn.len() > 1);
        for tile in &report.drawn {
            let layout = compute_texture_size(tile).unwrap();
            assert!(layout.texture_size[0] <= 512 && layout.texture_size[1] <= 512);
        }
        assert_exact_cover(volume.extent(), &report.drawn);
        for record in backend.draws() {
            assert!(record.texture_info.width <= 512 && record.texture_info.height <= 512);
        }
        assert_eq!(loader.stats().draws, report.drawn.len());
    }

    #[test]
    fn test_odd_extent_split_points() {
        let volume = image(600, 3);
        let options = Options::default();
        let mut backend = SoftwareBackend::new(8, 8).with_max_texture_size(512);
        let mut loader = TextureLoader::new();
        let mut report = LoadReport::default();
        loader
            .recursive_load(&mut backend, &context(&volume, &options), volume.extent(), &mut report)
            .unwrap();
        assert_eq!(
            report.drawn,
            vec![Extent::new(0, 511, 0, 2, 0, 0), Extent::new(512, 599, 0, 2, 0, 0)]
        );
    }

    #[test]
    fn test_floor_skips_tile() {
        let volume = image(300, 300);
        let options = Options::default();
        // Nothing fits: not even a 256x256 tile.
        let mut backend = SoftwareBackend::new(8, 8).with_texture_memory(1024);
        let mut loader = TextureLoader::new();
        let mut report = LoadReport::default();
        loader
            .recursive_load(&mut backend, &context(&volume, &options), volume.extent(), &mut report)
            .unwrap();
        assert!(report.drawn.is_empty());
        assert_exact_cover(volume.extent(), &report.skipped);
        assert_eq!(loader.stats().skipped_tiles, report.skipped.len());
        assert!(backend.draws().is_empty());
    }

    #[test]
    fn test_unchanged_inputs_skip_conversion() {
        let volume = image(40, 30);
        let options = Options::default();
        let ctx = context(&volume, &options);
        let mut backend = SoftwareBackend::new(8, 8);
        let mut loader = TextureLoader::new();

        loader.internal_load(&mut backend, &ctx, volume.extent()).unwrap();
        loader.internal_load(&mut backend, &ctx, volume.extent()).unwrap();
        let stats = loader.stats();
        assert_eq!(stats.texture_builds, 1);
        assert_eq!(stats.full_uploads, 1);
        assert_eq!(stats.draws, 2);
    }

    #[test]
    fn test_modified_volume_reuses_texture() {
        let mut volume = image(40, 30);
        let options = Options::default();
        let mut backend = SoftwareBackend::new(8, 8);
        let mut loader = TextureLoader::new();

        loader
            .internal_load(&mut backend, &context(&volume, &options), volume.extent())
            .unwrap();
        let texture = loader.texture();
        volume.modified();
        loader
            .internal_load(&mut backend, &context(&volume, &options), volume.extent())
            .unwrap();
        let stats = loader.stats();
        assert_eq!(stats.texture_builds, 2);
        assert_eq!(stats.full_uploads, 1);
        assert_eq!(stats.partial_uploads, 1);
        assert_eq!(loader.texture(), texture);
    }

    #[test]
    fn test_property_change_triggers_reload() {
        let volume = image(16, 16);
        let options = Options::default();
        let mut property = ImageProperty::default();
        let mut backend = SoftwareBackend::new(8, 8);
        let mut loader = TextureLoader::new();

        let mut ctx = context(&volume, &options);
        ctx.property = Some(&property);
        loader.internal_load(&mut backend, &ctx, volume.extent()).unwrap();

        property.set_color_level(100.0);
        let mut ctx = context(&volume, &options);
        ctx.property = Some(&property);
        loader.internal_load(&mut backend, &ctx, volume.extent()).unwrap();
        assert_eq!(loader.stats().texture_builds, 2);
    }

    #[test]
    fn test_context_switch_reallocates() {
        let volume = image(40, 30);
        let options = Options::default();
        let ctx = context(&volume, &options);
        let mut backend = SoftwareBackend::new(8, 8);
        let mut loader = TextureLoader::new();

        loader.internal_load(&mut backend, &ctx, volume.extent()).unwrap();
        backend.recreate_context();
        loader.internal_load(&mut backend, &ctx, volume.extent()).unwrap();
        let stats = loader.stats();
        assert_eq!(stats.texture_builds, 2);
        assert_eq!(stats.full_uploads, 2);
        assert_eq!(backend.texture_count(), 1);
    }

    #[test]
    fn test_release_graphics_resources() {
        let volume = image(8, 8);
        let options = Options::default();
        let mut backend = SoftwareBackend::new(8, 8);
        let mut loader = TextureLoader::new();
        loader
            .internal_load(&mut backend, &context(&volume, &options), volume.extent())
            .unwrap();
        assert_eq!(backend.texture_count(), 1);
        loader.release_graphics_resources(&mut backend);
        assert_eq!(backend.texture_count(), 0);
        assert!(loader.texture().is_none());
    }
}
