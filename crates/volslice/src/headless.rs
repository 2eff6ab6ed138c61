//! Headless rendering API.
//!
//! Renders image slices to an RGBA buffer or file without opening a
//! window. The software path needs no GPU and is what the tests use; the
//! wgpu path creates a headless device per call.

use std::path::Path;

use volslice_core::{Camera, Options};
use volslice_render::{ImageSlice, RenderBackend, Renderer, SoftwareBackend, WgpuBackend};

use crate::Result;

/// Union of the world bounds of `images`, or `None` when there are none.
#[must_use]
pub fn scene_bounds(images: &[ImageSlice]) -> Option<[f64; 6]> {
    images.iter().map(ImageSlice::bounds).reduce(|a, b| {
        [
            a[0].min(b[0]),
            a[1].max(b[1]),
            a[2].min(b[2]),
            a[3].max(b[3]),
            a[4].min(b[4]),
            a[5].max(b[5]),
        ]
    })
}

fn render_with<B: RenderBackend>(
    backend: B,
    images: &mut [ImageSlice],
    camera: Option<&Camera>,
    options: &Options,
) -> Result<Vec<u8>> {
    let mut renderer = Renderer::with_options(backend, options.clone());
    match camera {
        Some(camera) => renderer.set_camera(camera.clone()),
        None => {
            if let Some(bounds) = scene_bounds(images) {
                renderer.reset_camera(bounds);
            }
        }
    }
    let outcomes = renderer.render(images)?;
    let failed = outcomes.iter().filter(|o| !o.is_drawn()).count();
    if failed > 0 {
        log::warn!("{failed} of {} images were left out of the frame", outcomes.len());
    }
    let pixels = renderer.read_pixels()?;
    // Textures belong to this backend, which is dropped on return.
    for image in images.iter_mut() {
        image.release_graphics_resources(renderer.backend_mut());
    }
    Ok(pixels)
}

/// Renders `images` with the CPU backend and returns RGBA rows, top row
/// first.
///
/// Without a camera the view is fitted to the images' bounds.
///
/// # Example
/// ```no_run
/// use volslice::*;
///
/// let volume = ImageVolume::from_fn(
///     Extent::new(0, 63, 0, 63, 0, 31),
///     1,
///     DVec3::ONE,
///     DVec3::ZERO,
///     |i, j, k, _| ((i + j + k) % 256) as u8,
/// )
/// .unwrap();
/// let mut images = vec![ImageSlice::new(volume)];
/// let pixels = render_to_image(&mut images, None, 256, 256, &Options::default()).unwrap();
/// assert_eq!(pixels.len(), 256 * 256 * 4);
/// ```
pub fn render_to_image(
    images: &mut [ImageSlice],
    camera: Option<&Camera>,
    width: u32,
    height: u32,
    options: &Options,
) -> Result<Vec<u8>> {
    render_with(
        SoftwareBackend::from_options(width, height, options),
        images,
        camera,
        options,
    )
}

/// Renders `images` on a headless wgpu device.
///
/// Fails with [`volslice_render::RenderError::AdapterCreationFailed`] when
/// no adapter is available.
pub fn render_to_image_gpu(
    images: &mut [ImageSlice],
    camera: Option<&Camera>,
    width: u32,
    height: u32,
    options: &Options,
) -> Result<Vec<u8>> {
    let backend = WgpuBackend::new_headless_blocking(width, height)?;
    render_with(backend, images, camera, options)
}

/// Renders `images` with the CPU backend and saves the frame as PNG or
/// JPEG.
pub fn render_to_file(
    filename: impl AsRef<Path>,
    images: &mut [ImageSlice],
    camera: Option<&Camera>,
    width: u32,
    height: u32,
    options: &Options,
) -> Result<()> {
    let data = render_to_image(images, camera, width, height, options)?;
    crate::save_image(filename, &data, width, height)?;
    Ok(())
}
