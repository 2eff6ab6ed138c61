//! Shows automatic texture tiling on a backend with a small size limit.
//!
//! A 1200x900 viewport needs a 2048x1024 texture; with a 512 limit the
//! slice is drawn as several tiles. Run with `RUST_LOG=debug` to watch
//! the splits.

use volslice::*;

fn main() -> Result<()> {
    init();

    let (width, height) = (1200, 900);
    let volume = ImageVolume::from_fn(
        Extent::new(0, 255, 0, 255, 0, 31),
        1,
        DVec3::ONE,
        DVec3::ZERO,
        |i, j, k, _| (((i / 16 + j / 16 + k / 8) % 2) * 200 + 30) as u8,
    )?;
    let mut images = vec![ImageSlice::new(volume)];

    let options = Options {
        software_max_texture_size: 512,
        ..Options::default()
    };
    let backend = SoftwareBackend::from_options(width, height, &options);
    let mut renderer = Renderer::with_options(backend, options);
    if let Some(bounds) = scene_bounds(&images) {
        renderer.reset_camera(bounds);
    }

    let outcomes = renderer.render(&mut images)?;
    if let Some(report) = outcomes[0].report() {
        println!("{} tiles drawn, {} skipped", report.drawn.len(), report.skipped.len());
        for tile in &report.drawn {
            println!("  tile {:?}", tile.0);
        }
    }

    let pixels = renderer.read_pixels()?;
    save_image("tiled_slice.png", &pixels, width, height)?;
    println!("wrote tiled_slice.png");
    Ok(())
}
