//! Renders an oblique slice through a synthetic volume to `oblique_slice.png`.
//!
//! The volume is a 16-bit sphere phantom; the camera looks at it from an
//! angle, so the slice plane cuts through all three data axes.

use volslice::*;

fn main() -> Result<()> {
    init();

    let n = 96;
    let center = f64::from(n - 1) * 0.5;
    let volume = ImageVolume::from_fn(
        Extent::new(0, n - 1, 0, n - 1, 0, n - 1),
        1,
        DVec3::ONE,
        DVec3::ZERO,
        |i, j, k, _| {
            let d = DVec3::new(f64::from(i), f64::from(j), f64::from(k)) - DVec3::splat(center);
            let shell = (d.length() - 30.0).abs();
            (4000.0 * (-shell * 0.2).exp()) as u16
        },
    )?;

    let map = ColorMap::builtin("viridis")
        .unwrap_or_else(|| ColorMap::new("gray", vec![DVec3::ZERO, DVec3::ONE]));
    let mut property = ImageProperty::new();
    property.set_interpolation(Interpolation::Linear);
    property.set_lookup_table(Some(std::sync::Arc::new(
        LookupTable::from_color_map(&map, 256).with_range([0.0, 4000.0]),
    )));
    let mut images = vec![ImageSlice::new(volume).with_property(property)];

    let mut camera = Camera::new();
    camera.target = DVec3::splat(center);
    camera.position = camera.target + DVec3::new(120.0, 80.0, 160.0);
    camera.near = 1.0;
    camera.far = 1000.0;

    let options = Options::default();
    render_to_file("oblique_slice.png", &mut images, Some(&camera), 640, 480, &options)?;
    println!("wrote oblique_slice.png");
    Ok(())
}
