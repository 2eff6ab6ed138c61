//! Turning an image extent into texture bytes and quad geometry.
//!
//! An extent of a slice image is flat along one axis; the other two become
//! the texture's x and y. Textures are sized to powers of two and the image
//! occupies the lower-left corner, with texture coordinates inset by half a
//! texel so filtering never reaches the padding.

use std::borrow::Cow;

use glam::DVec3;
use volslice_core::color_convert::{convert_view, shift_scale_view};
use volslice_core::{
    ColorFormat, ConvertParams, Extent, ImageProperty, ImageVolume, InputLayout, Options,
    ShiftScale, VolsliceError,
};

use crate::error::RenderResult;

/// Which extent axes map to the texture, and how big it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureLayout {
    /// Extent axis along texture x.
    pub xdim: usize,
    /// Extent axis along texture y.
    pub ydim: usize,
    /// Image pixels along texture x and y.
    pub image_size: [u32; 2],
    /// Power-of-two texture size holding the image.
    pub texture_size: [u32; 2],
}

/// Finds the texture axes and sizes for `extent`.
///
/// Texture x is the first non-flat axis, texture y the next one; a
/// single-pixel extent lays out along y and z.
pub fn compute_texture_size(extent: &Extent) -> RenderResult<TextureLayout> {
    if extent.is_empty() {
        return Err(VolsliceError::InvalidExtent(extent.0).into());
    }
    let (mut xdim, mut ydim) = (1, 2);
    if !extent.is_flat(0) {
        xdim = 0;
        if !extent.is_flat(1) {
            ydim = 1;
        }
    }
    let len = |axis: usize| {
        u32::try_from(extent.axis_len(axis)).map_err(|_| VolsliceError::InvalidExtent(extent.0))
    };
    let image_size = [len(xdim)?, len(ydim)?];
    let texture_size = [
        image_size[0].next_power_of_two(),
        image_size[1].next_power_of_two(),
    ];
    Ok(TextureLayout {
        xdim,
        ydim,
        image_size,
        texture_size,
    })
}

/// World corners and texture coordinates of one quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadGeometry {
    /// Counter-clockwise, starting at the first sample of the extent.
    pub corners: [DVec3; 4],
    pub tcoords: [[f64; 2]; 4],
}

/// Quad spanning the sample centers of `extent`.
pub fn quad_geometry(volume: &ImageVolume, extent: &Extent, layout: &TextureLayout) -> QuadGeometry {
    let s = volume.spacing();
    let o = volume.origin();
    let e = extent.0;
    let point = |x: i32, y: i32, z: i32| {
        DVec3::new(
            f64::from(x) * s.x + o.x,
            f64::from(y) * s.y + o.y,
            f64::from(z) * s.z + o.z,
        )
    };
    let y1 = if layout.xdim == 1 { e[3] } else { e[2] };
    let y3 = if layout.ydim == 1 { e[3] } else { e[2] };
    let corners = [
        point(e[0], e[2], e[4]),
        point(e[1], y1, e[4]),
        point(e[1], e[3], e[5]),
        point(e[0], y3, e[5]),
    ];

    let [iw, ih] = layout.image_size.map(f64::from);
    let [tw, th] = layout.texture_size.map(f64::from);
    let (u0, v0) = (0.5 / tw, 0.5 / th);
    let (u1, v1) = ((iw - 0.5) / tw, (ih - 0.5) / th);
    QuadGeometry {
        corners,
        tcoords: [[u0, v0], [u1, v0], [u1, v1], [u0, v1]],
    }
}

/// Whether the samples of `extent` form one contiguous run of the volume's
/// storage, row after row with no gaps.
///
/// Only three layouts are recognized: a z-slice spanning full rows, an
/// x-slice of a volume one sample wide spanning full columns, and a y-slice
/// of a volume one row tall spanning full rows. Anything else reports
/// `false`, which only costs a copy.
pub fn is_contiguous(volume: &ImageVolume, extent: &Extent, layout: &TextureLayout) -> bool {
    let data = volume.extent().0;
    let e = extent.0;
    if !volume.extent().contains(extent) {
        return false;
    }
    let full_x = e[0] == data[0] && e[1] == data[1];
    let full_y = e[2] == data[2] && e[3] == data[3];
    (layout.xdim == 0 && layout.ydim == 1 && e[4] == e[5] && full_x)
        || (data[0] == data[1] && layout.xdim == 1 && full_y)
        || (data[2] == data[3] && layout.xdim == 0 && layout.ydim == 2 && full_x)
}

/// The texture currently allocated for this loader, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingTexture {
    pub texture_size: [u32; 2],
    pub bytes_per_pixel: usize,
}

/// Pixel data ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData<'a> {
    /// `height` rows of `width` pixels, borrowed from the volume when no
    /// conversion was needed.
    pub bytes: Cow<'a, [u8]>,
    /// Pixels per row of `bytes`: the texture width, or the image width
    /// when the existing texture is reused.
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: usize,
    pub format: ColorFormat,
    /// The texture size this data belongs to.
    pub texture_size: [u32; 2],
    /// Only the image region is filled; upload it into the existing texture.
    pub reuse_texture: bool,
}

impl TextureData<'_> {
    /// Whether the bytes point into the volume rather than a new buffer.
    pub fn is_borrowed(&self) -> bool {
        matches!(self.bytes, Cow::Borrowed(_))
    }
}

/// Converts the samples of `extent` into texture bytes.
///
/// With a lookup table the output is RGBA. Otherwise window/level maps
/// each component and the format follows the component count; opacity is
/// left to the draw call. Rows are written one at a time so non-contiguous
/// extents and power-of-two padding both work; padding stays zero.
/// `extent` must be one sample thick along some axis.
pub fn make_texture_data<'a>(
    property: Option<&ImageProperty>,
    volume: &'a ImageVolume,
    extent: &Extent,
    existing: Option<ExistingTexture>,
    options: &Options,
) -> RenderResult<TextureData<'a>> {
    if !(0..3).any(|axis| extent.is_flat(axis)) {
        return Err(VolsliceError::InvalidExtent(extent.0).into());
    }
    let layout = compute_texture_size(extent)?;
    let components = volume.num_components();
    let table = property.and_then(|p| p.lookup_table().zip(p.color_mapping()));
    let format = if table.is_some() {
        ColorFormat::Rgba
    } else {
        ColorFormat::from_components(components)?
    };
    let bytes_per_pixel = format.components();
    let shift_scale = property.map_or_else(
        || {
            ShiftScale::from_window_level(
                options.default_color_window,
                options.default_color_level,
            )
        },
        ImageProperty::window_level_shift_scale,
    );

    let [mut xsize, mut ysize] = layout.texture_size;
    let reuse_texture = existing.is_some_and(|t| {
        t.texture_size == layout.texture_size && t.bytes_per_pixel == bytes_per_pixel
    });
    if reuse_texture {
        [xsize, ysize] = layout.image_size;
    }

    let data = |bytes| TextureData {
        bytes,
        width: xsize,
        height: ysize,
        bytes_per_pixel,
        format,
        texture_size: layout.texture_size,
        reuse_texture,
    };

    let view = volume.view_for_extent(extent)?;
    let image_len = layout.image_size[0] as usize * layout.image_size[1] as usize;

    if options.zero_copy
        && [xsize, ysize] == layout.image_size
        && table.is_none()
        && shift_scale.is_identity_for_u8()
        && is_contiguous(volume, extent, &layout)
    {
        if let Some(bytes) = view.as_u8() {
            log::trace!("zero-copy texture for {:?}", extent.0);
            return Ok(data(Cow::Borrowed(&bytes[..image_len * components])));
        }
    }

    let mut out = vec![0u8; xsize as usize * ysize as usize * bytes_per_pixel];
    let pad = bytes_per_pixel * (xsize - layout.image_size[0]) as usize;
    let (out_inc_y, out_inc_z) = if layout.ydim == 2 { (0, pad) } else { (pad, 0) };
    let [_, in_inc_y, in_inc_z] = volume.continuous_increments(extent)?;
    let [nx, ny, nz] = extent.dimensions();
    let in_row = nx * components;
    let out_row = nx * bytes_per_pixel;
    let allow_integer = options.integer_fast_path;

    let mut in_pos = 0;
    let mut out_pos = 0;
    for _ in 0..nz {
        for _ in 0..ny {
            let src = view.slice(in_pos, in_row);
            let dst = &mut out[out_pos..out_pos + out_row];
            match table {
                Some((table, mapping)) if components == 1 => {
                    table.map_scalars_through_table(src, 1, nx, &mapping, format, dst)?;
                }
                Some((table, mapping)) => {
                    table.map_vectors_through_table(src, components, nx, &mapping, format, dst)?;
                }
                None if components == 1 => {
                    shift_scale_view(src, nx, shift_scale, allow_integer, dst)?;
                }
                None => {
                    let params = ConvertParams {
                        format,
                        shift_scale,
                        alpha: 1.0,
                    };
                    convert_view(src, InputLayout::packed(components), nx, &params, dst)?;
                }
            }
            in_pos += in_row + in_inc_y;
            out_pos += out_row + out_inc_y;
        }
        in_pos += in_inc_z;
        out_pos += out_inc_z;
    }

    Ok(data(Cow::Owned(out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use volslice_core::{LookupTable, ScalarArray};

    fn volume_u8(extent: Extent, components: usize) -> ImageVolume {
        ImageVolume::from_fn(extent, components, DVec3::ONE, DVec3::ZERO, |i, j, k, c| {
            u8::try_from((i + 3 * j + 7 * k + 50 * c as i32).rem_euclid(256)).unwrap_or(0)
        })
        .unwrap()
    }

    #[test]
    fn test_compute_texture_size_axes() {
        let layout = compute_texture_size(&Extent::new(0, 99, 0, 49, 3, 3)).unwrap();
        assert_eq!((layout.xdim, layout.ydim), (0, 1));
        assert_eq!(layout.image_size, [100, 50]);
        assert_eq!(layout.texture_size, [128, 64]);

        let layout = compute_texture_size(&Extent::new(5, 5, 0, 15, 0, 2)).unwrap();
        assert_eq!((layout.xdim, layout.ydim), (1, 2));
        assert_eq!(layout.texture_size, [16, 4]);

        let layout = compute_texture_size(&Extent::new(0, 16, 4, 4, 0, 0)).unwrap();
        assert_eq!((layout.xdim, layout.ydim), (0, 2));
        assert_eq!(layout.texture_size, [32, 1]);

        assert!(compute_texture_size(&Extent::new(1, 0, 0, 0, 0, 0)).is_err());
    }

    #[test]
    fn test_quad_geometry() {
        let volume = ImageVolume::from_fn(
            Extent::new(0, 9, 0, 4, 0, 0),
            1,
            DVec3::new(2.0, 0.5, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
            |_, _, _, _| 0u8,
        )
        .unwrap();
        let extent = Extent::new(2, 9, 0, 4, 0, 0);
        let layout = compute_texture_size(&extent).unwrap();
        let quad = quad_geometry(&volume, &extent, &layout);
        assert_eq!(quad.corners[0], DVec3::new(5.0, 1.0, 1.0));
        assert_eq!(quad.corners[1], DVec3::new(19.0, 1.0, 1.0));
        assert_eq!(quad.corners[2], DVec3::new(19.0, 3.0, 1.0));
        assert_eq!(quad.corners[3], DVec3::new(5.0, 3.0, 1.0));
        assert_eq!(quad.tcoords[0], [0.5 / 8.0, 0.5 / 8.0]);
        assert_eq!(quad.tcoords[2], [7.5 / 8.0, 4.5 / 8.0]);
    }

    #[test]
    fn test_quad_geometry_flat_x() {
        let volume = volume_u8(Extent::new(0, 3, 0, 3, 0, 3), 1);
        let extent = Extent::new(2, 2, 0, 3, 1, 3);
        let layout = compute_texture_size(&extent).unwrap();
        let quad = quad_geometry(&volume, &extent, &layout);
        assert_eq!(
            quad.corners,
            [
                DVec3::new(2.0, 0.0, 1.0),
                DVec3::new(2.0, 3.0, 1.0),
                DVec3::new(2.0, 3.0, 3.0),
                DVec3::new(2.0, 0.0, 3.0),
            ]
        );
    }

    #[test]
    fn test_contiguity() {
        let volume = volume_u8(Extent::new(0, 7, 0, 7, 0, 3), 1);
        let full_slice = Extent::new(0, 7, 2, 5, 1, 1);
        let layout = compute_texture_size(&full_slice).unwrap();
        assert!(is_contiguous(&volume, &full_slice, &layout));

        let partial_rows = Extent::new(1, 7, 0, 7, 1, 1);
        let layout = compute_texture_size(&partial_rows).unwrap();
        assert!(!is_contiguous(&volume, &partial_rows, &layout));

        // An x-slice of a wide volume skips along every row.
        let x_slice = Extent::new(3, 3, 0, 7, 0, 3);
        let layout = compute_texture_size(&x_slice).unwrap();
        assert!(!is_contiguous(&volume, &x_slice, &layout));

        let thin = volume_u8(Extent::new(3, 3, 0, 7, 0, 3), 1);
        assert!(is_contiguous(&thin, &x_slice, &layout));

        let flat_y = volume_u8(Extent::new(0, 7, 2, 2, 0, 3), 1);
        let y_slice = Extent::new(0, 7, 2, 2, 1, 3);
        let layout = compute_texture_size(&y_slice).unwrap();
        assert!(is_contiguous(&flat_y, &y_slice, &layout));
    }

    #[test]
    fn test_zero_copy_borrows_volume() {
        let volume = volume_u8(Extent::new(0, 7, 0, 3, 0, 1), 1);
        let extent = Extent::new(0, 7, 0, 3, 1, 1);
        let data =
            make_texture_data(None, &volume, &extent, None, &Options::default()).unwrap();
        assert!(data.is_borrowed());
        let start = volume.value_offset(0, 0, 1);
        let expected = &volume.scalars().as_u8().unwrap()[start..start + 32];
        assert_eq!(data.bytes.as_ref(), expected);
        assert_eq!(data.bytes.as_ptr(), expected.as_ptr());
        assert_eq!((data.width, data.height, data.bytes_per_pixel), (8, 4, 1));
    }

    #[test]
    fn test_zero_copy_disabled_by_option() {
        let volume = volume_u8(Extent::new(0, 7, 0, 3, 0, 0), 1);
        let options = Options {
            zero_copy: false,
            ..Options::default()
        };
        let data = make_texture_data(None, &volume, &volume.extent(), None, &options).unwrap();
        assert!(!data.is_borrowed());
        assert_eq!(data.bytes.as_ref(), volume.scalars().as_u8().unwrap());
    }

    #[test]
    fn test_non_contiguous_copy_with_padding() {
        let volume = volume_u8(Extent::new(0, 9, 0, 9, 0, 0), 1);
        let extent = Extent::new(2, 4, 1, 2, 0, 0);
        let data = make_texture_data(None, &volume, &extent, None, &Options::default()).unwrap();
        assert!(!data.is_borrowed());
        assert_eq!((data.width, data.height), (4, 2));
        let row = |j: i32| -> Vec<u8> {
            (2..=4)
                .map(|i| volume.sample(i, j, 0, 0) as u8)
                .chain(std::iter::once(0))
                .collect()
        };
        let expected: Vec<u8> = row(1).into_iter().chain(row(2)).collect();
        assert_eq!(data.bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_flat_y_padding_goes_after_each_slice() {
        let volume = volume_u8(Extent::new(0, 2, 0, 3, 0, 1), 1);
        let extent = Extent::new(0, 2, 1, 1, 0, 1);
        let data = make_texture_data(None, &volume, &extent, None, &Options::default()).unwrap();
        assert_eq!((data.width, data.height), (4, 2));
        let bytes = data.bytes.as_ref();
        for k in 0..2 {
            for i in 0..3 {
                assert_eq!(
                    f64::from(bytes[k as usize * 4 + i as usize]),
                    volume.sample(i, 1, k, 0)
                );
            }
            assert_eq!(bytes[k as usize * 4 + 3], 0);
        }
    }

    #[test]
    fn test_reuse_fills_image_region_only() {
        let volume = volume_u8(Extent::new(0, 9, 0, 4, 0, 0), 1);
        let existing = ExistingTexture {
            texture_size: [16, 8],
            bytes_per_pixel: 1,
        };
        let data = make_texture_data(
            None,
            &volume,
            &volume.extent(),
            Some(existing),
            &Options::default(),
        )
        .unwrap();
        assert!(data.reuse_texture);
        assert_eq!((data.width, data.height), (10, 5));
        assert_eq!(data.texture_size, [16, 8]);
        // Image-sized and contiguous: the reused upload borrows as well.
        assert!(data.is_borrowed());

        let other_depth = ExistingTexture {
            bytes_per_pixel: 4,
            ..existing
        };
        let data = make_texture_data(
            None,
            &volume,
            &volume.extent(),
            Some(other_depth),
            &Options::default(),
        )
        .unwrap();
        assert!(!data.reuse_texture);
        assert_eq!((data.width, data.height), (16, 8));
    }

    #[test]
    fn test_window_level_uses_conversion() {
        let volume = ImageVolume::new(
            Extent::new(0, 3, 0, 0, 0, 0),
            DVec3::ONE,
            DVec3::ZERO,
            ScalarArray::from_vec(vec![0i16, 1000, 2000, 4000], 1).unwrap(),
        )
        .unwrap();
        let mut property = ImageProperty::default();
        property.set_color_window(4000.0);
        property.set_color_level(2000.0);
        let data = make_texture_data(
            Some(&property),
            &volume,
            &volume.extent(),
            None,
            &Options::default(),
        )
        .unwrap();
        let bytes = data.bytes.as_ref();
        assert_eq!(bytes[0], 0);
        assert!((i32::from(bytes[1]) - 64).abs() <= 1);
        assert!((i32::from(bytes[2]) - 128).abs() <= 1);
        assert_eq!(bytes[3], 255);
    }

    #[test]
    fn test_lookup_table_forces_rgba() {
        let volume = volume_u8(Extent::new(0, 2, 0, 1, 0, 0), 1);
        let mut property = ImageProperty::default();
        property.set_lookup_table(Some(Arc::new(LookupTable::grayscale(256))));
        property.set_opacity(0.5);
        let data = make_texture_data(
            Some(&property),
            &volume,
            &volume.extent(),
            None,
            &Options::default(),
        )
        .unwrap();
        assert_eq!(data.format, ColorFormat::Rgba);
        assert_eq!((data.width, data.height, data.bytes_per_pixel), (4, 2, 4));
        assert!(!data.is_borrowed());
        // Alpha comes from the mapping's opacity.
        assert_eq!(data.bytes[3], 128);
    }

    #[test]
    fn test_rgb_volume_keeps_three_channels() {
        let volume = volume_u8(Extent::new(0, 1, 0, 1, 0, 0), 3);
        let data = make_texture_data(None, &volume, &volume.extent(), None, &Options::default())
            .unwrap();
        assert_eq!(data.format, ColorFormat::Rgb);
        assert_eq!(data.bytes.len(), 12);
    }

    #[test]
    fn test_too_many_components() {
        let volume = volume_u8(Extent::new(0, 1, 0, 1, 0, 0), 5);
        assert!(
            make_texture_data(None, &volume, &volume.extent(), None, &Options::default()).is_err()
        );
    }

    #[test]
    fn test_thick_extent_rejected() {
        let volume = volume_u8(Extent::new(0, 3, 0, 3, 0, 3), 1);
        let result = make_texture_data(
            None,
            &volume,
            &Extent::new(0, 3, 0, 3, 1, 2),
            None,
            &Options::default(),
        );
        assert!(matches!(
            result,
            Err(crate::RenderError::Core(VolsliceError::InvalidExtent(
                [0, 3, 0, 3, 1, 2]
            )))
        ));
    }
}
