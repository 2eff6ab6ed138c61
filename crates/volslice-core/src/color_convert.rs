//! Per-pixel conversion of scalar samples into 8-bit color.
//!
//! Every converter applies the affine normalization `(value + shift) * scale`,
//! clamps to `[0, 255]` and rounds half up. Input layout is implied by the
//! number of components (1 luminance, 2 luminance-alpha, 3 RGB, 4 or more
//! RGBA); the output layout is a [`ColorFormat`].

use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VolsliceError};
use crate::scalar::{Scalar, ScalarView};

/// Perceptual weights for red, green and blue.
pub const LUMINANCE_WEIGHTS: [f64; 3] = [0.30, 0.59, 0.11];

/// Scale used when a range collapses to (almost) zero width.
const DEGENERATE_RANGE_SCALE: f64 = 2.55e17;

/// Scale used when the color window is zero.
const ZERO_WINDOW_SCALE: f64 = 1e32;

/// Byte layout of converted pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorFormat {
    Luminance,
    LuminanceAlpha,
    Rgb,
    Rgba,
}

impl ColorFormat {
    /// Maps a component count to a format.
    pub fn from_components(components: usize) -> Result<Self> {
        match components {
            1 => Ok(ColorFormat::Luminance),
            2 => Ok(ColorFormat::LuminanceAlpha),
            3 => Ok(ColorFormat::Rgb),
            4 => Ok(ColorFormat::Rgba),
            n => {
                log::error!("unrecognized color format with {n} components");
                Err(VolsliceError::UnsupportedColorFormat(n))
            }
        }
    }

    /// Bytes per pixel.
    #[must_use]
    pub fn components(self) -> usize {
        match self {
            ColorFormat::Luminance => 1,
            ColorFormat::LuminanceAlpha => 2,
            ColorFormat::Rgb => 3,
            ColorFormat::Rgba => 4,
        }
    }

    /// Whether the format carries an alpha channel.
    #[must_use]
    pub fn has_alpha(self) -> bool {
        matches!(self, ColorFormat::LuminanceAlpha | ColorFormat::Rgba)
    }
}

/// Perceptual luminance of an RGB triple (unrounded).
#[must_use]
pub fn luminance(r: f64, g: f64, b: f64) -> f64 {
    r * LUMINANCE_WEIGHTS[0] + g * LUMINANCE_WEIGHTS[1] + b * LUMINANCE_WEIGHTS[2]
}

/// Rounds a value already clamped to `[0, 255]` half up.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn round_byte(value: f64) -> u8 {
    (value + 0.5).floor() as u8
}

/// Affine normalization `(value + shift) * scale` into the byte range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftScale {
    pub shift: f64,
    pub scale: f64,
}

impl ShiftScale {
    /// Leaves byte values unchanged.
    pub const IDENTITY: ShiftScale = ShiftScale {
        shift: 0.0,
        scale: 1.0,
    };

    /// Maps `range[0]` to 0 and `range[1]` to 255.
    ///
    /// A (near) zero-width range pins the scale to a huge magnitude with the
    /// sign of the range, so values saturate on either side of the single
    /// reference point.
    #[must_use]
    pub fn from_range(range: [f64; 2]) -> Self {
        let width = range[1] - range[0];
        let scale = if width * width > 1e-30 {
            255.0 / width
        } else if width < 0.0 {
            -DEGENERATE_RANGE_SCALE
        } else {
            DEGENERATE_RANGE_SCALE
        };
        Self {
            shift: -range[0],
            scale,
        }
    }

    /// Window/level contrast mapping.
    #[must_use]
    pub fn from_window_level(window: f64, level: f64) -> Self {
        let scale = if window == 0.0 {
            ZERO_WINDOW_SCALE
        } else {
            255.0 / window
        };
        Self {
            shift: 0.5 * window - level,
            scale,
        }
    }

    /// Normalizes and clamps one value (not rounded).
    #[inline]
    #[must_use]
    pub fn apply(&self, value: f64) -> f64 {
        let v = (value + self.shift) * self.scale;
        if v.is_nan() {
            0.0
        } else {
            v.clamp(0.0, 255.0)
        }
    }

    /// Whether unsigned bytes can be passed through unchanged: the mapped
    /// values of 0 and 255 truncate to 0 and 255.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn is_identity_for_u8(&self) -> bool {
        (self.shift * self.scale) as i64 == 0 && ((255.0 + self.shift) * self.scale) as i64 == 255
    }
}

impl Default for ShiftScale {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// How input tuples are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLayout {
    /// Color components per tuple: 1, 2, 3, or 4 and above (read as RGBA).
    pub components: usize,
    /// Values from the start of one tuple to the next.
    pub stride: usize,
}

impl InputLayout {
    /// Tightly packed tuples.
    #[must_use]
    pub fn packed(components: usize) -> Self {
        Self {
            components,
            stride: components,
        }
    }

    /// Number of values needed to read `count` tuples.
    #[must_use]
    pub fn values_needed(&self, count: usize) -> usize {
        if count == 0 {
            0
        } else {
            (count - 1) * self.stride + self.components.min(4)
        }
    }
}

/// Output format plus normalization and opacity for one conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvertParams {
    pub format: ColorFormat,
    pub shift_scale: ShiftScale,
    /// Opacity in `[0, 1]`; values outside are clamped.
    pub alpha: f64,
}

fn check_buffers(
    input_len: usize,
    layout: InputLayout,
    count: usize,
    format: ColorFormat,
    out_len: usize,
) -> Result<()> {
    if layout.components == 0 || layout.stride < layout.components.min(4) {
        return Err(VolsliceError::UnsupportedColorFormat(layout.components));
    }
    let needed = layout.values_needed(count);
    if input_len < needed {
        return Err(VolsliceError::SizeMismatch {
            expected: needed,
            actual: input_len,
        });
    }
    let needed = count * format.components();
    if out_len < needed {
        return Err(VolsliceError::SizeMismatch {
            expected: needed,
            actual: out_len,
        });
    }
    Ok(())
}

/// Shared pixel loop. `norm` maps one raw value into `[0, 255]`, unrounded.
fn convert_pixels<T: Copy>(
    input: &[T],
    layout: InputLayout,
    count: usize,
    format: ColorFormat,
    alpha: f64,
    norm: impl Fn(T) -> f64,
    out: &mut [u8],
) {
    let alpha = alpha.clamp(0.0, 1.0);
    let solid_alpha = round_byte(alpha * 255.0);
    let out_components = format.components();

    for (index, dst) in out
        .chunks_exact_mut(out_components)
        .take(count)
        .enumerate()
    {
        let px = &input[index * layout.stride..];
        let (lum, rgb, carried) = match layout.components {
            1 => {
                let l = norm(px[0]);
                (l, [l; 3], None)
            }
            2 => {
                let l = norm(px[0]);
                (l, [l; 3], Some(norm(px[1])))
            }
            3 => {
                let rgb = [norm(px[0]), norm(px[1]), norm(px[2])];
                (luminance(rgb[0], rgb[1], rgb[2]), rgb, None)
            }
            _ => {
                let rgb = [norm(px[0]), norm(px[1]), norm(px[2])];
                (luminance(rgb[0], rgb[1], rgb[2]), rgb, Some(norm(px[3])))
            }
        };
        let a = carried.map_or(solid_alpha, |a| round_byte(a * alpha));

        match format {
            ColorFormat::Luminance => dst[0] = round_byte(lum),
            ColorFormat::LuminanceAlpha => {
                dst[0] = round_byte(lum);
                dst[1] = a;
            }
            ColorFormat::Rgb => {
                for (d, c) in dst.iter_mut().zip(rgb) {
                    *d = round_byte(c);
                }
            }
            ColorFormat::Rgba => {
                for (d, c) in dst.iter_mut().zip(rgb) {
                    *d = round_byte(c);
                }
                dst[3] = a;
            }
        }
    }
}

/// Converts `count` tuples of any numeric type into `params.format` pixels.
pub fn colors_to_colors<T: Scalar>(
    input: &[T],
    layout: InputLayout,
    count: usize,
    params: &ConvertParams,
    out: &mut [u8],
) -> Result<()> {
    check_buffers(input.len(), layout, count, params.format, out.len())?;
    let shift_scale = params.shift_scale;
    convert_pixels(
        input,
        layout,
        count,
        params.format,
        params.alpha,
        |v: T| shift_scale.apply(v.as_()),
        out,
    );
    Ok(())
}

/// Converts unsigned bytes without normalization; only opacity is applied.
pub fn copy_u8_colors(
    input: &[u8],
    layout: InputLayout,
    count: usize,
    format: ColorFormat,
    alpha: f64,
    out: &mut [u8],
) -> Result<()> {
    check_buffers(input.len(), layout, count, format, out.len())?;
    convert_pixels(input, layout, count, format, alpha, f64::from, out);
    Ok(())
}

/// Expands `count` packed bits, most significant bit first, into one byte
/// (0 or 1) per bit, starting `offset` bits into `packed`.
pub fn unpack_bits(packed: &[u8], offset: usize, count: usize) -> Result<Vec<u8>> {
    let needed = (offset + count).div_ceil(8);
    if packed.len() < needed {
        return Err(VolsliceError::SizeMismatch {
            expected: needed,
            actual: packed.len(),
        });
    }
    Ok((offset..offset + count)
        .map(|bit| (packed[bit / 8] >> (7 - bit % 8)) & 1)
        .collect())
}

/// Converts any [`ScalarView`] into colors, taking the byte pass-through
/// path when the data is unsigned bytes and the normalization is identity.
pub fn convert_view(
    view: ScalarView<'_>,
    layout: InputLayout,
    count: usize,
    params: &ConvertParams,
    out: &mut [u8],
) -> Result<()> {
    if let ScalarView::Bit { bytes, offset, .. } = view {
        let unpacked = unpack_bits(bytes, offset, layout.values_needed(count))?;
        return colors_to_colors(&unpacked, layout, count, params, out);
    }
    if let Some(bytes) = view.as_u8() {
        if params.shift_scale.is_identity_for_u8() {
            return copy_u8_colors(bytes, layout, count, params.format, params.alpha, out);
        }
    }
    crate::with_scalar_slice!(
        view,
        values => colors_to_colors(values, layout, count, params, out),
        bits => Ok(())
    )
}

/// Fixed-point window/level for 8 and 16 bit integers.
///
/// The scale is stored with `bit_shift` fraction bits, chosen as large as
/// possible while the worst-case 16-bit product stays below `i32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerShiftScale {
    int_scale: i64,
    int_shift: i64,
    bit_shift: u32,
}

impl IntegerShiftScale {
    /// Returns `None` when no fraction width keeps the product in range,
    /// in which case the floating-point path must be used.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(shift_scale: ShiftScale) -> Option<Self> {
        let abs_scale = shift_scale.scale.abs();
        if !abs_scale.is_finite() || abs_scale == 0.0 || !shift_scale.shift.is_finite() {
            return None;
        }
        let limit = f64::from(i32::MAX);
        let worst = 2.0 * f64::from(u16::MAX);
        let mut bit_shift: i32 = 0;
        while bit_shift < 31 && f64::from(1u32 << bit_shift) * abs_scale * worst < limit {
            bit_shift += 1;
        }
        bit_shift -= 1;
        let bit_shift = u32::try_from(bit_shift).ok()?;

        let int_scale = (shift_scale.scale * f64::from(1u32 << bit_shift)) as i64;
        if int_scale == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let int_shift = (int_scale as f64 * shift_scale.shift) as i64;
        Some(Self {
            int_scale,
            int_shift,
            bit_shift,
        })
    }

    /// Number of fraction bits.
    #[must_use]
    pub fn bit_shift(&self) -> u32 {
        self.bit_shift
    }

    /// Maps one integer sample to a byte, rounding half up.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn apply(&self, value: i32) -> u8 {
        let half = if self.bit_shift > 0 {
            1i64 << (self.bit_shift - 1)
        } else {
            0
        };
        let t = i64::from(value) * self.int_scale + self.int_shift + half;
        if t < 0 {
            0
        } else {
            (t >> self.bit_shift).min(255) as u8
        }
    }
}

/// Window/level each value independently with fixed-point math.
pub fn integer_shift_scale<T: Scalar + Into<i32>>(
    input: &[T],
    params: &IntegerShiftScale,
    out: &mut [u8],
) {
    for (dst, &v) in out.iter_mut().zip(input) {
        *dst = params.apply(v.into());
    }
}

/// Window/level each value independently with floating-point math.
pub fn shift_scale_values<T: Scalar>(input: &[T], shift_scale: ShiftScale, out: &mut [u8]) {
    for (dst, &v) in out.iter_mut().zip(input) {
        *dst = round_byte(shift_scale.apply(v.as_()));
    }
}

/// Window/level the first `count` values of a view into bytes, one output
/// byte per input value.
///
/// Picks the cheapest correct path: byte copy for identity-mapped unsigned
/// bytes, fixed point for 8/16-bit integers when `allow_integer` is set,
/// floating point otherwise.
pub fn shift_scale_view(
    view: ScalarView<'_>,
    count: usize,
    shift_scale: ShiftScale,
    allow_integer: bool,
    out: &mut [u8],
) -> Result<()> {
    if view.len() < count || out.len() < count {
        return Err(VolsliceError::SizeMismatch {
            expected: count,
            actual: view.len().min(out.len()),
        });
    }
    let out = &mut out[..count];
    let integer = if allow_integer && view.scalar_type().is_small_integer() {
        IntegerShiftScale::new(shift_scale)
    } else {
        None
    };

    match view {
        ScalarView::U8(values) if shift_scale.is_identity_for_u8() => {
            out.copy_from_slice(&values[..count]);
        }
        ScalarView::Bit { bytes, offset, .. } => {
            let unpacked = unpack_bits(bytes, offset, count)?;
            shift_scale_values(&unpacked, shift_scale, out);
        }
        ScalarView::I8(values) => match integer {
            Some(p) => integer_shift_scale(&values[..count], &p, out),
            None => shift_scale_values(&values[..count], shift_scale, out),
        },
        ScalarView::U8(values) => match integer {
            Some(p) => integer_shift_scale(&values[..count], &p, out),
            None => shift_scale_values(&values[..count], shift_scale, out),
        },
        ScalarView::I16(values) => match integer {
            Some(p) => integer_shift_scale(&values[..count], &p, out),
            None => shift_scale_values(&values[..count], shift_scale, out),
        },
        ScalarView::U16(values) => match integer {
            Some(p) => integer_shift_scale(&values[..count], &p, out),
            None => shift_scale_values(&values[..count], shift_scale, out),
        },
        other => crate::with_scalar_slice!(
            other,
            values => shift_scale_values(&values[..count], shift_scale, out),
            bits => {}
        ),
    }
    Ok(())
}
