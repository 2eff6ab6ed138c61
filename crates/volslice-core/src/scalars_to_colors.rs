//! Mapping scalar arrays to 8-bit colors.
//!
//! [`ScalarsToColors`] is the seam between the texture assembler and color
//! tables. A table exposes its range, opacity and vector handling; mapping
//! parameters are passed in per call as a [`ColorMapping`], so a caller can
//! override the range (for example from a window/level) without mutating a
//! table it shares with others.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color_convert::{
    convert_view, copy_u8_colors, luminance, round_byte, ColorFormat, ConvertParams, InputLayout,
    ShiftScale,
};
use crate::error::{Result, VolsliceError};
use crate::mtime::TimeStamp;
use crate::scalar::{ScalarArray, ScalarView};

/// How multi-component tuples are reduced before mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VectorMode {
    /// Map one selected component.
    #[default]
    Component,
    /// Map the Euclidean norm of each tuple.
    Magnitude,
    /// Treat the components as colors and convert them directly.
    Colors,
}

/// Whether unsigned byte data is taken as colors or mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorMode {
    /// Unsigned bytes are already colors; other types are mapped.
    #[default]
    Default,
    /// Always map through the table.
    MapScalars,
}

/// Per-call mapping parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMapping {
    /// Scalar value mapped to the first color and to the last.
    pub range: [f64; 2],
    /// Opacity multiplier in `[0, 1]`.
    pub alpha: f64,
}

impl ColorMapping {
    fn convert_params(&self, format: ColorFormat) -> ConvertParams {
        ConvertParams {
            format,
            shift_scale: ShiftScale::from_range(self.range),
            alpha: self.alpha,
        }
    }
}

/// Writes one RGB color plus alpha in the requested layout.
pub(crate) fn write_color(rgb: [u8; 3], alpha: u8, format: ColorFormat, dst: &mut [u8]) {
    match format {
        ColorFormat::Luminance => {
            dst[0] = round_byte(luminance(
                f64::from(rgb[0]),
                f64::from(rgb[1]),
                f64::from(rgb[2]),
            ));
        }
        ColorFormat::LuminanceAlpha => {
            dst[0] = round_byte(luminance(
                f64::from(rgb[0]),
                f64::from(rgb[1]),
                f64::from(rgb[2]),
            ));
            dst[1] = alpha;
        }
        ColorFormat::Rgb => dst[..3].copy_from_slice(&rgb),
        ColorFormat::Rgba => {
            dst[..3].copy_from_slice(&rgb);
            dst[3] = alpha;
        }
    }
}

fn check_output(count: usize, format: ColorFormat, out: &[u8]) -> Result<()> {
    let needed = count * format.components();
    if out.len() < needed {
        return Err(VolsliceError::SizeMismatch {
            expected: needed,
            actual: out.len(),
        });
    }
    Ok(())
}

/// Maps scalar values to colors.
pub trait ScalarsToColors: fmt::Debug + Send + Sync {
    /// Scalar range mapped onto the table.
    fn range(&self) -> [f64; 2];

    /// Opacity in `[0, 1]`.
    fn alpha(&self) -> f64;

    /// Vector reduction for multi-component input.
    fn vector_mode(&self) -> VectorMode {
        VectorMode::Component
    }

    /// Component mapped in [`VectorMode::Component`].
    fn vector_component(&self) -> usize {
        0
    }

    /// Last modification time.
    fn mtime(&self) -> TimeStamp;

    /// RGBA color of one value in `[0, 1]` per channel, before opacity.
    fn map_value(&self, value: f64, range: [f64; 2]) -> [f64; 4];

    /// Whether every mapped color is fully opaque.
    fn is_opaque(&self) -> bool {
        self.alpha() >= 1.0
    }

    /// The table's own range and opacity.
    fn mapping(&self) -> ColorMapping {
        ColorMapping {
            range: self.range(),
            alpha: self.alpha(),
        }
    }

    /// Maps the first value of each of `count` tuples, `stride` values apart.
    ///
    /// The default is a linear grayscale ramp over `mapping.range`.
    fn map_scalars_through_table(
        &self,
        input: ScalarView<'_>,
        stride: usize,
        count: usize,
        mapping: &ColorMapping,
        format: ColorFormat,
        out: &mut [u8],
    ) -> Result<()> {
        let layout = InputLayout {
            components: 1,
            stride: stride.max(1),
        };
        convert_view(input, layout, count, &mapping.convert_params(format), out)
    }

    /// Maps `count` tuples of `in_components` values according to
    /// [`ScalarsToColors::vector_mode`].
    fn map_vectors_through_table(
        &self,
        input: ScalarView<'_>,
        in_components: usize,
        count: usize,
        mapping: &ColorMapping,
        format: ColorFormat,
        out: &mut [u8],
    ) -> Result<()> {
        match self.vector_mode() {
            VectorMode::Component => {
                let component = self.vector_component();
                if component >= in_components {
                    return Err(VolsliceError::ComponentOutOfRange {
                        component,
                        components: in_components,
                    });
                }
                let shifted = input.slice(component, input.len() - component);
                self.map_scalars_through_table(shifted, in_components, count, mapping, format, out)
            }
            VectorMode::Magnitude => {
                let needed = count * in_components;
                if input.len() < needed {
                    return Err(VolsliceError::SizeMismatch {
                        expected: needed,
                        actual: input.len(),
                    });
                }
                let magnitudes: Vec<f64> = (0..count)
                    .map(|t| {
                        (0..in_components)
                            .map(|c| input.get_f64(t * in_components + c).powi(2))
                            .sum::<f64>()
                            .sqrt()
                    })
                    .collect();
                self.map_scalars_through_table(
                    ScalarView::F64(&magnitudes),
                    1,
                    count,
                    mapping,
                    format,
                    out,
                )
            }
            VectorMode::Colors => {
                self.map_colors_to_colors(input, in_components, count, mapping, format, out)
            }
        }
    }

    /// Treats tuples as colors: each channel is normalized over
    /// `mapping.range` and converted to `format`.
    fn map_colors_to_colors(
        &self,
        input: ScalarView<'_>,
        in_components: usize,
        count: usize,
        mapping: &ColorMapping,
        format: ColorFormat,
        out: &mut [u8],
    ) -> Result<()> {
        let layout = InputLayout {
            components: in_components.min(4),
            stride: in_components,
        };
        convert_view(input, layout, count, &mapping.convert_params(format), out)
    }

    /// Maps a whole array to RGBA.
    ///
    /// With [`ColorMode::Default`], unsigned byte arrays are taken as colors
    /// (see [`ScalarsToColors::convert_unsigned_char_to_rgba`]). Otherwise
    /// `component` selects a single component, or `None` uses the vector mode.
    fn map_scalars<'a>(
        &self,
        scalars: &'a ScalarArray,
        color_mode: ColorMode,
        component: Option<usize>,
    ) -> Result<Cow<'a, [u8]>> {
        let components = scalars.num_components();
        let tuples = scalars.num_tuples();
        if color_mode == ColorMode::Default {
            if let Some(bytes) = scalars.as_u8() {
                return self.convert_unsigned_char_to_rgba(bytes, components, tuples);
            }
        }

        let mut out = vec![0u8; tuples * 4];
        let mapping = self.mapping();
        match component {
            Some(c) if c >= components => {
                return Err(VolsliceError::ComponentOutOfRange { component: c, components });
            }
            Some(c) => {
                let view = scalars.view();
                self.map_scalars_through_table(
                    view.slice(c, view.len() - c),
                    components,
                    tuples,
                    &mapping,
                    ColorFormat::Rgba,
                    &mut out,
                )?;
            }
            None => self.map_vectors_through_table(
                scalars.view(),
                components,
                tuples,
                &mapping,
                ColorFormat::Rgba,
                &mut out,
            )?,
        }
        Ok(Cow::Owned(out))
    }

    /// Expands byte colors to RGBA, applying the table's opacity.
    ///
    /// Four-component input with full opacity is returned as-is.
    fn convert_unsigned_char_to_rgba<'a>(
        &self,
        colors: &'a [u8],
        components: usize,
        tuples: usize,
    ) -> Result<Cow<'a, [u8]>> {
        let alpha = self.alpha();
        if components == 4 && alpha >= 1.0 {
            return Ok(Cow::Borrowed(colors));
        }
        let mut out = vec![0u8; tuples * 4];
        copy_u8_colors(
            colors,
            InputLayout {
                components: components.min(4),
                stride: components,
            },
            tuples,
            ColorFormat::Rgba,
            alpha,
            &mut out,
        )?;
        Ok(Cow::Owned(out))
    }
}

/// A linear grayscale ramp over a scalar range.
#[derive(Debug, Clone)]
pub struct WindowLevelTable {
    range: [f64; 2],
    alpha: f64,
    vector_mode: VectorMode,
    vector_component: usize,
    mtime: TimeStamp,
}

impl Default for WindowLevelTable {
    fn default() -> Self {
        Self::new([0.0, 255.0])
    }
}

impl WindowLevelTable {
    /// Creates an opaque ramp over `range`.
    pub fn new(range: [f64; 2]) -> Self {
        Self {
            range,
            alpha: 1.0,
            vector_mode: VectorMode::Component,
            vector_component: 0,
            mtime: TimeStamp::new(),
        }
    }

    /// Ramp covering `level - window / 2 ..= level + window / 2`.
    pub fn from_window_level(window: f64, level: f64) -> Self {
        Self::new([level - 0.5 * window, level + 0.5 * window])
    }

    pub fn set_range(&mut self, range: [f64; 2]) {
        if range != self.range {
            self.range = range;
            self.mtime.modified();
        }
    }

    /// Sets the opacity, clamped to `[0, 1]`.
    pub fn set_alpha(&mut self, alpha: f64) {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha != self.alpha {
            self.alpha = alpha;
            self.mtime.modified();
        }
    }

    pub fn set_vector_mode(&mut self, mode: VectorMode) {
        if mode != self.vector_mode {
            self.vector_mode = mode;
            self.mtime.modified();
        }
    }

    pub fn set_vector_component(&mut self, component: usize) {
        if component != self.vector_component {
            self.vector_component = component;
            self.mtime.modified();
        }
    }
}

impl ScalarsToColors for WindowLevelTable {
    fn range(&self) -> [f64; 2] {
        self.range
    }

    fn alpha(&self) -> f64 {
        self.alpha
    }

    fn vector_mode(&self) -> VectorMode {
        self.vector_mode
    }

    fn vector_component(&self) -> usize {
        self.vector_component
    }

    fn mtime(&self) -> TimeStamp {
        self.mtime
    }

    fn map_value(&self, value: f64, range: [f64; 2]) -> [f64; 4] {
        let gray = ShiftScale::from_range(range).apply(value) / 255.0;
        [gray, gray, gray, 1.0]
    }
}

/// Writes `count` mapped colors, one RGBA lookup per tuple.
pub(crate) fn map_with<F>(
    input: ScalarView<'_>,
    stride: usize,
    count: usize,
    alpha: f64,
    format: ColorFormat,
    out: &mut [u8],
    lookup: F,
) -> Result<()>
where
    F: Fn(f64) -> [u8; 4],
{
    check_output(count, format, out)?;
    let stride = stride.max(1);
    if count > 0 && input.len() <= (count - 1) * stride {
        return Err(VolsliceError::SizeMismatch {
            expected: (count - 1) * stride + 1,
            actual: input.len(),
        });
    }
    let alpha = alpha.clamp(0.0, 1.0);
    for (t, dst) in out
        .chunks_exact_mut(format.components())
        .take(count)
        .enumerate()
    {
        let rgba = lookup(input.get_f64(t * stride));
        let a = round_byte(f64::from(rgba[3]) * alpha);
        write_color([rgba[0], rgba[1], rgba[2]], a, format, dst);
    }
    Ok(())
}
