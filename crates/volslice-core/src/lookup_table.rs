//! Indexed color tables.

use crate::color_convert::{round_byte, ColorFormat};
use crate::color_maps::ColorMap;
use crate::error::{Result, VolsliceError};
use crate::mtime::TimeStamp;
use crate::scalar::ScalarView;
use crate::scalars_to_colors::{map_with, ColorMapping, ScalarsToColors, VectorMode};

/// Number of entries used when sampling a [`ColorMap`].
pub const DEFAULT_TABLE_SIZE: usize = 256;

/// A table of RGBA entries spread evenly over a scalar range.
///
/// Values below the range take the first entry, values above take the last.
#[derive(Debug, Clone)]
pub struct LookupTable {
    entries: Vec<[u8; 4]>,
    range: [f64; 2],
    alpha: f64,
    vector_mode: VectorMode,
    vector_component: usize,
    mtime: TimeStamp,
}

impl LookupTable {
    /// Creates a table from explicit entries.
    pub fn from_entries(entries: Vec<[u8; 4]>) -> Result<Self> {
        if entries.is_empty() {
            return Err(VolsliceError::SizeMismatch {
                expected: 1,
                actual: 0,
            });
        }
        Ok(Self {
            entries,
            range: [0.0, 255.0],
            alpha: 1.0,
            vector_mode: VectorMode::Component,
            vector_component: 0,
            mtime: TimeStamp::new(),
        })
    }

    /// An opaque black-to-white ramp with `size` entries (at least 2).
    pub fn grayscale(size: usize) -> Self {
        Self::from_color_map(&ColorMap::new("gray", vec![glam::DVec3::ZERO, glam::DVec3::ONE]), size)
    }

    /// Samples `map` at `size` evenly spaced points (at least 2).
    #[allow(clippy::cast_precision_loss)]
    pub fn from_color_map(map: &ColorMap, size: usize) -> Self {
        let size = size.max(2);
        let entries = (0..size)
            .map(|i| {
                let c = map.sample(i as f64 / (size - 1) as f64) * 255.0;
                [
                    round_byte(c.x.clamp(0.0, 255.0)),
                    round_byte(c.y.clamp(0.0, 255.0)),
                    round_byte(c.z.clamp(0.0, 255.0)),
                    255,
                ]
            })
            .collect();
        Self {
            entries,
            range: [0.0, 255.0],
            alpha: 1.0,
            vector_mode: VectorMode::Component,
            vector_component: 0,
            mtime: TimeStamp::new(),
        }
    }

    /// Table entries.
    #[must_use]
    pub fn entries(&self) -> &[[u8; 4]] {
        &self.entries
    }

    /// Builder-style range setter.
    #[must_use]
    pub fn with_range(mut self, range: [f64; 2]) -> Self {
        self.set_range(range);
        self
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

    /// Replaces one entry.
    pub fn set_entry(&mut self, index: usize, rgba: [u8; 4]) -> Result<()> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(VolsliceError::SizeMismatch {
                expected: index + 1,
                actual: len,
            })?;
        *entry = rgba;
        self.mtime.modified();
        Ok(())
    }

    /// Entry index for `value` over `range`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn index_for(&self, value: f64, range: [f64; 2]) -> usize {
        let last = self.entries.len() - 1;
        if value.is_nan() {
            return 0;
        }
        let width = range[1] - range[0];
        if width == 0.0 {
            return if value > range[0] { last } else { 0 };
        }
        let t = ((value - range[0]) / width * self.entries.len() as f64).floor();
        if t <= 0.0 {
            0
        } else {
            (t as usize).min(last)
        }
    }
}

impl ScalarsToColors for LookupTable {
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
        let e = self.entries[self.index_for(value, range)];
        [
            f64::from(e[0]) / 255.0,
            f64::from(e[1]) / 255.0,
            f64::from(e[2]) / 255.0,
            f64::from(e[3]) / 255.0,
        ]
    }

    fn is_opaque(&self) -> bool {
        self.alpha >= 1.0 && self.entries.iter().all(|e| e[3] == 255)
    }

    fn map_scalars_through_table(
        &self,
        input: ScalarView<'_>,
        stride: usize,
        count: usize,
        mapping: &ColorMapping,
        format: ColorFormat,
        out: &mut [u8],
    ) -> Result<()> {
        map_with(input, stride, count, mapping.alpha, format, out, |v| {
            self.entries[self.index_for(v, mapping.range)]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_rejected() {
        assert!(LookupTable::from_entries(vec![]).is_err());
    }

    #[test]
    fn test_index_clamps_to_ends() {
        let table = LookupTable::grayscale(4);
        assert_eq!(table.index_for(-5.0, [0.0, 4.0]), 0);
        assert_eq!(table.index_for(0.5, [0.0, 4.0]), 0);
        assert_eq!(table.index_for(1.5, [0.0, 4.0]), 1);
        assert_eq!(table.index_for(4.0, [0.0, 4.0]), 3);
        assert_eq!(table.index_for(100.0, [0.0, 4.0]), 3);
        assert_eq!(table.index_for(f64::NAN, [0.0, 4.0]), 0);
    }

    #[test]
    fn test_degenerate_range_index() {
        let table = LookupTable::grayscale(8);
        assert_eq!(table.index_for(3.0, [3.0, 3.0]), 0);
        assert_eq!(table.index_for(3.5, [3.0, 3.0]), 7);
    }

    #[test]
    fn test_grayscale_ends() {
        let table = LookupTable::grayscale(256);
        assert_eq!(table.entries()[0], [0, 0, 0, 255]);
        assert_eq!(table.entries()[255], [255, 255, 255, 255]);
        assert!(table.is_opaque());
    }

    #[test]
    fn test_map_through_table_with_alpha() {
        let mut table =
            LookupTable::from_entries(vec![[255, 0, 0, 255], [0, 0, 255, 128]]).unwrap();
        table.set_range([0.0, 1.0]);
        let data = [0.0f32, 1.0];
        let mut out = [0u8; 8];
        let mapping = ColorMapping {
            range: table.range(),
            alpha: 0.5,
        };
        table
            .map_scalars_through_table(
                ScalarView::F32(&data),
                1,
                2,
                &mapping,
                ColorFormat::Rgba,
                &mut out,
            )
            .unwrap();
        assert_eq!(out, [255, 0, 0, 128, 0, 0, 255, 64]);
        assert!(!table.is_opaque());
    }

    #[test]
    fn test_luminance_output_from_table() {
        let table = LookupTable::from_entries(vec![[255, 0, 0, 255]]).unwrap();
        let data = [1u8];
        let mut out = [0u8; 2];
        table
            .map_scalars_through_table(
                ScalarView::U8(&data),
                1,
                1,
                &table.mapping(),
                ColorFormat::LuminanceAlpha,
                &mut out,
            )
            .unwrap();
        assert_eq!(out, [77, 255]);
    }

    #[test]
    fn test_color_map_table() {
        let map = ColorMap::builtin("viridis").unwrap();
        let table = LookupTable::from_color_map(&map, 16).with_range([-1.0, 1.0]);
        assert_eq!(table.entries().len(), 16);
        assert_eq!(table.range(), [-1.0, 1.0]);
        let first = table.map_value(-1.0, table.range());
        assert!((first[0] - 0.267).abs() < 0.01);
    }

    #[test]
    fn test_set_entry_bumps_mtime() {
        let mut table = LookupTable::grayscale(2);
        let before = table.mtime();
        table.set_entry(1, [1, 2, 3, 4]).unwrap();
        assert!(table.mtime() > before);
        assert!(table.set_entry(2, [0; 4]).is_err());
    }
}
