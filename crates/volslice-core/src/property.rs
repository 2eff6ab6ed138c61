//! Display properties of an image slice.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color_convert::ShiftScale;
use crate::mtime::TimeStamp;
use crate::options::Options;
use crate::scalars_to_colors::{ColorMapping, ScalarsToColors};

/// Resampling kernel used by the reslicer and the texture filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    #[default]
    Nearest,
    Linear,
    Cubic,
    Lanczos,
}

impl Interpolation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Interpolation::Nearest => "nearest",
            Interpolation::Linear => "linear",
            Interpolation::Cubic => "cubic",
            Interpolation::Lanczos => "lanczos",
        }
    }
}

/// Window/level, opacity, interpolation and optional color table.
#[derive(Debug, Clone)]
pub struct ImageProperty {
    color_window: f64,
    color_level: f64,
    opacity: f64,
    interpolation: Interpolation,
    lookup_table: Option<Arc<dyn ScalarsToColors>>,
    use_lookup_table_scalar_range: bool,
    mtime: TimeStamp,
}

impl Default for ImageProperty {
    fn default() -> Self {
        Self {
            color_window: 255.0,
            color_level: 127.5,
            opacity: 1.0,
            interpolation: Interpolation::Nearest,
            lookup_table: None,
            use_lookup_table_scalar_range: false,
            mtime: TimeStamp::new(),
        }
    }
}

impl ImageProperty {
    /// Creates a property with the default window/level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a property using the window/level defaults from `options`.
    pub fn from_options(options: &Options) -> Self {
        Self {
            color_window: options.default_color_window,
            color_level: options.default_color_level,
            ..Self::default()
        }
    }

    pub fn color_window(&self) -> f64 {
        self.color_window
    }

    pub fn set_color_window(&mut self, window: f64) {
        if window != self.color_window {
            self.color_window = window;
            self.mtime.modified();
        }
    }

    pub fn color_level(&self) -> f64 {
        self.color_level
    }

    pub fn set_color_level(&mut self, level: f64) {
        if level != self.color_level {
            self.color_level = level;
            self.mtime.modified();
        }
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// Sets the opacity, clamped to `[0, 1]`.
    pub fn set_opacity(&mut self, opacity: f64) {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity != self.opacity {
            self.opacity = opacity;
            self.mtime.modified();
        }
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        if interpolation != self.interpolation {
            self.interpolation = interpolation;
            self.mtime.modified();
        }
    }

    pub fn lookup_table(&self) -> Option<&Arc<dyn ScalarsToColors>> {
        self.lookup_table.as_ref()
    }

    pub fn set_lookup_table(&mut self, table: Option<Arc<dyn ScalarsToColors>>) {
        self.lookup_table = table;
        self.mtime.modified();
    }

    pub fn use_lookup_table_scalar_range(&self) -> bool {
        self.use_lookup_table_scalar_range
    }

    pub fn set_use_lookup_table_scalar_range(&mut self, enabled: bool) {
        if enabled != self.use_lookup_table_scalar_range {
            self.use_lookup_table_scalar_range = enabled;
            self.mtime.modified();
        }
    }

    /// Latest of the property's own time and its table's.
    pub fn mtime(&self) -> TimeStamp {
        self.lookup_table
            .as_ref()
            .map_or(self.mtime, |t| self.mtime.max(t.mtime()))
    }

    /// Window/level as a shift-scale.
    pub fn window_level_shift_scale(&self) -> ShiftScale {
        ShiftScale::from_window_level(self.color_window, self.color_level)
    }

    /// Range and opacity used with the lookup table.
    ///
    /// The range is `level ± window / 2` unless the table's own range is
    /// requested. The property opacity replaces the table's own alpha;
    /// per-entry alpha still scales it when mapping.
    pub fn color_mapping(&self) -> Option<ColorMapping> {
        let table = self.lookup_table.as_ref()?;
        let range = if self.use_lookup_table_scalar_range {
            table.range()
        } else {
            [
                self.color_level - 0.5 * self.color_window,
                self.color_level + 0.5 * self.color_window,
            ]
        };
        Some(ColorMapping {
            range,
            alpha: self.opacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup_table::LookupTable;

    #[test]
    fn test_defaults() {
        let property = ImageProperty::default();
        assert!((property.color_window() - 255.0).abs() < f64::EPSILON);
        assert!((property.color_level() - 127.5).abs() < f64::EPSILON);
        assert!((property.opacity() - 1.0).abs() < f64::EPSILON);
        assert_eq!(property.interpolation(), Interpolation::Nearest);
        assert!(property.lookup_table().is_none());
        assert!(property.color_mapping().is_none());
        assert!(property.window_level_shift_scale().is_identity_for_u8());
    }

    #[test]
    fn test_setters_only_bump_on_change() {
        let mut property = ImageProperty::default();
        let before = property.mtime();
        property.set_color_window(255.0);
        property.set_interpolation(Interpolation::Nearest);
        assert_eq!(property.mtime(), before);
        property.set_color_level(10.0);
        assert!(property.mtime() > before);
    }

    #[test]
    fn test_mtime_follows_table() {
        let mut property = ImageProperty::default();
        let table: Arc<dyn ScalarsToColors> = Arc::new(LookupTable::grayscale(4));
        property.set_lookup_table(Some(table));
        let own = property.mtime();
        // A table modified later than the property drives the combined time.
        let newer: Arc<dyn ScalarsToColors> = Arc::new(LookupTable::grayscale(4));
        assert!(newer.mtime() > own);
        property.lookup_table = Some(newer.clone());
        assert_eq!(property.mtime(), newer.mtime());
    }

    #[test]
    fn test_color_mapping_range() {
        let mut property = ImageProperty::default();
        property.set_color_window(100.0);
        property.set_color_level(50.0);
        property.set_opacity(0.25);
        let table = LookupTable::grayscale(4).with_range([-7.0, 7.0]);
        property.set_lookup_table(Some(Arc::new(table)));

        let mapping = property.color_mapping().unwrap();
        assert_eq!(mapping.range, [0.0, 100.0]);
        assert!((mapping.alpha - 0.25).abs() < f64::EPSILON);

        property.set_use_lookup_table_scalar_range(true);
        assert_eq!(property.color_mapping().unwrap().range, [-7.0, 7.0]);
    }

    #[test]
    fn test_opacity_replaces_table_alpha() {
        let mut table = LookupTable::from_entries(vec![[10, 20, 30, 255], [40, 50, 60, 102]])
            .unwrap()
            .with_range([0.0, 1.0]);
        table.set_alpha(0.2);
        let mut property = ImageProperty::default();
        property.set_opacity(0.5);
        property.set_use_lookup_table_scalar_range(true);
        property.set_lookup_table(Some(Arc::new(table)));

        let mapping = property.color_mapping().unwrap();
        assert!((mapping.alpha - 0.5).abs() < f64::EPSILON);

        let table = property.lookup_table().unwrap();
        let data = [0u8, 1];
        let mut out = [0u8; 8];
        table
            .map_scalars_through_table(
                crate::ScalarView::U8(&data),
                1,
                2,
                &mapping,
                crate::ColorFormat::Rgba,
                &mut out,
            )
            .unwrap();
        assert_eq!(out, [10, 20, 30, 128, 40, 50, 60, 51]);
    }
}
