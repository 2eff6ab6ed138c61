//! Named color ramps used to build lookup tables.

use glam::DVec3;

const GRAY: &[[f64; 3]] = &[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];

const VIRIDIS: &[[f64; 3]] = &[
    [0.267, 0.004, 0.329],
    [0.282, 0.140, 0.457],
    [0.253, 0.265, 0.529],
    [0.206, 0.371, 0.553],
    [0.163, 0.471, 0.558],
    [0.127, 0.566, 0.550],
    [0.134, 0.658, 0.517],
    [0.266, 0.749, 0.440],
    [0.477, 0.821, 0.318],
    [0.741, 0.873, 0.150],
    [0.993, 0.906, 0.144],
];

const BLUES: &[[f64; 3]] = &[
    [0.969, 0.984, 1.000],
    [0.871, 0.922, 0.969],
    [0.776, 0.859, 0.937],
    [0.620, 0.792, 0.882],
    [0.419, 0.682, 0.839],
    [0.259, 0.573, 0.776],
    [0.129, 0.443, 0.710],
    [0.031, 0.318, 0.612],
    [0.031, 0.188, 0.420],
];

const REDS: &[[f64; 3]] = &[
    [1.000, 0.961, 0.941],
    [0.996, 0.878, 0.824],
    [0.988, 0.733, 0.631],
    [0.988, 0.573, 0.447],
    [0.984, 0.416, 0.290],
    [0.937, 0.231, 0.173],
    [0.796, 0.094, 0.114],
    [0.647, 0.059, 0.082],
    [0.404, 0.000, 0.051],
];

const COOLWARM: &[[f64; 3]] = &[
    [0.230, 0.299, 0.754],
    [0.552, 0.690, 0.996],
    [0.866, 0.866, 0.866],
    [0.956, 0.604, 0.486],
    [0.706, 0.016, 0.150],
];

const RAINBOW: &[[f64; 3]] = &[
    [0.5, 0.0, 1.0],
    [0.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
];

const BUILTIN: &[(&str, &[[f64; 3]])] = &[
    ("gray", GRAY),
    ("viridis", VIRIDIS),
    ("blues", BLUES),
    ("reds", REDS),
    ("coolwarm", COOLWARM),
    ("rainbow", RAINBOW),
];

/// A piecewise-linear color ramp with evenly spaced control colors.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    /// Color map name.
    pub name: String,
    /// Control colors in `[0, 1]`, evenly spaced from 0 to 1.
    pub colors: Vec<DVec3>,
}

impl ColorMap {
    /// Creates a new color map.
    pub fn new(name: impl Into<String>, colors: Vec<DVec3>) -> Self {
        Self {
            name: name.into(),
            colors,
        }
    }

    /// Looks up one of the built-in ramps by name (case-insensitive).
    pub fn builtin(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        BUILTIN.iter().find(|(n, _)| *n == name).map(|(n, colors)| {
            Self::new(*n, colors.iter().map(|c| DVec3::from_array(*c)).collect())
        })
    }

    /// Names of the built-in ramps.
    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTIN.iter().map(|(n, _)| *n)
    }

    /// Samples the ramp at `t`, clamped to `[0, 1]`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sample(&self, t: f64) -> DVec3 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self.colors.len() {
            0 => DVec3::ZERO,
            1 => self.colors[0],
            len => {
                let n = len - 1;
                let scaled = t * n as f64;
                let idx = (scaled.floor() as usize).min(n - 1);
                self.colors[idx].lerp(self.colors[idx + 1], scaled - idx as f64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert!(ColorMap::builtin("Viridis").is_some());
        assert!(ColorMap::builtin("nope").is_none());
        assert_eq!(ColorMap::builtin_names().count(), 6);
    }

    #[test]
    fn test_sample_endpoints_and_midpoint() {
        let gray = ColorMap::builtin("gray").unwrap();
        assert_eq!(gray.sample(0.0), DVec3::ZERO);
        assert_eq!(gray.sample(1.0), DVec3::ONE);
        assert!((gray.sample(0.25).x - 0.25).abs() < 1e-12);
        assert_eq!(gray.sample(7.0), DVec3::ONE);
        assert_eq!(gray.sample(f64::NAN), DVec3::ZERO);
    }

    #[test]
    fn test_degenerate_maps() {
        assert_eq!(ColorMap::new("empty", vec![]).sample(0.5), DVec3::ZERO);
        let single = ColorMap::new("one", vec![DVec3::X]);
        assert_eq!(single.sample(0.9), DVec3::X);
    }
}
