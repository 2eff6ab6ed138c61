//! Configuration options for volslice.

use std::fs;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for slice texture loading and the software backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Tiles are never split below this edge length.
    pub min_tile_size: u32,

    /// Window used by properties created from these options.
    pub default_color_window: f64,

    /// Level used by properties created from these options.
    pub default_color_level: f64,

    /// Largest texture edge the software backend accepts.
    pub software_max_texture_size: u32,

    /// Texture memory budget of the software backend in bytes.
    pub software_texture_memory: u64,

    /// Background color.
    pub background_color: Vec3,

    /// Use fixed-point window/level for 8 and 16 bit integers.
    pub integer_fast_path: bool,

    /// Upload slice bytes directly when no conversion is needed.
    pub zero_copy: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            min_tile_size: 256,
            default_color_window: 255.0,
            default_color_level: 127.5,
            software_max_texture_size: 4096,
            software_texture_memory: 256 * 1024 * 1024,
            background_color: Vec3::ZERO,
            integer_fast_path: true,
            zero_copy: true,
        }
    }
}

impl Options {
    /// Reads options from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let options = serde_json::from_str(&text)?;
        log::info!("loaded options from {}", path.as_ref().display());
        Ok(options)
    }

    /// Writes options to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.min_tile_size, 256);
        assert!(options.integer_fast_path);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: Options = serde_json::from_str(r#"{"min_tile_size": 64}"#).unwrap();
        assert_eq!(options.min_tile_size, 64);
        assert_eq!(options.software_max_texture_size, 4096);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("volslice-options-{}.json", std::process::id()));
        let options = Options {
            zero_copy: false,
            background_color: Vec3::new(0.1, 0.2, 0.3),
            ..Options::default()
        };
        options.save(&path).unwrap();
        let loaded = Options::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, options);
    }
}
