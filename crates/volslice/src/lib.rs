//! volslice: texture-based oblique slicing of volumetric images.
//!
//! A volume is resampled on a plane chosen by the camera, converted to
//! 8-bit texture bytes through window/level or a lookup table, and drawn
//! as textured quads. Textures that exceed the backend's limits are split
//! into tiles automatically.
//!
//! # Quick Start
//!
//! ```no_run
//! use volslice::*;
//!
//! fn main() -> Result<()> {
//!     init();
//!
//!     let volume = ImageVolume::from_fn(
//!         Extent::new(0, 127, 0, 127, 0, 63),
//!         1,
//!         DVec3::ONE,
//!         DVec3::ZERO,
//!         |i, j, k, _| (i ^ j ^ k) as u16,
//!     )?;
//!     let mut property = ImageProperty::new();
//!     property.set_color_window(128.0);
//!     property.set_color_level(64.0);
//!
//!     let mut images = vec![ImageSlice::new(volume).with_property(property)];
//!     render_to_file("slice.png", &mut images, None, 512, 512, &Options::default())?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`ImageSlice`] - a volume with its display property and placement
//! - [`ImageResliceMapper`] - camera to slice plane to texture to quad
//! - [`RenderBackend`] - texture and draw operations, implemented by
//!   [`SoftwareBackend`] and [`WgpuBackend`]
//! - [`Renderer`] - clears the frame and draws a list of images
//! - [`ImageProjection`] - collapses a slab of slices (average, sum,
//!   minimum, maximum) into a volume that renders like any other

mod error;
mod headless;
mod init;
mod screenshot;

pub use error::{Error, Result};
pub use headless::{render_to_file, render_to_image, render_to_image_gpu, scene_bounds};
pub use init::{init, load_options, save_options};
pub use screenshot::{save_image, save_to_buffer, ScreenshotError};

// Re-export core types
pub use volslice_core::{
    color_convert, Camera, ColorFormat, ColorMap, ColorMapping, ColorMode, Extent, ImageProjection,
    ImageProperty, ImageVolume, Interpolation, LookupTable, Options, ProjectionMode,
    ProjectionOperation, ProjectionOutputType, ScalarArray, ScalarType, ScalarView,
    ScalarsToColors, ShiftScale, TimeStamp, VectorMode, ViewCamera, VolsliceError,
    WindowLevelTable,
};

// Re-export render types
pub use volslice_render::{
    build_reslice_information, ImageReslice, ImageResliceMapper, ImageSlice, LoadReport,
    LoadStats, RenderBackend, RenderError, RenderOutcome, Renderer, ResliceInformation,
    SliceSettings, SoftwareBackend, TextureFilter, WgpuBackend,
};

pub use glam::{DMat4, DVec3, DVec4};
