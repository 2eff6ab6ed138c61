//! Core data model for volslice.
//!
//! This crate holds everything that does not touch a graphics device:
//! - [`ImageVolume`] and typed [`ScalarArray`] storage for volume samples
//! - per-pixel color conversion ([`color_convert`]) with window/level
//! - the [`ScalarsToColors`] trait and [`LookupTable`]
//! - slab projection ([`ImageProjection`]) of a volume along one axis
//! - display properties, camera state and configuration options

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Options structs legitimately have many boolean flags
#![allow(clippy::struct_excessive_bools)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Float comparisons against exact defaults are intentional in setters
#![allow(clippy::float_cmp)]

pub mod camera;
pub mod color_convert;
pub mod color_maps;
pub mod error;
pub mod extent;
pub mod lookup_table;
pub mod mtime;
pub mod options;
pub mod projection;
pub mod property;
pub mod scalar;
pub mod scalars_to_colors;
pub mod volume;

pub use camera::{Camera, ProjectionMode, ViewCamera};
pub use color_convert::{ColorFormat, ConvertParams, InputLayout, ShiftScale};
pub use color_maps::ColorMap;
pub use error::{Result, VolsliceError};
pub use extent::Extent;
pub use lookup_table::LookupTable;
pub use mtime::TimeStamp;
pub use options::Options;
pub use projection::{
    ImageProjection, ProjectionGeometry, ProjectionOperation, ProjectionOutputType,
};
pub use property::{ImageProperty, Interpolation};
pub use scalar::{Scalar, ScalarArray, ScalarData, ScalarType, ScalarView};
pub use scalars_to_colors::{ColorMapping, ColorMode, ScalarsToColors, VectorMode, WindowLevelTable};
pub use volume::ImageVolume;

// Re-export glam types for convenience
pub use glam::{DMat4, DVec3, DVec4};
