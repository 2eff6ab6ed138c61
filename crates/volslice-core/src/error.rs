//! Error types for volslice.

use thiserror::Error;

/// The main error type for volslice data and color operations.
#[derive(Error, Debug)]
pub enum VolsliceError {
    /// Output color format outside luminance / luminance-alpha / RGB / RGBA.
    #[error("unsupported color format with {0} components")]
    UnsupportedColorFormat(usize),

    /// A scalar type that the conversion dispatch does not recognize.
    #[error("unsupported scalar type '{0}'")]
    UnsupportedScalarType(String),

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// An extent with a lower bound above its upper bound, or outside the volume.
    #[error("invalid extent {0:?}")]
    InvalidExtent([i32; 6]),

    /// A vector component index outside the array's component count.
    #[error("component {component} out of range for {components}-component data")]
    ComponentOutOfRange { component: usize, components: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A specialized Result type for volslice operations.
pub type Result<T> = std::result::Result<T, VolsliceError>;
