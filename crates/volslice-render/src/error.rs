//! Rendering error types.

use thiserror::Error;
use volslice_core::VolsliceError;

/// Errors that can occur during rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// Texture creation failed.
    #[error("texture creation failed: {0}")]
    TextureCreationFailed(String),

    /// A texture handle that the backend does not know (released, or from
    /// another context).
    #[error("unknown texture {0}")]
    UnknownTexture(u32),

    /// An upload region that does not fit inside the texture, or a data
    /// buffer too small for the region.
    #[error("upload of {width}x{height} at ({x}, {y}) does not fit: {reason}")]
    UploadOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        reason: String,
    },

    /// A draw issued with no texture bound.
    #[error("no texture bound")]
    NoTextureBound,

    /// Texture larger than the backend's maximum dimension.
    #[error("texture {width}x{height} exceeds the maximum texture size")]
    TextureTooLarge { width: u32, height: u32 },

    /// A data-to-world matrix that cannot be inverted.
    #[error("image transform is not invertible")]
    SingularTransform,

    /// GPU buffer mapping failed.
    #[error("GPU buffer mapping failed")]
    BufferMapFailed,

    /// Data or color conversion error.
    #[error(transparent)]
    Core(#[from] VolsliceError),
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
