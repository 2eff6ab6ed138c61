//! Error type of the volslice facade.

use thiserror::Error;
use volslice_core::VolsliceError;
use volslice_render::RenderError;

use crate::screenshot::ScreenshotError;

/// Errors returned by the top-level volslice API.
#[derive(Error, Debug)]
pub enum Error {
    /// Data, color conversion or configuration error.
    #[error(transparent)]
    Core(#[from] VolsliceError),

    /// Backend or slice pipeline error.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Failed to write a rendered image.
    #[error(transparent)]
    Screenshot(#[from] ScreenshotError),
}

/// A specialized Result type for the volslice API.
pub type Result<T> = std::result::Result<T, Error>;
