//! Rendering backend for volslice.
//!
//! This crate turns a volume and a camera into textured quads:
//! - slice plane geometry from the camera ([`geometry`])
//! - resampling the volume on that plane ([`reslice`])
//! - texture byte assembly with power-of-two padding ([`texture_data`])
//! - tiled texture upload with change tracking ([`loader`])
//! - a CPU backend and a wgpu backend behind [`RenderBackend`]

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Pixel and texel index math converts between integer widths throughout
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
// Render entry points take the full set of per-draw inputs
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]

pub mod backend;
pub mod error;
pub mod geometry;
pub mod image_slice;
pub mod loader;
pub mod mapper;
pub mod renderer;
pub mod reslice;
pub mod software;
pub mod texture_data;
pub mod wgpu_backend;

pub use backend::{QuadDraw, RenderBackend, TextureFilter, TextureId, TextureInfo, TextureRegion};
pub use error::{RenderError, RenderResult};
pub use geometry::{build_reslice_information, ResliceInformation, SliceSettings};
pub use image_slice::ImageSlice;
pub use loader::{LoadContext, LoadReport, LoadStats, TextureLoader};
pub use mapper::{ImageResliceMapper, RenderOutcome};
pub use renderer::Renderer;
pub use reslice::{reslice, ImageReslice};
pub use software::{DrawRecord, SoftwareBackend};
pub use texture_data::{
    compute_texture_size, is_contiguous, make_texture_data, quad_geometry, ExistingTexture,
    QuadGeometry, TextureData, TextureLayout,
};
pub use wgpu_backend::WgpuBackend;
