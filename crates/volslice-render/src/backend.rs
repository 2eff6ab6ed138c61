//! The graphics capability set used to draw slice textures.
//!
//! A backend owns one rendering context: textures, a viewport and a color
//! target. The loader only ever talks to this trait, so the same tiling and
//! reuse logic drives the CPU rasterizer and the wgpu device.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{DMat4, DVec3, DVec4};
use volslice_core::{ColorFormat, TimeStamp};

use crate::error::{RenderError, RenderResult};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity for a newly created context, unique within the process.
pub(crate) fn next_context_id() -> u64 {
    NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Handle of a texture owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
}

/// Size and layout of an allocated texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: ColorFormat,
}

impl TextureInfo {
    /// Bytes of tightly packed pixel data for the whole texture.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.components()
    }
}

/// A rectangle of texels, origin at the first row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One textured quad, drawn with the currently bound texture.
///
/// Corners are in model coordinates, counter-clockwise starting at the
/// texture origin; the vertex color multiplies the texel color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadDraw {
    pub corners: [DVec3; 4],
    pub tcoords: [[f64; 2]; 4],
    pub color: DVec4,
    pub filter: TextureFilter,
    /// Model to clip coordinates, clip depth in `[0, w]`.
    pub model_to_clip: DMat4,
}

/// Texture and drawing operations of a rendering context.
pub trait RenderBackend {
    /// Identity of the current context. Changes when the context is
    /// recreated, invalidating every texture handle.
    fn context_id(&self) -> u64;

    /// When the current context was created.
    fn context_creation_time(&self) -> TimeStamp;

    /// Color target size in pixels.
    fn viewport_size(&self) -> (u32, u32);

    /// Largest texture edge the context accepts.
    fn max_texture_size(&self) -> u32;

    /// Asks the driver whether a texture of this size and depth could be
    /// created now. The answer may change between calls.
    fn texture_fits(&self, width: u32, height: u32, bytes_per_pixel: usize) -> RenderResult<bool>;

    /// Creates an uninitialized texture.
    fn allocate_texture(
        &mut self,
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> RenderResult<TextureId>;

    /// Makes `texture` the one used by subsequent draws.
    fn bind_texture(&mut self, texture: TextureId) -> RenderResult<()>;

    /// Replaces the whole texture; `data` holds `width * height` pixels.
    fn upload_full(&mut self, texture: TextureId, data: &[u8]) -> RenderResult<()>;

    /// Replaces a sub-rectangle; `data` holds `region.width * region.height`
    /// pixels.
    fn upload_partial(
        &mut self,
        texture: TextureId,
        region: TextureRegion,
        data: &[u8],
    ) -> RenderResult<()>;

    /// Frees a texture. Unknown handles are ignored.
    fn release_texture(&mut self, texture: TextureId);

    /// Whether `texture` is a live handle of the current context.
    fn is_texture(&self, texture: TextureId) -> bool;

    /// Size and format of a live texture.
    fn texture_info(&self, texture: TextureId) -> Option<TextureInfo>;

    /// Clears the color target.
    fn begin_frame(&mut self, background: DVec4) -> RenderResult<()>;

    /// Draws one quad with the bound texture, alpha-tested and blended
    /// over the color target.
    fn draw_quad(&mut self, draw: &QuadDraw) -> RenderResult<()>;

    /// Reads the color target back as tightly packed RGBA rows, top row
    /// first.
    fn read_pixels(&mut self) -> RenderResult<Vec<u8>>;
}

/// Validates an upload against a texture's size.
pub(crate) fn check_upload(
    info: &TextureInfo,
    region: TextureRegion,
    data_len: usize,
) -> RenderResult<()> {
    let out_of_bounds = |reason: String| RenderError::UploadOutOfBounds {
        x: region.x,
        y: region.y,
        width: region.width,
        height: region.height,
        reason,
    };
    if u64::from(region.x) + u64::from(region.width) > u64::from(info.width)
        || u64::from(region.y) + u64::from(region.height) > u64::from(info.height)
    {
        return Err(out_of_bounds(format!(
            "texture is {}x{}",
            info.width, info.height
        )));
    }
    let needed = region.width as usize * region.height as usize * info.format.components();
    if data_len < needed {
        return Err(out_of_bounds(format!("need {needed} bytes, got {data_len}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_upload() {
        let info = TextureInfo {
            width: 8,
            height: 4,
            format: ColorFormat::LuminanceAlpha,
        };
        let region = TextureRegion {
            x: 2,
            y: 1,
            width: 6,
            height: 3,
        };
        assert!(check_upload(&info, region, 36).is_ok());
        assert!(matches!(
            check_upload(&info, region, 35),
            Err(RenderError::UploadOutOfBounds { .. })
        ));
        let too_wide = TextureRegion { width: 7, ..region };
        assert!(check_upload(&info, too_wide, 1000).is_err());
    }

    #[test]
    fn test_texture_info_len() {
        let info = TextureInfo {
            width: 16,
            height: 2,
            format: ColorFormat::Rgb,
        };
        assert_eq!(info.byte_len(), 96);
        assert_eq!(TextureId(7).to_string(), "#7");
    }
}
