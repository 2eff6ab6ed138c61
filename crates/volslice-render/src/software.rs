//! CPU rendering backend.
//!
//! Textures live in host memory and quads are rasterized into an RGBA
//! framebuffer with perspective-correct texture coordinates. Limits on
//! texture size and memory are configurable, which makes this backend the
//! reference for tiling tests.

use std::collections::HashMap;

use glam::{DVec3, DVec4};
use volslice_core::{ColorFormat, Options, TimeStamp};

use crate::backend::{
    check_upload, next_context_id, QuadDraw, RenderBackend, TextureFilter, TextureId,
    TextureInfo, TextureRegion,
};
use crate::error::{RenderError, RenderResult};

/// Default largest texture edge.
pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 4096;

/// Default texture memory budget in bytes.
pub const DEFAULT_TEXTURE_MEMORY: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
struct SoftTexture {
    info: TextureInfo,
    data: Vec<u8>,
}

impl SoftTexture {
    /// RGBA in `[0, 1]` of one texel.
    fn texel(&self, x: u32, y: u32) -> DVec4 {
        let comps = self.info.format.components();
        let offset = (y as usize * self.info.width as usize + x as usize) * comps;
        let px = &self.data[offset..offset + comps];
        let c = |i: usize| f64::from(px[i]) / 255.0;
        match self.info.format {
            ColorFormat::Luminance => DVec4::new(c(0), c(0), c(0), 1.0),
            ColorFormat::LuminanceAlpha => DVec4::new(c(0), c(0), c(0), c(1)),
            ColorFormat::Rgb => DVec4::new(c(0), c(1), c(2), 1.0),
            ColorFormat::Rgba => DVec4::new(c(0), c(1), c(2), c(3)),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn sample(&self, u: f64, v: f64, filter: TextureFilter) -> DVec4 {
        let w = f64::from(self.info.width);
        let h = f64::from(self.info.height);
        let clamp_x = |x: f64| x.clamp(0.0, w - 1.0) as u32;
        let clamp_y = |y: f64| y.clamp(0.0, h - 1.0) as u32;
        match filter {
            TextureFilter::Nearest => self.texel(clamp_x((u * w).floor()), clamp_y((v * h).floor())),
            TextureFilter::Linear => {
                let x = u * w - 0.5;
                let y = v * h - 0.5;
                let x0 = x.floor();
                let y0 = y.floor();
                let fx = x - x0;
                let fy = y - y0;
                let (xa, xb) = (clamp_x(x0), clamp_x(x0 + 1.0));
                let (ya, yb) = (clamp_y(y0), clamp_y(y0 + 1.0));
                let top = self.texel(xa, ya).lerp(self.texel(xb, ya), fx);
                let bottom = self.texel(xa, yb).lerp(self.texel(xb, yb), fx);
                top.lerp(bottom, fy)
            }
        }
    }
}

/// A quad as seen by the backend, recorded for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub texture: TextureId,
    pub texture_info: TextureInfo,
    pub corners: [DVec3; 4],
    pub tcoords: [[f64; 2]; 4],
}

/// Renders into host memory.
#[derive(Debug)]
pub struct SoftwareBackend {
    context_id: u64,
    created: TimeStamp,
    width: u32,
    height: u32,
    max_texture_size: u32,
    texture_memory: u64,
    textures: HashMap<TextureId, SoftTexture>,
    next_texture: u32,
    bound: Option<TextureId>,
    framebuffer: Vec<u8>,
    draws: Vec<DrawRecord>,
}

impl SoftwareBackend {
    /// Creates a backend with a `width` x `height` color target.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            context_id: next_context_id(),
            created: TimeStamp::new(),
            width,
            height,
            max_texture_size: DEFAULT_MAX_TEXTURE_SIZE,
            texture_memory: DEFAULT_TEXTURE_MEMORY,
            textures: HashMap::new(),
            next_texture: 1,
            bound: None,
            framebuffer: vec![0; width as usize * height as usize * 4],
            draws: Vec::new(),
        }
    }

    /// Creates a backend with the limits from `options`.
    pub fn from_options(width: u32, height: u32, options: &Options) -> Self {
        Self::new(width, height)
            .with_max_texture_size(options.software_max_texture_size)
            .with_texture_memory(options.software_texture_memory)
    }

    /// Sets the largest accepted texture edge.
    #[must_use]
    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.max_texture_size = size.max(1);
        self
    }

    /// Sets the largest accepted texture in bytes.
    #[must_use]
    pub fn with_texture_memory(mut self, bytes: u64) -> Self {
        self.texture_memory = bytes;
        self
    }

    /// Resizes the color target, clearing it.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.framebuffer = vec![0; width as usize * height as usize * 4];
    }

    /// Drops every texture and starts a new context, as after a lost
    /// device or a window moving to another display.
    pub fn recreate_context(&mut self) {
        log::info!(
            "software context {} replaced, {} textures dropped",
            self.context_id,
            self.textures.len()
        );
        self.textures.clear();
        self.bound = None;
        self.context_id = next_context_id();
        self.created = TimeStamp::new();
    }

    /// Quads drawn since the last [`SoftwareBackend::clear_draws`].
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn clear_draws(&mut self) {
        self.draws.clear();
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Raw bytes of a live texture.
    pub fn texture_data(&self, texture: TextureId) -> Option<&[u8]> {
        self.textures.get(&texture).map(|t| t.data.as_slice())
    }

    /// One framebuffer pixel, row 0 at the top.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let mut px = [0; 4];
        px.copy_from_slice(&self.framebuffer[offset..offset + 4]);
        px
    }

    fn texture(&self, texture: TextureId) -> RenderResult<&SoftTexture> {
        self.textures
            .get(&texture)
            .ok_or(RenderError::UnknownTexture(texture.0))
    }
}

#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f64,
    y: f64,
    inv_w: f64,
    u_w: f64,
    v_w: f64,
}

fn edge(a: &ScreenVertex, b: &ScreenVertex, px: f64, py: f64) -> f64 {
    (px - a.x) * (b.y - a.y) - (py - a.y) * (b.x - a.x)
}

/// Tie-break for pixels exactly on an edge. An edge shared by two
/// consistently wound triangles is walked in opposite directions, so
/// exactly one of them owns it.
fn owns_edge(a: &ScreenVertex, b: &ScreenVertex) -> bool {
    let dy = b.y - a.y;
    dy > 0.0 || (dy == 0.0 && b.x < a.x)
}

struct Target<'a> {
    pixels: &'a mut [u8],
    width: u32,
    height: u32,
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn rasterize_triangle(
    target: &mut Target<'_>,
    tri: [ScreenVertex; 3],
    texture: &SoftTexture,
    tint: DVec4,
    filter: TextureFilter,
) {
    let [v0, mut v1, mut v2] = tri;
    let mut area = edge(&v0, &v1, v2.x, v2.y);
    if area == 0.0 || !area.is_finite() {
        return;
    }
    if area < 0.0 {
        std::mem::swap(&mut v1, &mut v2);
        area = -area;
    }

    let min_x = v0.x.min(v1.x).min(v2.x).floor().max(0.0);
    let max_x = v0.x.max(v1.x).max(v2.x).ceil().min(f64::from(target.width));
    let min_y = v0.y.min(v1.y).min(v2.y).floor().max(0.0);
    let max_y = v0.y.max(v1.y).max(v2.y).ceil().min(f64::from(target.height));
    if min_x >= max_x || min_y >= max_y {
        return;
    }

    let edges = [(&v1, &v2), (&v2, &v0), (&v0, &v1)];
    let owned = edges.map(|(a, b)| owns_edge(a, b));

    for py in (min_y as u32)..(max_y as u32) {
        let sy = f64::from(py) + 0.5;
        for px in (min_x as u32)..(max_x as u32) {
            let sx = f64::from(px) + 0.5;
            let w = edges.map(|(a, b)| edge(a, b, sx, sy));
            let inside = w
                .iter()
                .zip(owned)
                .all(|(&wi, own)| wi > 0.0 || (wi == 0.0 && own));
            if !inside {
                continue;
            }
            let l = [w[0] / area, w[1] / area, w[2] / area];
            let inv_w = l[0] * v0.inv_w + l[1] * v1.inv_w + l[2] * v2.inv_w;
            let u = (l[0] * v0.u_w + l[1] * v1.u_w + l[2] * v2.u_w) / inv_w;
            let v = (l[0] * v0.v_w + l[1] * v1.v_w + l[2] * v2.v_w) / inv_w;

            let src = texture.sample(u, v, filter) * tint;
            if src.w <= 0.0 {
                continue;
            }
            let offset = (py as usize * target.width as usize + px as usize) * 4;
            let dst = &mut target.pixels[offset..offset + 4];
            let a = src.w.min(1.0);
            let blend = |s: f64, d: u8, k: f64| {
                let v = s * k + f64::from(d) / 255.0 * (1.0 - a);
                (v.clamp(0.0, 1.0) * 255.0 + 0.5).floor() as u8
            };
            dst[0] = blend(src.x, dst[0], a);
            dst[1] = blend(src.y, dst[1], a);
            dst[2] = blend(src.z, dst[2], a);
            dst[3] = blend(a, dst[3], 1.0);
        }
    }
}

impl RenderBackend for SoftwareBackend {
    fn context_id(&self) -> u64 {
        self.context_id
    }

    fn context_creation_time(&self) -> TimeStamp {
        self.created
    }

    fn viewport_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn texture_fits(&self, width: u32, height: u32, bytes_per_pixel: usize) -> RenderResult<bool> {
        if width > self.max_texture_size || height > self.max_texture_size {
            return Ok(false);
        }
        let bytes = u64::from(width) * u64::from(height) * bytes_per_pixel as u64;
        Ok(bytes <= self.texture_memory)
    }

    fn allocate_texture(
        &mut self,
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> RenderResult<TextureId> {
        if width == 0 || height == 0 {
            return Err(RenderError::TextureCreationFailed(format!(
                "empty texture {width}x{height}"
            )));
        }
        if width > self.max_texture_size || height > self.max_texture_size {
            return Err(RenderError::TextureTooLarge { width, height });
        }
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        let info = TextureInfo {
            width,
            height,
            format,
        };
        log::debug!("software texture {id}: {width}x{height} {format:?}");
        self.textures.insert(
            id,
            SoftTexture {
                info,
                data: vec![0; info.byte_len()],
            },
        );
        Ok(id)
    }

    fn bind_texture(&mut self, texture: TextureId) -> RenderResult<()> {
        self.texture(texture)?;
        self.bound = Some(texture);
        Ok(())
    }

    fn upload_full(&mut self, texture: TextureId, data: &[u8]) -> RenderResult<()> {
        let tex = self
            .textures
            .get_mut(&texture)
            .ok_or(RenderError::UnknownTexture(texture.0))?;
        let region = TextureRegion {
            x: 0,
            y: 0,
            width: tex.info.width,
            height: tex.info.height,
        };
        check_upload(&tex.info, region, data.len())?;
        let len = tex.data.len();
        tex.data.copy_from_slice(&data[..len]);
        Ok(())
    }

    fn upload_partial(
        &mut self,
        texture: TextureId,
        region: TextureRegion,
        data: &[u8],
    ) -> RenderResult<()> {
        let tex = self
            .textures
            .get_mut(&texture)
            .ok_or(RenderError::UnknownTexture(texture.0))?;
        check_upload(&tex.info, region, data.len())?;
        let comps = tex.info.format.components();
        let row = region.width as usize * comps;
        let stride = tex.info.width as usize * comps;
        for (r, src) in data.chunks_exact(row).take(region.height as usize).enumerate() {
            let start = (region.y as usize + r) * stride + region.x as usize * comps;
            tex.data[start..start + row].copy_from_slice(src);
        }
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() && self.bound == Some(texture) {
            self.bound = None;
        }
    }

    fn is_texture(&self, texture: TextureId) -> bool {
        self.textures.contains_key(&texture)
    }

    fn texture_info(&self, texture: TextureId) -> Option<TextureInfo> {
        self.textures.get(&texture).map(|t| t.info)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn begin_frame(&mut self, background: DVec4) -> RenderResult<()> {
        let bg = background
            .to_array()
            .map(|c| (c.clamp(0.0, 1.0) * 255.0 + 0.5).floor() as u8);
        for px in self.framebuffer.chunks_exact_mut(4) {
            px.copy_from_slice(&bg);
        }
        Ok(())
    }

    fn draw_quad(&mut self, draw: &QuadDraw) -> RenderResult<()> {
        let id = self.bound.ok_or(RenderError::NoTextureBound)?;
        let Self {
            textures,
            framebuffer,
            width,
            height,
            draws,
            ..
        } = self;
        let texture = textures.get(&id).ok_or(RenderError::UnknownTexture(id.0))?;
        draws.push(DrawRecord {
            texture: id,
            texture_info: texture.info,
            corners: draw.corners,
            tcoords: draw.tcoords,
        });

        let w = f64::from(*width);
        let h = f64::from(*height);
        let mut vertices = [None; 4];
        for (slot, (corner, tc)) in vertices
            .iter_mut()
            .zip(draw.corners.iter().zip(draw.tcoords))
        {
            let clip = draw.model_to_clip * corner.extend(1.0);
            if clip.w <= 1e-12 {
                continue;
            }
            let inv_w = 1.0 / clip.w;
            *slot = Some(ScreenVertex {
                x: (clip.x * inv_w + 1.0) * 0.5 * w,
                y: (1.0 - clip.y * inv_w) * 0.5 * h,
                inv_w,
                u_w: tc[0] * inv_w,
                v_w: tc[1] * inv_w,
            });
        }

        let mut target = Target {
            pixels: framebuffer,
            width: *width,
            height: *height,
        };
        for [a, b, c] in [[0, 1, 2], [0, 2, 3]] {
            match (vertices[a], vertices[b], vertices[c]) {
                (Some(va), Some(vb), Some(vc)) => {
                    rasterize_triangle(&mut target, [va, vb, vc], texture, draw.color, draw.filter);
                }
                _ => log::debug!("triangle behind the camera skipped"),
            }
        }
        Ok(())
    }

    fn read_pixels(&mut self) -> RenderResult<Vec<u8>> {
        Ok(self.framebuffer.clone())
    }
}
