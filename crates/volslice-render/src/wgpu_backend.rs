//! wgpu rendering backend.
//!
//! Runs headless: quads are drawn into an offscreen `Rgba8Unorm` target that
//! can be read back with [`RenderBackend::read_pixels`]. Luminance textures
//! are stored as `R8Unorm`, luminance-alpha as `Rg8Unorm`; RGB data is
//! widened to RGBA on upload since wgpu has no three-channel 8-bit format.

use std::collections::HashMap;

use glam::DVec4;
use volslice_core::{ColorFormat, TimeStamp};
use wgpu::util::DeviceExt;

use crate::backend::{
    check_upload, next_context_id, QuadDraw, RenderBackend, TextureFilter, TextureId,
    TextureInfo, TextureRegion,
};
use crate::error::{RenderError, RenderResult};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Vertex of a slice quad, already in clip space.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadVertex {
    position: [f32; 4],
    tcoord: [f32; 2],
    _pad: [f32; 2],
}

/// Per-draw uniforms, matching `DrawUniforms` in the shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniforms {
    color: [f32; 4],
    channel_mode: u32,
    _pad: [u32; 3],
}

fn texture_format(format: ColorFormat) -> wgpu::TextureFormat {
    match format {
        ColorFormat::Luminance => wgpu::TextureFormat::R8Unorm,
        ColorFormat::LuminanceAlpha => wgpu::TextureFormat::Rg8Unorm,
        ColorFormat::Rgb | ColorFormat::Rgba => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn channel_mode(format: ColorFormat) -> u32 {
    match format {
        ColorFormat::Luminance => 0,
        ColorFormat::LuminanceAlpha => 1,
        ColorFormat::Rgb | ColorFormat::Rgba => 2,
    }
}

/// Bytes per texel on the device.
fn device_bytes_per_pixel(format: ColorFormat) -> u32 {
    match format {
        ColorFormat::Luminance => 1,
        ColorFormat::LuminanceAlpha => 2,
        ColorFormat::Rgb | ColorFormat::Rgba => 4,
    }
}

/// Widens packed RGB rows to RGBA with opaque alpha.
fn expand_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 3 * 4);
    for px in data.chunks_exact(3) {
        out.extend_from_slice(px);
        out.push(255);
    }
    out
}

/// Rounds a row pitch up to the buffer copy alignment.
fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

struct GpuTexture {
    info: TextureInfo,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Renders with a wgpu device into an offscreen color target.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    context_id: u64,
    created: TimeStamp,
    width: u32,
    height: u32,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    nearest_sampler: wgpu::Sampler,
    linear_sampler: wgpu::Sampler,
    textures: HashMap<TextureId, GpuTexture>,
    next_texture: u32,
    bound: Option<TextureId>,
    texture_memory: u64,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("context_id", &self.context_id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("textures", &self.textures.len())
            .finish_non_exhaustive()
    }
}

impl WgpuBackend {
    /// Creates a headless backend rendering into a `width` x `height` target.
    pub async fn new_headless(width: u32, height: u32) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;

        log::info!("using adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("volslice device (headless)"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await?;

        Ok(Self::from_device(device, queue, width, height))
    }

    /// Blocking wrapper around [`WgpuBackend::new_headless`].
    pub fn new_headless_blocking(width: u32, height: u32) -> RenderResult<Self> {
        pollster::block_on(Self::new_headless(width, height))
    }

    /// Wraps an existing device and queue.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let (target, target_view) = create_target(&device, width, height);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Slice Quad Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline = create_pipeline(&device, &bind_group_layout);

        let sampler = |label, filter| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                ..Default::default()
            })
        };
        let nearest_sampler = sampler("Slice Nearest Sampler", wgpu::FilterMode::Nearest);
        let linear_sampler = sampler("Slice Linear Sampler", wgpu::FilterMode::Linear);

        let texture_memory = device.limits().max_buffer_size;

        Self {
            device,
            queue,
            context_id: next_context_id(),
            created: TimeStamp::new(),
            width,
            height,
            target,
            target_view,
            pipeline,
            bind_group_layout,
            nearest_sampler,
            linear_sampler,
            textures: HashMap::new(),
            next_texture: 1,
            bound: None,
            texture_memory,
        }
    }

    /// Caps the size of a single texture in bytes.
    #[must_use]
    pub fn with_texture_memory(mut self, bytes: u64) -> Self {
        self.texture_memory = bytes;
        self
    }

    /// Gets the wgpu device.
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Gets the wgpu queue.
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Resizes the offscreen target.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (target, target_view) = create_target(&self.device, width, height);
        self.target = target;
        self.target_view = target_view;
        self.width = width;
        self.height = height;
    }

    fn write_region(&self, tex: &GpuTexture, region: TextureRegion, data: &[u8]) {
        let expanded;
        let bytes = if tex.info.format == ColorFormat::Rgb {
            expanded = expand_rgb(&data[..region.width as usize * region.height as usize * 3]);
            expanded.as_slice()
        } else {
            data
        };
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.width * device_bytes_per_pixel(tex.info.format)),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn color_pass(&self, label: &str, load: wgpu::LoadOp<wgpu::Color>) -> wgpu::CommandEncoder {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
        }
        encoder
    }
}

fn create_target(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Slice Color Target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());
    (target, view)
}

fn create_pipeline(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Slice Quad Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/textured_quad.wgsl").into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Slice Quad Pipeline Layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Slice Quad Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader_module,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x4,
                        offset: 0,
                        shader_location: 0,
                    },
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x2,
                        offset: 16,
                        shader_location: 1,
                    },
                ],
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader_module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: Some(wgpu::BlendState {
                    color: wgpu::BlendComponent {
                        src_factor: wgpu::BlendFactor::SrcAlpha,
                        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                        operation: wgpu::BlendOperation::Add,
                    },
                    alpha: wgpu::BlendComponent {
                        src_factor: wgpu::BlendFactor::One,
                        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                        operation: wgpu::BlendOperation::Add,
                    },
                }),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None, // The slice is visible from both sides
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

impl RenderBackend for WgpuBackend {
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
        self.device.limits().max_texture_dimension_2d
    }

    fn texture_fits(&self, width: u32, height: u32, bytes_per_pixel: usize) -> RenderResult<bool> {
        let max = self.max_texture_size();
        if width > max || height > max {
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
        let max = self.max_texture_size();
        if width > max || height > max {
            return Err(RenderError::TextureTooLarge { width, height });
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Slice Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        log::debug!("wgpu texture {id}: {width}x{height} {format:?}");
        self.textures.insert(
            id,
            GpuTexture {
                info: TextureInfo {
                    width,
                    height,
                    format,
                },
                texture,
                view,
            },
        );
        Ok(id)
    }

    fn bind_texture(&mut self, texture: TextureId) -> RenderResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(RenderError::UnknownTexture(texture.0));
        }
        self.bound = Some(texture);
        Ok(())
    }

    fn upload_full(&mut self, texture: TextureId, data: &[u8]) -> RenderResult<()> {
        let tex = self
            .textures
            .get(&texture)
            .ok_or(RenderError::UnknownTexture(texture.0))?;
        let region = TextureRegion {
            x: 0,
            y: 0,
            width: tex.info.width,
            height: tex.info.height,
        };
        check_upload(&tex.info, region, data.len())?;
        self.write_region(tex, region, &data[..tex.info.byte_len()]);
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
            .get(&texture)
            .ok_or(RenderError::UnknownTexture(texture.0))?;
        check_upload(&tex.info, region, data.len())?;
        let len = region.width as usize * region.height as usize * tex.info.format.components();
        self.write_region(tex, region, &data[..len]);
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureId) {
        if let Some(tex) = self.textures.remove(&texture) {
            tex.texture.destroy();
            if self.bound == Some(texture) {
                self.bound = None;
            }
        }
    }

    fn is_texture(&self, texture: TextureId) -> bool {
        self.textures.contains_key(&texture)
    }

    fn texture_info(&self, texture: TextureId) -> Option<TextureInfo> {
        self.textures.get(&texture).map(|t| t.info)
    }

    fn begin_frame(&mut self, background: DVec4) -> RenderResult<()> {
        let encoder = self.color_pass(
            "Slice Clear Pass",
            wgpu::LoadOp::Clear(wgpu::Color {
                r: background.x,
                g: background.y,
                b: background.z,
                a: background.w,
            }),
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw_quad(&mut self, draw: &QuadDraw) -> RenderResult<()> {
        let id = self.bound.ok_or(RenderError::NoTextureBound)?;
        let tex = self
            .textures
            .get(&id)
            .ok_or(RenderError::UnknownTexture(id.0))?;

        let vertex = |i: usize| {
            let clip = draw.model_to_clip * draw.corners[i].extend(1.0);
            QuadVertex {
                position: clip.as_vec4().to_array(),
                tcoord: [draw.tcoords[i][0] as f32, draw.tcoords[i][1] as f32],
                _pad: [0.0; 2],
            }
        };
        let vertices = [0, 1, 2, 0, 2, 3].map(vertex);
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Slice Quad Vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let uniforms = DrawUniforms {
            color: draw.color.as_vec4().to_array(),
            channel_mode: channel_mode(tex.info.format),
            _pad: [0; 3],
        };
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Slice Quad Uniforms"),
                contents: bytemuck::cast_slice(&[uniforms]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let sampler = match draw.filter {
            TextureFilter::Nearest => &self.nearest_sampler,
            TextureFilter::Linear => &self.linear_sampler,
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Slice Quad Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&tex.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Slice Quad Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Slice Quad Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            render_pass.draw(0..6, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self) -> RenderResult<Vec<u8>> {
        let width = self.width.max(1);
        let height = self.height.max(1);
        let bytes_per_row = aligned_bytes_per_row(width);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Slice Readback Buffer"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Slice Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|_| RenderError::BufferMapFailed)?;
        rx.recv()
            .map_err(|_| RenderError::BufferMapFailed)?
            .map_err(|_| RenderError::BufferMapFailed)?;

        // Copy data, removing row padding
        let data = buffer_slice.get_mapped_range();
        let row_bytes = (width * 4) as usize;
        let mut result = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height {
            let start = (row * bytes_per_row) as usize;
            result.extend_from_slice(&data[start..start + row_bytes]);
        }
        drop(data);
        buffer.unmap();
        Ok(result)
    }
}
