//! wgpu implementation of the drawing contract.
//!
//! Each draw is recorded into its own encoder and submitted immediately, so
//! one uniform buffer can be rewritten between passes. Screen draws go to the
//! surface texture acquired on the first screen draw of a frame; `present`
//! hands it back to the compositor.

use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use winit::window::Window;

use crate::backend::{
    Blend, DrawCall, Filter, GraphicsBackend, Program, ProgramKind, RenderTarget, TexelType, TextureDesc,
    TextureFormat, TextureId,
};
use crate::context::{ApiLevel, ContextProvider};
use crate::error::{FluidError, FluidResult};

const SHADER_SOURCE: &str = include_str!("../shaders/fluid.wgsl");

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PassUniforms {
    texel: [f32; 4],
    point: [f32; 4],
    color: [f32; 4],
    params: [f32; 4],
    curve: [f32; 4],
    flags: [u32; 4],
    mode: [u32; 4],
}

impl PassUniforms {
    fn for_program(program: &Program, flip_y: bool) -> Self {
        let mut u = Self::zeroed();
        u.flags[3] = flip_y as u32;
        match *program {
            Program::Copy { .. } | Program::SunraysMask { .. } => {}
            Program::Clear { value, .. } => u.params[2] = value,
            Program::Color { color } => u.color = color,
            Program::Checkerboard { aspect_ratio } => u.point[2] = aspect_ratio,
            Program::Splat {
                aspect_ratio,
                point,
                color,
                radius,
                ..
            } => {
                u.point = [point[0], point[1], aspect_ratio, radius];
                u.color = [color[0], color[1], color[2], 0.0];
            }
            Program::Curl { texel_size, .. }
            | Program::Divergence { texel_size, .. }
            | Program::Pressure { texel_size, .. }
            | Program::GradientSubtract { texel_size, .. }
            | Program::BloomBlur { texel_size, .. }
            | Program::Blur { texel_size, .. } => u.set_texel(texel_size),
            Program::Vorticity {
                texel_size,
                curl_strength,
                dt,
                ..
            } => {
                u.set_texel(texel_size);
                u.params[0] = dt;
                u.params[2] = curl_strength;
            }
            Program::Advection {
                texel_size,
                source_texel_size,
                dt,
                dissipation,
                ..
            } => {
                let source = source_texel_size.unwrap_or(texel_size);
                u.texel = [texel_size[0], texel_size[1], source[0], source[1]];
                u.params[0] = dt;
                u.params[1] = dissipation;
                u.mode[0] = source_texel_size.is_some() as u32;
            }
            Program::BloomPrefilter { curve, threshold, .. } => {
                u.curve = [curve[0], curve[1], curve[2], 0.0];
                u.params[3] = threshold;
            }
            Program::BloomFinal {
                texel_size, intensity, ..
            } => {
                u.set_texel(texel_size);
                u.params[2] = intensity;
            }
            Program::Sunrays { weight, .. } => u.params[2] = weight,
            Program::Display {
                bloom,
                sunrays,
                shading,
                texel_size,
                ..
            } => {
                u.set_texel(texel_size);
                u.flags[0] = shading as u32;
                u.flags[1] = bloom.is_some() as u32;
                u.flags[2] = sunrays.is_some() as u32;
            }
        }
        u
    }

    fn set_texel(&mut self, texel_size: [f32; 2]) {
        self.texel = [texel_size[0], texel_size[1], texel_size[0], texel_size[1]];
    }
}

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn blend_state(blend: Blend) -> wgpu::BlendState {
    match blend {
        Blend::Replace => wgpu::BlendState::REPLACE,
        Blend::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            wgpu::BlendState { color: add, alpha: add }
        }
        Blend::PremultipliedOver => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
    }
}

/// Decodes one row-aligned readback buffer into RGBA texels.
fn decode_texels(data: &[u8], format: TextureFormat, width: u32, height: u32, padded_row: u32) -> Vec<[f32; 4]> {
    let bytes_per_texel = format.bytes_per_texel() as usize;
    let f16_at = |bytes: &[u8], i: usize| half::f16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]).to_f32();
    let mut texels = Vec::with_capacity((width * height) as usize);
    for row in 0..height as usize {
        let row_start = row * padded_row as usize;
        for col in 0..width as usize {
            let start = row_start + col * bytes_per_texel;
            let texel = &data[start..start + bytes_per_texel];
            texels.push(match format {
                TextureFormat::Rgba16Float => [f16_at(texel, 0), f16_at(texel, 1), f16_at(texel, 2), f16_at(texel, 3)],
                TextureFormat::Rg16Float => [f16_at(texel, 0), f16_at(texel, 1), 0.0, 1.0],
                TextureFormat::R16Float => [f16_at(texel, 0), 0.0, 0.0, 1.0],
                TextureFormat::Rgba8Unorm => [
                    texel[0] as f32 / 255.0,
                    texel[1] as f32 / 255.0,
                    texel[2] as f32 / 255.0,
                    texel[3] as f32 / 255.0,
                ],
            });
        }
    }
    texels
}

fn padded_bytes_per_row(width: u32, format: TextureFormat) -> u32 {
    let unpadded = width * format.bytes_per_texel();
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Opens wgpu contexts on a window, native API first, then GL.
pub struct WgpuHost {
    window: Arc<Window>,
}

impl WgpuHost {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window }
    }
}

impl ContextProvider for WgpuHost {
    type Backend = WgpuBackend;

    fn create_context(&mut self, level: ApiLevel) -> Option<WgpuBackend> {
        let (backends, required_limits) = match level {
            ApiLevel::Primary => (wgpu::Backends::PRIMARY, wgpu::Limits::default()),
            ApiLevel::Fallback => (wgpu::Backends::GL, wgpu::Limits::downlevel_webgl2_defaults()),
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface = match instance.create_surface(self.window.clone()) {
            Ok(surface) => surface,
            Err(err) => {
                log::warn!("{level:?}: cannot create surface: {err}");
                return None;
            }
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;
        let info = adapter.get_info();

        let (device, queue) = match pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Fluid Device"),
                required_features: wgpu::Features::empty(),
                required_limits: required_limits.using_resolution(adapter.limits()),
                memory_hints: Default::default(),
            },
            None,
        )) {
            Ok(pair) => pair,
            Err(err) => {
                log::warn!("{level:?}: device request on {} failed: {err}", info.name);
                return None;
            }
        };
        device.on_uncaptured_error(Box::new(|err| log::error!("wgpu error: {err}")));

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = surface_caps.formats.first() else {
            log::warn!("{level:?}: surface reports no formats on {}", info.name);
            return None;
        };
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or(first_format);
        let size = self.window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let api = format!("{:?} ({})", info.backend, info.name);
        Some(WgpuBackend::new(api, adapter, device, queue, surface, surface_config))
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: TextureFormat,
    filter: Filter,
}

type PipelineKey = (ProgramKind, wgpu::TextureFormat, Blend);

pub struct WgpuBackend {
    api: String,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    frame: Option<wgpu::SurfaceTexture>,
    shader: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    uniform_buffer: wgpu::Buffer,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    placeholder: wgpu::TextureView,
    textures: HashMap<TextureId, GpuTexture>,
    next_id: u32,
    linear_filtering: bool,
    viewport: (u32, u32),
}

impl WgpuBackend {
    fn new(
        api: String,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: wgpu::Surface<'static>,
        surface_config: wgpu::SurfaceConfiguration,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fluid Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fluid Pass Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                sampler_entry(2),
                texture_entry(3),
                sampler_entry(4),
                texture_entry(5),
                sampler_entry(6),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Fluid Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Fluid Pass Uniforms"),
            size: std::mem::size_of::<PassUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = |filter: wgpu::FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let linear_sampler = sampler(wgpu::FilterMode::Linear);
        let nearest_sampler = sampler(wgpu::FilterMode::Nearest);

        let placeholder = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Unbound Slot"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba16Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        let linear_filtering = adapter
            .get_texture_format_features(wgpu::TextureFormat::Rgba16Float)
            .flags
            .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE);
        let viewport = (surface_config.width, surface_config.height);

        Self {
            api,
            adapter,
            device,
            queue,
            surface,
            surface_config,
            frame: None,
            shader,
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            uniform_buffer,
            linear_sampler,
            nearest_sampler,
            placeholder,
            textures: HashMap::new(),
            next_id: 1,
            linear_filtering,
            viewport,
        }
    }

    /// Reconfigures the surface after the window changed size.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.frame = None;
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let (kind, format, blend) = key;
        log::debug!("Building {kind:?} pipeline for {format:?} with {blend:?} blending");
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(kind.entry_point()),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: kind.entry_point(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(blend_state(blend)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        self.pipelines.insert(key, pipeline);
    }

    fn acquire_frame(&mut self) -> FluidResult<bool> {
        if self.frame.is_some() {
            return Ok(false);
        }
        match self.surface.get_current_texture() {
            Ok(frame) => {
                self.frame = Some(frame);
                Ok(true)
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                Err(FluidError::SurfaceLost)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(FluidError::Backend("surface out of memory".into())),
            Err(err) => Err(FluidError::Backend(format!("surface: {err}"))),
        }
    }

    fn sampler_for(&self, texture: &GpuTexture) -> &wgpu::Sampler {
        if texture.filter == Filter::Linear && self.linear_filtering {
            &self.linear_sampler
        } else {
            &self.nearest_sampler
        }
    }

    fn texture(&self, id: TextureId) -> FluidResult<&GpuTexture> {
        self.textures
            .get(&id)
            .ok_or_else(|| FluidError::Backend(format!("unknown texture {id:?}")))
    }
}

impl GraphicsBackend for WgpuBackend {
    fn api_name(&self) -> &str {
        &self.api
    }

    fn supports_linear_filtering(&self) -> bool {
        self.linear_filtering
    }

    fn half_float_type(&self) -> TexelType {
        TexelType::HalfFloat
    }

    fn probe_render_target(&mut self, format: TextureFormat) -> bool {
        let features = self.adapter.get_texture_format_features(wgpu_format(format));
        let needed = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        if !features.allowed_usages.contains(needed) {
            return false;
        }
        let desc = TextureDesc {
            label: "format probe".into(),
            width: 4,
            height: 4,
            format,
            filter: Filter::Nearest,
        };
        match self.create_texture(&desc) {
            Ok(id) => {
                self.destroy_texture(id);
                true
            }
            Err(_) => false,
        }
    }

    fn drawing_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> FluidResult<TextureId> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(FluidError::allocation(
                &desc.label,
                desc.width,
                desc.height,
                format!("size outside 1..={max}"),
            ));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label.as_str()),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(desc.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(FluidError::allocation(&desc.label, desc.width, desc.height, err.to_string()));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                width: desc.width,
                height: desc.height,
                format: desc.format,
                filter: desc.filter,
            },
        );
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if let Some(texture) = self.textures.remove(&id) {
            texture.texture.destroy();
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn draw(&mut self, call: &DrawCall) -> FluidResult<()> {
        let (format, size, flip_y, clear) = match call.target {
            RenderTarget::Screen => {
                let fresh = self.acquire_frame()?;
                (
                    self.surface_config.format,
                    (self.surface_config.width, self.surface_config.height),
                    true,
                    fresh,
                )
            }
            RenderTarget::Texture(id) => {
                if call.program.reads(id) {
                    return Err(FluidError::Backend(format!(
                        "{:?} pass reads and writes {id:?}",
                        call.program.kind()
                    )));
                }
                let target = self.texture(id)?;
                (wgpu_format(target.format), (target.width, target.height), false, false)
            }
        };

        let key = (call.program.kind(), format, call.blend);
        self.ensure_pipeline(key);

        let uniforms = PassUniforms::for_program(&call.program, flip_y);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let mut slots = Vec::with_capacity(3);
        for input in call.program.inputs() {
            slots.push(match input {
                Some(id) => {
                    let texture = self.texture(id)?;
                    (&texture.view, self.sampler_for(texture))
                }
                None => (&self.placeholder, &self.nearest_sampler),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Fluid Pass Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(slots[0].0),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(slots[0].1),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(slots[1].0),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(slots[1].1),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(slots[2].0),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::Sampler(slots[2].1),
                },
            ],
        });

        let screen_view;
        let view = match call.target {
            RenderTarget::Screen => {
                let frame = self
                    .frame
                    .as_ref()
                    .ok_or_else(|| FluidError::Backend("no surface texture acquired".into()))?;
                screen_view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
                &screen_view
            }
            RenderTarget::Texture(id) => &self.texture(id)?.view,
        };
        let pipeline = self
            .pipelines
            .get(&key)
            .ok_or_else(|| FluidError::Backend(format!("missing pipeline for {:?}", key.0)))?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(key.0.entry_point()),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(key.0.entry_point()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: if clear {
                            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.viewport = size;
        Ok(())
    }

    fn read_pixels(&mut self, id: TextureId) -> FluidResult<Vec<[f32; 4]>> {
        let texture = self.texture(id)?;
        let (width, height, format) = (texture.width, texture.height, texture.format);
        let padded_row = padded_bytes_per_row(width, format);

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
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

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).ok();
        });
        self.device.poll(wgpu::Maintain::Wait);
        match pollster::block_on(receiver.receive()) {
            Some(Ok(())) => {}
            Some(Err(err)) => return Err(FluidError::Backend(format!("readback map failed: {err}"))),
            None => return Err(FluidError::Backend("readback channel closed".into())),
        }

        let data = buffer_slice.get_mapped_range();
        let texels = decode_texels(&data, format, width, height, padded_row);
        drop(data);
        staging_buffer.unmap();
        Ok(texels)
    }

    fn present(&mut self) -> FluidResult<()> {
        if let Some(frame) = self.frame.take() {
            frame.present();
        }
        Ok(())
    }
}
