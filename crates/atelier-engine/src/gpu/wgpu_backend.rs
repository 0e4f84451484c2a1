use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::device::{Gpu, GpuFrame, GpuInit, SurfaceErrorAction};
use crate::resources::VertexLayout;
use crate::shader::{CompiledStage, LinkedProgram, ProgramReflection, TextureKind, UniformInfo};

use super::{
    BackendError,
    BackendStats,
    BufferId,
    CubeUpload,
    FrameStatus,
    GpuBackend,
    ProgramId,
    Readback,
    TextureFilter,
    TextureId,
    TextureUpload,
    VertexArrayId,
};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = 256;
const MAX_ANISOTROPY: u16 = 16;

struct Program {
    label: String,
    vertex: wgpu::ShaderModule,
    vertex_entry: String,
    fragment: wgpu::ShaderModule,
    fragment_entry: String,
    reflection: ProgramReflection,
    /// CPU copy of every uniform block, keyed by binding.
    blocks: BTreeMap<u32, Vec<u8>>,
    /// Bound textures, keyed by unit.
    textures: BTreeMap<u32, TextureId>,
}

struct Buffer {
    label: String,
    vertices: wgpu::Buffer,
    /// Length of the vertex data in floats.
    len: usize,
    indices: Option<(wgpu::Buffer, u32)>,
}

struct VertexArray {
    program: ProgramId,
    buffer: BufferId,
    /// Floats per vertex.
    stride: u32,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct SamplerKey {
    filter: TextureFilter,
    anisotropy: u16,
}

impl SamplerKey {
    const DEFAULT: Self = Self { filter: TextureFilter::LinearMipNearest, anisotropy: 1 };

    fn new(filter: TextureFilter, anisotropy: u16) -> Self {
        let anisotropy = match filter {
            TextureFilter::Nearest => 1,
            TextureFilter::LinearMipNearest => anisotropy.clamp(1, MAX_ANISOTROPY),
        };
        Self { filter, anisotropy }
    }
}

struct Texture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: SamplerKey,
    cube: bool,
}

/// A draw with the uniform and texture state its program had when it was issued.
struct DrawCommand {
    vertex_array: VertexArrayId,
    blocks: Vec<(u32, Vec<u8>)>,
    textures: BTreeMap<u32, TextureId>,
}

struct OpenFrame {
    frame: GpuFrame,
    clear: wgpu::Color,
    draws: Vec<DrawCommand>,
}

/// Ready-to-encode draw, borrowing from the backend tables.
struct PreparedDraw<'a> {
    pipeline: &'a wgpu::RenderPipeline,
    vertices: &'a wgpu::Buffer,
    indices: Option<&'a wgpu::Buffer>,
    count: u32,
    bind_group: wgpu::BindGroup,
}

/// The windowed backend.
///
/// GLSL programs are lowered to WGSL through naga. A render object is a
/// render pipeline built from its program and its buffer layout. Draws are
/// recorded during the frame and encoded into one render pass (cleared color,
/// depth test, back-face culling, alpha blending) at `end_frame`.
pub struct WgpuBackend {
    gpu: Gpu,
    depth: wgpu::TextureView,
    next_id: u64,

    programs: HashMap<ProgramId, Program>,
    buffers: HashMap<BufferId, Buffer>,
    vertex_arrays: HashMap<VertexArrayId, VertexArray>,
    textures: HashMap<TextureId, Texture>,

    samplers: HashMap<SamplerKey, wgpu::Sampler>,
    fallback_2d: wgpu::TextureView,
    fallback_cube: wgpu::TextureView,

    frame: Option<OpenFrame>,
    readback_request: Option<u8>,
    readback: Option<Readback>,
}

impl WgpuBackend {
    /// Creates the device and surface for `window`.
    pub fn new(window: Arc<Window>, init: GpuInit) -> Result<Self> {
        let gpu = pollster::block_on(Gpu::new(window, init))?;
        let depth = create_depth(gpu.device(), gpu.size());

        let (fallback_2d, fallback_cube) = create_fallbacks(&gpu);

        let mut samplers = HashMap::new();
        samplers.insert(SamplerKey::DEFAULT, create_sampler(gpu.device(), SamplerKey::DEFAULT));

        log::info!("wgpu backend ready, surface format {:?}", gpu.surface_format());

        Ok(Self {
            gpu,
            depth,
            next_id: 0,
            programs: HashMap::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            samplers,
            fallback_2d,
            fallback_cube,
            frame: None,
            readback_request: None,
            readback: None,
        })
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_sampler(&mut self, key: SamplerKey) {
        if !self.samplers.contains_key(&key) {
            let sampler = create_sampler(self.gpu.device(), key);
            self.samplers.insert(key, sampler);
        }
    }

    fn shader_module(&self, label: &str, stage: &CompiledStage) -> Result<(wgpu::ShaderModule, String), BackendError> {
        let rejected = |reason: String| BackendError::Program { label: label.to_string(), reason };

        let entry = stage
            .module
            .entry_points
            .first()
            .map(|ep| ep.name.clone())
            .ok_or_else(|| rejected(format!("{} stage has no entry point", stage.stage)))?;

        let wgsl = naga::back::wgsl::write_string(&stage.module, &stage.info, naga::back::wgsl::WriterFlags::empty())
            .map_err(|e| rejected(format!("{} stage: {e}", stage.stage)))?;

        let module = self.gpu.device().create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        });
        Ok((module, entry))
    }

    fn upload_levels(&self, texture: &wgpu::Texture, layer: u32, level: u32, width: u32, height: u32, rgba: &[u8]) {
        self.gpu.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: level,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
    }

    fn prepare_draw(&self, draw: &DrawCommand) -> Option<PreparedDraw<'_>> {
        let vertex_array = self.vertex_arrays.get(&draw.vertex_array)?;
        let program = self.programs.get(&vertex_array.program)?;
        let buffer = self.buffers.get(&vertex_array.buffer)?;
        let device = self.gpu.device();

        let uniform_buffers: Vec<(u32, wgpu::Buffer)> = draw
            .blocks
            .iter()
            .map(|(binding, bytes)| {
                let ubo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("atelier uniform block"),
                    contents: bytes,
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                (*binding, ubo)
            })
            .collect();

        let reflection = &program.reflection;
        let bound = |unit: u32| draw.textures.get(&unit).and_then(|id| self.textures.get(id));

        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = Vec::new();
        for (binding, ubo) in &uniform_buffers {
            entries.push(wgpu::BindGroupEntry { binding: *binding, resource: ubo.as_entire_binding() });
        }
        for slot in reflection.textures() {
            let view = match (bound(slot.unit), slot.kind) {
                (Some(t), TextureKind::Cube) if t.cube => &t.view,
                (Some(t), TextureKind::D2) if !t.cube => &t.view,
                (_, TextureKind::Cube) => &self.fallback_cube,
                (_, TextureKind::D2) => &self.fallback_2d,
            };
            entries.push(wgpu::BindGroupEntry { binding: slot.unit, resource: wgpu::BindingResource::TextureView(view) });
        }
        for slot in reflection.samplers() {
            // A sampler follows the texture declared just before it.
            let paired = slot
                .binding
                .checked_sub(1)
                .and_then(|unit| reflection.texture_at(unit))
                .or_else(|| reflection.textures().first());
            let key = paired.and_then(|t| bound(t.unit)).map(|t| t.sampler).unwrap_or(SamplerKey::DEFAULT);
            let sampler = self.samplers.get(&key).or_else(|| self.samplers.get(&SamplerKey::DEFAULT))?;
            entries.push(wgpu::BindGroupEntry { binding: slot.binding, resource: wgpu::BindingResource::Sampler(sampler) });
        }

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.label.as_str()),
            layout: &vertex_array.bind_group_layout,
            entries: &entries,
        });

        let count = match &buffer.indices {
            Some((_, count)) => *count,
            None => (buffer.len / vertex_array.stride.max(1) as usize) as u32,
        };

        Some(PreparedDraw {
            pipeline: &vertex_array.pipeline,
            vertices: &buffer.vertices,
            indices: buffer.indices.as_ref().map(|(b, _)| b),
            count,
            bind_group,
        })
    }

    /// Copies the surface into a mappable buffer. Returns the buffer and its padded row size.
    fn encode_readback(&self, encoder: &mut wgpu::CommandEncoder, frame: &GpuFrame) -> Option<(wgpu::Buffer, u32)> {
        let size = self.gpu.size();
        let unpadded = size.width * 4;
        let padded = unpadded.div_ceil(COPY_BYTES_PER_ROW_ALIGNMENT) * COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("atelier readback"),
            size: u64::from(padded) * u64::from(size.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &frame.surface_texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d { width: size.width, height: size.height, depth_or_array_layers: 1 },
        );
        Some((staging, padded))
    }

    fn finish_readback(&self, staging: &wgpu::Buffer, padded: u32, components: u8) -> Result<Readback, BackendError> {
        let size = self.gpu.size();
        let bgra = match self.gpu.surface_format() {
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
            other => return Err(BackendError::Readback(format!("unsupported surface format {other:?}"))),
        };

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.gpu
            .device()
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| BackendError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| BackendError::Readback(e.to_string()))?
            .map_err(|e| BackendError::Readback(e.to_string()))?;

        let pixels = {
            let data = slice.get_mapped_range();
            pack_rows(&data, size.width, size.height, padded, components, bgra)
        };
        staging.unmap();

        Ok(Readback { width: size.width, height: size.height, components, pixels })
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    // ── programs ──────────────────────────────────────────────────────────

    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId, BackendError> {
        let (vertex, vertex_entry) = self.shader_module(&program.label, &program.vertex)?;
        let (fragment, fragment_entry) = self.shader_module(&program.label, &program.fragment)?;

        let blocks = program
            .reflection
            .blocks()
            .iter()
            .map(|b| (b.binding, vec![0u8; b.size.max(16).next_multiple_of(16) as usize]))
            .collect();

        let id = ProgramId(self.next());
        self.programs.insert(
            id,
            Program {
                label: program.label.clone(),
                vertex,
                vertex_entry,
                fragment,
                fragment_entry,
                reflection: program.reflection.clone(),
                blocks,
                textures: BTreeMap::new(),
            },
        );
        log::debug!("created {id} for `{}`", program.label);
        Ok(id)
    }

    fn delete_program(&mut self, id: ProgramId) {
        if self.programs.remove(&id).is_none() {
            log::warn!("delete of unknown {id}");
        }
    }

    fn write_uniform(&mut self, program: ProgramId, uniform: &UniformInfo, bytes: &[u8]) {
        let Some(block) = self.programs.get_mut(&program).and_then(|p| p.blocks.get_mut(&uniform.binding)) else {
            log::debug!("uniform write to dead {program}");
            return;
        };
        let start = uniform.offset as usize;
        let Some(dst) = block.get_mut(start..start + bytes.len()) else {
            log::warn!("uniform `{}` write of {} bytes overflows its block", uniform.name, bytes.len());
            return;
        };
        dst.copy_from_slice(bytes);
    }

    fn bind_texture(&mut self, program: ProgramId, unit: u32, texture: TextureId) {
        match self.programs.get_mut(&program) {
            Some(p) => {
                p.textures.insert(unit, texture);
            }
            None => log::debug!("texture bind on dead {program}"),
        }
    }

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(
        &mut self,
        label: &str,
        vertices: &[f32],
        indices: Option<&[u32]>,
        dynamic: bool,
    ) -> Result<BufferId, BackendError> {
        let device = self.gpu.device();
        let mut usage = wgpu::BufferUsages::VERTEX;
        if dynamic {
            usage |= wgpu::BufferUsages::COPY_DST;
        }
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage,
        });
        let index_buffer = indices.map(|indices| {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            (buffer, indices.len() as u32)
        });

        let id = BufferId(self.next());
        self.buffers.insert(
            id,
            Buffer { label: label.to_string(), vertices: vertex_buffer, len: vertices.len(), indices: index_buffer },
        );
        Ok(id)
    }

    fn update_buffer(&mut self, id: BufferId, vertices: &[f32]) -> Result<(), BackendError> {
        let buffer = self.buffers.get_mut(&id).ok_or_else(|| BackendError::StaleHandle(id.to_string()))?;
        let bytes: &[u8] = bytemuck::cast_slice(vertices);

        let fits = buffer.vertices.usage().contains(wgpu::BufferUsages::COPY_DST)
            && bytes.len() as u64 <= buffer.vertices.size();
        if fits {
            self.gpu.queue().write_buffer(&buffer.vertices, 0, bytes);
        } else {
            buffer.vertices = self.gpu.device().create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(buffer.label.as_str()),
                contents: bytes,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
        }
        buffer.len = vertices.len();
        Ok(())
    }

    fn delete_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(&id).is_none() {
            log::warn!("delete of unknown {id}");
        }
    }

    // ── render objects ────────────────────────────────────────────────────

    fn create_vertex_array(
        &mut self,
        label: &str,
        program: ProgramId,
        buffer: BufferId,
        layout: &VertexLayout,
    ) -> Result<VertexArrayId, BackendError> {
        let p = self.programs.get(&program).ok_or_else(|| BackendError::StaleHandle(program.to_string()))?;
        if !self.buffers.contains_key(&buffer) {
            return Err(BackendError::StaleHandle(buffer.to_string()));
        }

        let bindings = layout
            .bind_locations(&p.reflection)
            .map_err(|reason| BackendError::VertexArray { label: label.to_string(), reason })?;
        let attributes: Vec<wgpu::VertexAttribute> = bindings
            .iter()
            .map(|b| wgpu::VertexAttribute {
                format: vertex_format(b.components),
                offset: b.byte_offset,
                shader_location: b.location,
            })
            .collect();

        let device = self.gpu.device();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &layout_entries(&p.reflection),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &p.vertex,
                entry_point: Some(p.vertex_entry.as_str()),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: layout.stride_bytes(),
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &p.fragment,
                entry_point: Some(p.fragment_entry.as_str()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.gpu.surface_format(),
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let id = VertexArrayId(self.next());
        self.vertex_arrays.insert(
            id,
            VertexArray { program, buffer, stride: layout.stride(), pipeline, bind_group_layout },
        );
        Ok(id)
    }

    fn delete_vertex_array(&mut self, id: VertexArrayId) {
        if self.vertex_arrays.remove(&id).is_none() {
            log::warn!("delete of unknown {id}");
        }
    }

    fn draw(&mut self, id: VertexArrayId) {
        let Some(frame) = self.frame.as_mut() else {
            log::debug!("draw of {id} outside a frame dropped");
            return;
        };
        let Some(program) = self.vertex_arrays.get(&id).and_then(|va| self.programs.get(&va.program)) else {
            log::warn!("draw of dead {id}");
            return;
        };
        frame.draws.push(DrawCommand {
            vertex_array: id,
            blocks: program.blocks.iter().map(|(b, bytes)| (*b, bytes.clone())).collect(),
            textures: program.textures.clone(),
        });
    }

    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> Result<TextureId, BackendError> {
        let base = upload.levels.first().ok_or_else(|| BackendError::Texture {
            label: upload.label.to_string(),
            reason: "no mip levels".to_string(),
        })?;

        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(upload.label),
            size: wgpu::Extent3d { width: base.width, height: base.height, depth_or_array_layers: 1 },
            mip_level_count: upload.levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for (level, mip) in upload.levels.iter().enumerate() {
            self.upload_levels(&texture, 0, level as u32, mip.width, mip.height, &mip.rgba);
        }

        let sampler = SamplerKey::new(upload.filter, upload.anisotropy);
        self.ensure_sampler(sampler);

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.next());
        self.textures.insert(id, Texture { _texture: texture, view, sampler, cube: false });
        Ok(id)
    }

    fn create_cube_texture(&mut self, upload: &CubeUpload<'_>) -> Result<TextureId, BackendError> {
        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(upload.label),
            size: wgpu::Extent3d { width: upload.size, height: upload.size, depth_or_array_layers: 6 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for (layer, face) in upload.faces.iter().enumerate() {
            self.upload_levels(&texture, layer as u32, 0, upload.size, upload.size, face);
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(upload.label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        let id = TextureId(self.next());
        self.textures.insert(id, Texture { _texture: texture, view, sampler: SamplerKey::DEFAULT, cube: true });
        Ok(id)
    }

    fn delete_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_none() {
            log::warn!("delete of unknown {id}");
        }
    }

    // ── frame ─────────────────────────────────────────────────────────────

    fn begin_frame(&mut self, clear: [f64; 4]) -> Result<FrameStatus, BackendError> {
        if self.frame.is_some() {
            log::warn!("begin_frame while a frame is open; previous draws discarded");
            self.frame = None;
        }
        let size = self.gpu.size();
        if size.width == 0 || size.height == 0 {
            return Ok(FrameStatus::Skipped);
        }

        let frame = match self.gpu.acquire() {
            Ok(frame) => frame,
            Err(err) => {
                log::debug!("surface acquire failed: {err}");
                return match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => Err(BackendError::Surface("out of memory".to_string())),
                    SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => Ok(FrameStatus::Skipped),
                };
            }
        };

        let [r, g, b, a] = clear;
        self.frame = Some(OpenFrame { frame, clear: wgpu::Color { r, g, b, a }, draws: Vec::new() });
        Ok(FrameStatus::Ready)
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let Some(open) = self.frame.take() else {
            return Ok(());
        };

        let prepared: Vec<PreparedDraw<'_>> = open.draws.iter().filter_map(|d| self.prepare_draw(d)).collect();
        if prepared.len() != open.draws.len() {
            log::debug!("{} draws referenced released resources", open.draws.len() - prepared.len());
        }

        let mut encoder = self.gpu.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("atelier frame encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("atelier scene"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &open.frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(open.clear), store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth,
                    depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: wgpu::StoreOp::Store }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for draw in &prepared {
                pass.set_pipeline(draw.pipeline);
                pass.set_bind_group(0, &draw.bind_group, &[]);
                pass.set_vertex_buffer(0, draw.vertices.slice(..));
                match draw.indices {
                    Some(indices) => {
                        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..draw.count, 0, 0..1);
                    }
                    None => pass.draw(0..draw.count, 0..1),
                }
            }
        }
        drop(prepared);

        let readback = self
            .readback_request
            .take()
            .and_then(|components| Some((self.encode_readback(&mut encoder, &open.frame)?, components)));

        self.gpu.submit(open.frame, encoder.finish());

        if let Some(((staging, padded), components)) = readback {
            self.readback = Some(self.finish_readback(&staging, padded, components)?);
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.gpu.resize(PhysicalSize::new(width, height)) {
            self.depth = create_depth(self.gpu.device(), self.gpu.size());
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        let size = self.gpu.size();
        (size.width, size.height)
    }

    fn request_readback(&mut self, components: u8) {
        if !self.gpu.supports_readback() {
            log::warn!("readback requested but the surface cannot be copied");
            return;
        }
        self.readback_request = Some(components.clamp(3, 4));
    }

    fn take_readback(&mut self) -> Option<Readback> {
        self.readback.take()
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            programs: self.programs.len(),
            buffers: self.buffers.len(),
            vertex_arrays: self.vertex_arrays.len(),
            textures: self.textures.len(),
        }
    }
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

fn layout_entries(reflection: &ProgramReflection) -> Vec<wgpu::BindGroupLayoutEntry> {
    let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;
    let blocks = reflection.blocks().iter().map(|b| wgpu::BindGroupLayoutEntry {
        binding: b.binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });
    let textures = reflection.textures().iter().map(|t| wgpu::BindGroupLayoutEntry {
        binding: t.unit,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: match t.kind {
                TextureKind::D2 => wgpu::TextureViewDimension::D2,
                TextureKind::Cube => wgpu::TextureViewDimension::Cube,
            },
            multisampled: false,
        },
        count: None,
    });
    let samplers = reflection.samplers().iter().map(|s| wgpu::BindGroupLayoutEntry {
        binding: s.binding,
        visibility,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });
    blocks.chain(textures).chain(samplers).collect()
}

fn create_sampler(device: &wgpu::Device, key: SamplerKey) -> wgpu::Sampler {
    let (filter, mipmap_filter) = match key.filter {
        TextureFilter::Nearest => (wgpu::FilterMode::Nearest, wgpu::MipmapFilterMode::Nearest),
        // Anisotropic sampling requires linear filtering on every axis.
        TextureFilter::LinearMipNearest if key.anisotropy > 1 => {
            (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Linear)
        }
        TextureFilter::LinearMipNearest => (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Nearest),
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("atelier sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter,
        anisotropy_clamp: key.anisotropy,
        ..Default::default()
    })
}

fn create_depth(device: &wgpu::Device, size: PhysicalSize<u32>) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("atelier depth"),
        size: wgpu::Extent3d { width: size.width.max(1), height: size.height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

/// Opaque black 1x1 textures sampled by units with nothing bound.
fn create_fallbacks(gpu: &Gpu) -> (wgpu::TextureView, wgpu::TextureView) {
    let make = |layers: u32, dimension: wgpu::TextureViewDimension| {
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("atelier fallback texture"),
            size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: layers },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for layer in 0..layers {
            gpu.queue().write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                    aspect: wgpu::TextureAspect::All,
                },
                &[0, 0, 0, 255],
                wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4), rows_per_image: Some(1) },
                wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
            );
        }
        texture.create_view(&wgpu::TextureViewDescriptor { dimension: Some(dimension), ..Default::default() })
    };
    (make(1, wgpu::TextureViewDimension::D2), make(6, wgpu::TextureViewDimension::Cube))
}

/// Strips row padding, converts to RGB(A) and reorders rows bottom-up.
fn pack_rows(data: &[u8], width: u32, height: u32, padded: u32, components: u8, bgra: bool) -> Vec<u8> {
    let components = components as usize;
    let mut out = Vec::with_capacity(width as usize * height as usize * components);
    for row in (0..height as usize).rev() {
        let start = row * padded as usize;
        let line = &data[start..start + width as usize * 4];
        for px in line.chunks_exact(4) {
            let (r, b) = if bgra { (px[2], px[0]) } else { (px[0], px[2]) };
            out.extend_from_slice(&[r, px[1], b, px[3]][..components]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_rows_flips_and_swizzles() {
        // 1x2 BGRA surface, 256-byte padded rows: top row blue, bottom row red.
        let mut data = vec![0u8; 512];
        data[..4].copy_from_slice(&[255, 0, 0, 255]);
        data[256..260].copy_from_slice(&[0, 0, 255, 255]);

        let rgba = pack_rows(&data, 1, 2, 256, 4, true);
        assert_eq!(rgba, vec![255, 0, 0, 255, 0, 0, 255, 255]);

        let rgb = pack_rows(&data, 1, 2, 256, 3, true);
        assert_eq!(rgb, vec![255, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn sampler_key_clamps_anisotropy() {
        assert_eq!(SamplerKey::new(TextureFilter::LinearMipNearest, 64).anisotropy, 16);
        assert_eq!(SamplerKey::new(TextureFilter::LinearMipNearest, 0).anisotropy, 1);
        assert_eq!(SamplerKey::new(TextureFilter::Nearest, 16).anisotropy, 1);
    }

    #[test]
    fn vertex_formats_follow_component_count() {
        assert_eq!(vertex_format(1), wgpu::VertexFormat::Float32);
        assert_eq!(vertex_format(3), wgpu::VertexFormat::Float32x3);
        assert_eq!(vertex_format(4), wgpu::VertexFormat::Float32x4);
    }
}
