//! `GraphicsContext` on top of wgpu.
//!
//! GL-style calls mutate a tracked `DeviceState`; every draw snapshots that
//! state into a pipeline key, a uniform block and a texture binding set.
//! `submit` turns the frame's draws into render passes, one per bound
//! target, and hands them to the queue.

use std::collections::{HashMap, HashSet};
use std::mem;

use glam::{UVec2, Vec4};
use wgpu::util::DeviceExt;

use crate::renderer::context::{
    BlendEquation, BlendFactor, Capability, ClearFlags, CompareFunction, Face, FramebufferId,
    GraphicsContext, GraphicsError, GraphicsResult, MeshId, ProgramDescriptor, ProgramId,
    SamplerDescriptor, SamplerId, TextureDescriptor, TextureFormat, TextureId, UniformName,
    UniformValue, VertexArrayId, Viewport, Winding, MAX_TEXTURE_UNITS,
};
use crate::renderer::depth::Depth;
use crate::renderer::internal::buffers::DynamicUniformBuffer;
use crate::renderer::internal::pipeline::{
    address_mode, filter_mode, GeometryKind, PipelineCache, PipelineKey, ProgramModules,
};
use crate::renderer::recording::DeviceState;
use crate::renderer::uniforms::DrawUniforms;
use crate::renderer::Vertex;

const UNIT_COUNT: usize = MAX_TEXTURE_UNITS as usize;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: TextureFormat,
    size: UVec2,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

#[derive(Debug, Clone, Copy)]
struct Framebuffer {
    color: TextureId,
    depth: TextureId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TextureBindings {
    textures: [Option<TextureId>; UNIT_COUNT],
    samplers: [Option<SamplerId>; UNIT_COUNT],
}

#[derive(Debug, Clone, Copy)]
enum PendingGeometry {
    Indexed(MeshId),
    Procedural(u32),
}

#[derive(Debug, Clone, Copy)]
struct PendingDraw {
    key: PipelineKey,
    uniform_offset: u32,
    bindings: TextureBindings,
    geometry: PendingGeometry,
    viewport: Option<Viewport>,
    blend_constant: Vec4,
}

/// Draws sharing one target, with the loads implied by preceding clears.
#[derive(Debug)]
struct PendingPass {
    target: Option<FramebufferId>,
    clear_color: Option<wgpu::Color>,
    clear_depth: Option<f32>,
    draws: Vec<PendingDraw>,
}

impl PendingPass {
    fn new(target: Option<FramebufferId>) -> Self {
        Self {
            target,
            clear_color: None,
            clear_depth: None,
            draws: Vec::new(),
        }
    }
}

pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    size: UVec2,
    depth: Depth,

    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniforms: DynamicUniformBuffer,
    pipelines: PipelineCache,
    fallback_view: wgpu::TextureView,
    fallback_sampler: wgpu::Sampler,

    programs: HashMap<ProgramId, ProgramModules>,
    textures: HashMap<TextureId, GpuTexture>,
    samplers: HashMap<SamplerId, wgpu::Sampler>,
    meshes: HashMap<MeshId, GpuMesh>,
    framebuffers: HashMap<FramebufferId, Framebuffer>,
    vertex_arrays: HashSet<VertexArrayId>,
    next_id: u32,

    state: DeviceState,
    program_uniforms: HashMap<ProgramId, DrawUniforms>,
    frame: Vec<PendingPass>,
}

impl WgpuContext {
    /// `surface_format` is the format of the views later passed to
    /// [`WgpuContext::submit`]; `size` is their extent.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        size: UVec2,
    ) -> Self {
        let uniforms = DynamicUniformBuffer::new(&device);
        let texture_layout = create_texture_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ForwardPipelineLayout"),
            bind_group_layouts: &[&uniforms.bind_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let fallback = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("FallbackTexture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let fallback_view = fallback.create_view(&wgpu::TextureViewDescriptor::default());
        let fallback_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("FallbackSampler"),
            ..Default::default()
        });

        let depth = Depth::new(&device, size);
        log::info!(
            "Graphics context ready: {:?} at {}x{}",
            surface_format,
            size.x,
            size.y
        );

        Self {
            device,
            queue,
            surface_format,
            size,
            depth,
            texture_layout,
            pipeline_layout,
            uniforms,
            pipelines: PipelineCache::default(),
            fallback_view,
            fallback_sampler,
            programs: HashMap::new(),
            textures: HashMap::new(),
            samplers: HashMap::new(),
            meshes: HashMap::new(),
            framebuffers: HashMap::new(),
            vertex_arrays: HashSet::new(),
            next_id: 0,
            state: DeviceState::default(),
            program_uniforms: HashMap::new(),
            frame: Vec::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Encodes and submits everything recorded since the last submit.
    /// Unbound-target passes render into `target`.
    pub fn submit(&mut self, target: &wgpu::TextureView) {
        let frame = mem::take(&mut self.frame);
        self.uniforms.flush(&self.device, &self.queue);

        for draw in frame.iter().flat_map(|pass| pass.draws.iter()) {
            if let Some(program) = self.programs.get(&draw.key.program) {
                self.pipelines
                    .prepare(&self.device, &self.pipeline_layout, program, draw.key);
            }
        }

        let mut bind_groups: Vec<wgpu::BindGroup> = Vec::new();
        let mut group_index: HashMap<TextureBindings, usize> = HashMap::new();
        for draw in frame.iter().flat_map(|pass| pass.draws.iter()) {
            if !group_index.contains_key(&draw.bindings) {
                group_index.insert(draw.bindings, bind_groups.len());
                bind_groups.push(self.texture_bind_group(&draw.bindings));
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("FrameEncoder"),
            });

        let mut draw_count = 0usize;
        for pass in &frame {
            let (color_view, depth_view, target_size) = match pass.target {
                None => (target, &self.depth.view, self.size),
                Some(framebuffer) => match self.framebuffer_views(framebuffer) {
                    Some(views) => views,
                    None => {
                        log::warn!("Skipping pass for deleted framebuffer {:?}", framebuffer);
                        continue;
                    }
                },
            };

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(if pass.target.is_some() {
                    "OffscreenPass"
                } else {
                    "PresentPass"
                }),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: pass
                            .clear_color
                            .map(wgpu::LoadOp::Clear)
                            .unwrap_or(wgpu::LoadOp::Load),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: pass
                            .clear_depth
                            .map(wgpu::LoadOp::Clear)
                            .unwrap_or(wgpu::LoadOp::Load),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &pass.draws {
                let Some(pipeline) = self.pipelines.get(&draw.key) else {
                    continue;
                };
                let Some(&group) = group_index.get(&draw.bindings) else {
                    continue;
                };

                rpass.set_pipeline(pipeline);
                if let Some(viewport) = draw.viewport {
                    let (x, y, w, h) = clamp_viewport(viewport, target_size);
                    rpass.set_viewport(x, y, w, h, 0.0, 1.0);
                }
                if draw.key.uses_blend_constant() {
                    let c = draw.blend_constant.as_dvec4();
                    rpass.set_blend_constant(wgpu::Color {
                        r: c.x,
                        g: c.y,
                        b: c.z,
                        a: c.w,
                    });
                }
                rpass.set_bind_group(0, &self.uniforms.bind_group, &[draw.uniform_offset]);
                rpass.set_bind_group(1, &bind_groups[group], &[]);

                match draw.geometry {
                    PendingGeometry::Indexed(mesh) => {
                        let Some(mesh) = self.meshes.get(&mesh) else {
                            continue;
                        };
                        rpass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                        rpass.set_index_buffer(
                            mesh.index_buffer.slice(..),
                            wgpu::IndexFormat::Uint32,
                        );
                        rpass.draw_indexed(0..mesh.index_count, 0, 0..1);
                    }
                    PendingGeometry::Procedural(vertex_count) => {
                        rpass.draw(0..vertex_count, 0..1);
                    }
                }
                draw_count += 1;
            }
        }

        self.queue.submit(Some(encoder.finish()));
        self.uniforms.clear();
        log::trace!(
            "Submitted {} passes, {} draws ({} pipelines cached)",
            frame.len(),
            draw_count,
            self.pipelines.len()
        );
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn framebuffer_views(
        &self,
        framebuffer: FramebufferId,
    ) -> Option<(&wgpu::TextureView, &wgpu::TextureView, UVec2)> {
        let attachments = self.framebuffers.get(&framebuffer)?;
        let color = self.textures.get(&attachments.color)?;
        let depth = self.textures.get(&attachments.depth)?;
        Some((&color.view, &depth.view, color.size))
    }

    fn target_format(&self, framebuffer: Option<FramebufferId>) -> wgpu::TextureFormat {
        framebuffer
            .and_then(|fb| self.framebuffers.get(&fb))
            .and_then(|fb| self.textures.get(&fb.color))
            .map(|texture| texture.texture.format())
            .unwrap_or(self.surface_format)
    }

    fn texture_bind_group(&self, bindings: &TextureBindings) -> wgpu::BindGroup {
        let views: Vec<&wgpu::TextureView> = bindings
            .textures
            .iter()
            .map(|id| {
                id.and_then(|id| self.textures.get(&id))
                    .filter(|texture| !texture.format.is_depth())
                    .map(|texture| &texture.view)
                    .unwrap_or(&self.fallback_view)
            })
            .collect();
        let samplers: Vec<&wgpu::Sampler> = bindings
            .samplers
            .iter()
            .map(|id| {
                id.and_then(|id| self.samplers.get(&id))
                    .unwrap_or(&self.fallback_sampler)
            })
            .collect();

        let mut entries = Vec::with_capacity(UNIT_COUNT * 2);
        for (unit, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: unit as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        for (unit, sampler) in samplers.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (UNIT_COUNT + unit) as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("MaterialTextures"),
            layout: &self.texture_layout,
            entries: &entries,
        })
    }

    fn current_pass(&mut self) -> &mut PendingPass {
        let target = self.state.framebuffer;
        if self.frame.last().is_none_or(|pass| pass.target != target) {
            self.frame.push(PendingPass::new(target));
        }
        // Just ensured non-empty
        let last = self.frame.len() - 1;
        &mut self.frame[last]
    }

    /// Bound textures minus the current target's own attachments, which a
    /// pass cannot sample while writing them.
    fn sampled_textures(&self) -> [Option<TextureId>; UNIT_COUNT] {
        let mut textures = self.state.textures;
        let Some(attached) = self
            .state
            .framebuffer
            .and_then(|fb| self.framebuffers.get(&fb))
        else {
            return textures;
        };
        for slot in textures.iter_mut() {
            if slot.is_some_and(|id| id == attached.color || id == attached.depth) {
                log::debug!("Dropping {:?}: it is attached to the bound target", slot);
                *slot = None;
            }
        }
        textures
    }

    fn record_draw(&mut self, geometry: PendingGeometry) {
        let Some(program) = self.state.program else {
            log::warn!("Draw issued with no program in use");
            return;
        };
        if self.state.face_culling && self.state.cull_face == Face::FrontAndBack {
            return;
        }

        let kind = match geometry {
            PendingGeometry::Indexed(_) => GeometryKind::Indexed,
            PendingGeometry::Procedural(_) => GeometryKind::Procedural,
        };
        let format = self.target_format(self.state.framebuffer);
        let key = PipelineKey::from_state(&self.state, program, kind, format);

        let mut uniforms = self
            .program_uniforms
            .get(&program)
            .copied()
            .unwrap_or_default();
        let textures = self.sampled_textures();
        uniforms.texture_flags = textures
            .iter()
            .enumerate()
            .filter(|(_, texture)| texture.is_some())
            .fold(0u32, |flags, (unit, _)| flags | (1 << unit));
        let uniform_offset = self.uniforms.push(&uniforms);

        let draw = PendingDraw {
            key,
            uniform_offset,
            bindings: TextureBindings {
                textures,
                samplers: self.state.samplers,
            },
            geometry,
            viewport: self.state.viewport,
            blend_constant: self.state.blend_constant,
        };
        self.current_pass().draws.push(draw);
    }
}

impl GraphicsContext for WgpuContext {
    fn create_program(&mut self, desc: &ProgramDescriptor) -> GraphicsResult<ProgramId> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{} (vertex)", desc.label)),
                source: wgpu::ShaderSource::Wgsl(desc.vertex.as_str().into()),
            });
        let fragment = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{} (fragment)", desc.label)),
                source: wgpu::ShaderSource::Wgsl(desc.fragment.as_str().into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GraphicsError::ProgramCreationFailed {
                label: desc.label.clone(),
                reason: error.to_string(),
            });
        }

        let id = ProgramId(self.next());
        self.programs.insert(
            id,
            ProgramModules {
                label: desc.label.clone(),
                vertex,
                fragment,
            },
        );
        log::debug!("Created program '{}' as {:?}", desc.label, id);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            log::warn!("Deleting unknown program {:?}", program);
        }
        self.program_uniforms.remove(&program);
        self.pipelines.forget_program(program);
        if self.state.program == Some(program) {
            self.state.program = None;
        }
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        pixels: Option<&[u8]>,
    ) -> GraphicsResult<TextureId> {
        if desc.size.x == 0 || desc.size.y == 0 {
            return Err(GraphicsError::TextureCreationFailed(format!(
                "'{}' has zero size",
                desc.label
            )));
        }
        let (format, usage) = match desc.format {
            TextureFormat::Rgba8 => (wgpu::TextureFormat::Rgba8Unorm, color_usage()),
            TextureFormat::Rgba8Srgb => (wgpu::TextureFormat::Rgba8UnormSrgb, color_usage()),
            TextureFormat::Depth24 => (
                Depth::FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            ),
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.size.x,
                height: desc.size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        if let Some(pixels) = pixels {
            let expected = (desc.size.x * desc.size.y * 4) as usize;
            if desc.format.is_depth() || pixels.len() != expected {
                texture.destroy();
                return Err(GraphicsError::TextureCreationFailed(format!(
                    "'{}' expected {} bytes of RGBA8 data, got {}",
                    desc.label,
                    expected,
                    pixels.len()
                )));
            }
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * desc.size.x),
                    rows_per_image: Some(desc.size.y),
                },
                texture.size(),
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.next());
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                format: desc.format,
                size: desc.size,
            },
        );
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        match self.textures.remove(&texture) {
            Some(gpu) => gpu.texture.destroy(),
            None => log::warn!("Deleting unknown texture {:?}", texture),
        }
        for slot in self.state.textures.iter_mut() {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> SamplerId {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sampler"),
            address_mode_u: address_mode(desc.wrap_s),
            address_mode_v: address_mode(desc.wrap_t),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter_mode(desc.mag_filter),
            min_filter: filter_mode(desc.min_filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let id = SamplerId(self.next());
        self.samplers.insert(id, sampler);
        id
    }

    fn delete_sampler(&mut self, sampler: SamplerId) {
        if self.samplers.remove(&sampler).is_none() {
            log::warn!("Deleting unknown sampler {:?}", sampler);
        }
        for slot in self.state.samplers.iter_mut() {
            if *slot == Some(sampler) {
                *slot = None;
            }
        }
    }

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> MeshId {
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("MeshVertices"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("MeshIndices"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let id = MeshId(self.next());
        self.meshes.insert(
            id,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: indices.len() as u32,
            },
        );
        id
    }

    fn delete_mesh(&mut self, mesh: MeshId) {
        if self.meshes.remove(&mesh).is_none() {
            log::warn!("Deleting unknown mesh {:?}", mesh);
        }
    }

    fn create_framebuffer(
        &mut self,
        color: TextureId,
        depth: TextureId,
    ) -> GraphicsResult<FramebufferId> {
        let (Some(color_tex), Some(depth_tex)) = (self.textures.get(&color), self.textures.get(&depth))
        else {
            return Err(GraphicsError::UnknownHandle(format!(
                "framebuffer attachments {:?} / {:?}",
                color, depth
            )));
        };
        if color_tex.format.is_depth() || !depth_tex.format.is_depth() {
            return Err(GraphicsError::FramebufferCreationFailed(
                "expected one color and one depth attachment".to_string(),
            ));
        }
        if color_tex.size != depth_tex.size {
            return Err(GraphicsError::FramebufferCreationFailed(format!(
                "attachment sizes differ: {:?} vs {:?}",
                color_tex.size, depth_tex.size
            )));
        }
        let id = FramebufferId(self.next());
        self.framebuffers.insert(id, Framebuffer { color, depth });
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(&framebuffer).is_none() {
            log::warn!("Deleting unknown framebuffer {:?}", framebuffer);
        }
        if self.state.framebuffer == Some(framebuffer) {
            self.state.framebuffer = None;
        }
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = VertexArrayId(self.next());
        self.vertex_arrays.insert(id);
        id
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        if !self.vertex_arrays.remove(&vertex_array) {
            log::warn!("Deleting unknown vertex array {:?}", vertex_array);
        }
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        match capability {
            Capability::FaceCulling => self.state.face_culling = enabled,
            Capability::DepthTest => self.state.depth_test = enabled,
            Capability::Blending => self.state.blending = enabled,
        }
    }

    fn set_cull_face(&mut self, face: Face) {
        self.state.cull_face = face;
    }

    fn set_front_face(&mut self, winding: Winding) {
        self.state.front_face = winding;
    }

    fn set_depth_function(&mut self, function: CompareFunction) {
        self.state.depth_function = function;
    }

    fn set_blend_equation(&mut self, equation: BlendEquation) {
        self.state.blend_equation = equation;
    }

    fn set_blend_factors(&mut self, source: BlendFactor, destination: BlendFactor) {
        self.state.blend_factors = (source, destination);
    }

    fn set_blend_constant(&mut self, color: Vec4) {
        self.state.blend_constant = color;
    }

    fn set_color_mask(&mut self, mask: [bool; 4]) {
        self.state.color_mask = mask;
    }

    fn set_depth_mask(&mut self, enabled: bool) {
        self.state.depth_mask = enabled;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = Some(viewport);
    }

    fn set_clear_color(&mut self, color: Vec4) {
        self.state.clear_color = color;
    }

    fn set_clear_depth(&mut self, depth: f32) {
        self.state.clear_depth = depth;
    }

    fn use_program(&mut self, program: ProgramId) {
        if !self.programs.contains_key(&program) {
            log::warn!("Using unknown program {:?}", program);
        }
        self.state.program = Some(program);
    }

    fn set_uniform(&mut self, name: UniformName, value: UniformValue) {
        match self.state.program {
            Some(program) => self
                .program_uniforms
                .entry(program)
                .or_default()
                .set(name, value),
            None => log::warn!("Uniform {:?} set with no program in use", name),
        }
    }

    fn active_texture(&mut self, unit: u32) {
        if unit >= MAX_TEXTURE_UNITS {
            log::warn!("Texture unit {} out of range", unit);
            return;
        }
        self.state.active_unit = unit;
    }

    fn bind_texture(&mut self, texture: TextureId) {
        self.state.textures[self.state.active_unit as usize] = Some(texture);
    }

    fn unbind_texture(&mut self) {
        self.state.textures[self.state.active_unit as usize] = None;
    }

    fn bind_sampler(&mut self, unit: u32, sampler: Option<SamplerId>) {
        match self.state.samplers.get_mut(unit as usize) {
            Some(slot) => *slot = sampler,
            None => log::warn!("Texture unit {} out of range", unit),
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.state.framebuffer = framebuffer;
    }

    fn clear(&mut self, flags: ClearFlags) {
        let color = (flags.color && self.state.color_mask.iter().any(|&c| c)).then(|| {
            let c = self.state.clear_color.as_dvec4();
            wgpu::Color {
                r: c.x,
                g: c.y,
                b: c.z,
                a: c.w,
            }
        });
        let depth = (flags.depth && self.state.depth_mask).then_some(self.state.clear_depth);
        if color.is_none() && depth.is_none() {
            return;
        }

        let target = self.state.framebuffer;
        let needs_new_pass = self
            .frame
            .last()
            .is_none_or(|pass| pass.target != target || !pass.draws.is_empty());
        if needs_new_pass {
            self.frame.push(PendingPass::new(target));
        }
        let pass = self.current_pass();
        if color.is_some() {
            pass.clear_color = color;
        }
        if depth.is_some() {
            pass.clear_depth = depth;
        }
    }

    fn draw_mesh(&mut self, mesh: MeshId) {
        if !self.meshes.contains_key(&mesh) {
            log::warn!("Drawing unknown mesh {:?}", mesh);
            return;
        }
        self.record_draw(PendingGeometry::Indexed(mesh));
    }

    fn draw_arrays(&mut self, vertex_array: VertexArrayId, vertex_count: u32) {
        if !self.vertex_arrays.contains(&vertex_array) {
            log::warn!("Drawing unknown vertex array {:?}", vertex_array);
            return;
        }
        self.record_draw(PendingGeometry::Procedural(vertex_count));
    }
}

fn color_usage() -> wgpu::TextureUsages {
    wgpu::TextureUsages::TEXTURE_BINDING
        | wgpu::TextureUsages::COPY_DST
        | wgpu::TextureUsages::COPY_SRC
        | wgpu::TextureUsages::RENDER_ATTACHMENT
}

fn create_texture_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(UNIT_COUNT * 2);
    for unit in 0..UNIT_COUNT as u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: unit,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }
    for unit in 0..UNIT_COUNT as u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: UNIT_COUNT as u32 + unit,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("MaterialTexturesLayout"),
        entries: &entries,
    })
}

/// wgpu rejects viewports that leave the attachment.
fn clamp_viewport(viewport: Viewport, target: UVec2) -> (f32, f32, f32, f32) {
    let x = (viewport.x.max(0) as u32).min(target.x.saturating_sub(1));
    let y = (viewport.y.max(0) as u32).min(target.y.saturating_sub(1));
    let width = viewport.width.min(target.x - x).max(1);
    let height = viewport.height.min(target.y - y).max(1);
    (x as f32, y as f32, width as f32, height as f32)
}
