// renderer/recording.rs
//! A `GraphicsContext` that records the command stream instead of talking to
//! a GPU. Used for frame traces and for exercising the renderer headless.

use std::collections::{HashMap, HashSet};

use glam::Vec4;

use crate::renderer::context::{
    BlendEquation, BlendFactor, Capability, ClearFlags, CompareFunction, Face, FramebufferId,
    GraphicsContext, GraphicsError, GraphicsResult, MeshId, ProgramDescriptor, ProgramId,
    SamplerDescriptor, SamplerId, TextureDescriptor, TextureId, UniformName, UniformValue,
    VertexArrayId, Viewport, Winding, MAX_TEXTURE_UNITS,
};
use crate::renderer::Vertex;

const UNIT_COUNT: usize = MAX_TEXTURE_UNITS as usize;

/// Device state as it stands after the last recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub face_culling: bool,
    pub depth_test: bool,
    pub blending: bool,
    pub cull_face: Face,
    pub front_face: Winding,
    pub depth_function: CompareFunction,
    pub blend_equation: BlendEquation,
    pub blend_factors: (BlendFactor, BlendFactor),
    pub blend_constant: Vec4,
    pub color_mask: [bool; 4],
    pub depth_mask: bool,
    pub viewport: Option<Viewport>,
    pub clear_color: Vec4,
    pub clear_depth: f32,
    pub program: Option<ProgramId>,
    pub active_unit: u32,
    pub textures: [Option<TextureId>; UNIT_COUNT],
    pub samplers: [Option<SamplerId>; UNIT_COUNT],
    pub framebuffer: Option<FramebufferId>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            face_culling: false,
            depth_test: false,
            blending: false,
            cull_face: Face::Back,
            front_face: Winding::CounterClockwise,
            depth_function: CompareFunction::Less,
            blend_equation: BlendEquation::Add,
            blend_factors: (BlendFactor::One, BlendFactor::Zero),
            blend_constant: Vec4::ZERO,
            color_mask: [true; 4],
            depth_mask: true,
            viewport: None,
            clear_color: Vec4::ZERO,
            clear_depth: 1.0,
            program: None,
            active_unit: 0,
            textures: [None; UNIT_COUNT],
            samplers: [None; UNIT_COUNT],
            framebuffer: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawGeometry {
    Mesh { mesh: MeshId, index_count: u32 },
    Procedural { vertex_array: VertexArrayId, vertex_count: u32 },
}

/// Everything a draw call would have read from the device.
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub geometry: DrawGeometry,
    pub state: DeviceState,
    pub uniforms: HashMap<UniformName, UniformValue>,
}

impl DrawRecord {
    pub fn uniform(&self, name: UniformName) -> Option<UniformValue> {
        self.uniforms.get(&name).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    SetCapability(Capability, bool),
    SetCullFace(Face),
    SetFrontFace(Winding),
    SetDepthFunction(CompareFunction),
    SetBlendEquation(BlendEquation),
    SetBlendFactors(BlendFactor, BlendFactor),
    SetBlendConstant(Vec4),
    SetColorMask([bool; 4]),
    SetDepthMask(bool),
    SetViewport(Viewport),
    SetClearColor(Vec4),
    SetClearDepth(f32),
    UseProgram(ProgramId),
    SetUniform(UniformName, UniformValue),
    ActiveTexture(u32),
    BindTexture { unit: u32, texture: TextureId },
    UnbindTexture(u32),
    BindSampler { unit: u32, sampler: Option<SamplerId> },
    BindFramebuffer(Option<FramebufferId>),
    /// Records which buffers the clear actually reached given the masks.
    Clear {
        framebuffer: Option<FramebufferId>,
        color: bool,
        depth: bool,
    },
    DrawMesh(MeshId),
    DrawArrays {
        vertex_array: VertexArrayId,
        vertex_count: u32,
    },
}

#[derive(Debug, Default)]
struct LiveResources {
    programs: HashSet<ProgramId>,
    textures: HashMap<TextureId, TextureDescriptor>,
    samplers: HashSet<SamplerId>,
    meshes: HashMap<MeshId, u32>,
    framebuffers: HashSet<FramebufferId>,
    vertex_arrays: HashSet<VertexArrayId>,
}

#[derive(Debug, Default)]
pub struct RecordingContext {
    state: DeviceState,
    commands: Vec<DeviceCommand>,
    draws: Vec<DrawRecord>,
    uniforms: HashMap<ProgramId, HashMap<UniformName, UniformValue>>,
    live: LiveResources,
    next_id: u32,
    double_frees: usize,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Forget recorded commands and draws, keeping device state and resources.
    pub fn clear_recording(&mut self) {
        self.commands.clear();
        self.draws.clear();
    }

    pub fn clear_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, DeviceCommand::Clear { .. }))
            .count()
    }

    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }

    pub fn texture_bind_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, DeviceCommand::BindTexture { .. }))
            .count()
    }

    pub fn live_resource_count(&self) -> usize {
        self.live.programs.len()
            + self.live.textures.len()
            + self.live.samplers.len()
            + self.live.meshes.len()
            + self.live.framebuffers.len()
            + self.live.vertex_arrays.len()
    }

    pub fn double_free_count(&self) -> usize {
        self.double_frees
    }

    pub fn texture_descriptor(&self, texture: TextureId) -> Option<&TextureDescriptor> {
        self.live.textures.get(&texture)
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, command: DeviceCommand) {
        self.commands.push(command);
    }

    fn release<T: std::hash::Hash + Eq>(set: &mut HashSet<T>, id: T, double_frees: &mut usize) {
        if !set.remove(&id) {
            *double_frees += 1;
        }
    }

    fn record_draw(&mut self, geometry: DrawGeometry) {
        let uniforms = self
            .state
            .program
            .and_then(|program| self.uniforms.get(&program).cloned())
            .unwrap_or_default();
        self.draws.push(DrawRecord {
            geometry,
            state: self.state.clone(),
            uniforms,
        });
    }
}

impl GraphicsContext for RecordingContext {
    fn create_program(&mut self, desc: &ProgramDescriptor) -> GraphicsResult<ProgramId> {
        if desc.vertex.trim().is_empty() || desc.fragment.trim().is_empty() {
            return Err(GraphicsError::ProgramCreationFailed {
                label: desc.label.clone(),
                reason: "empty shader stage".to_string(),
            });
        }
        let id = ProgramId(self.next());
        self.live.programs.insert(id);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.uniforms.remove(&program);
        Self::release(&mut self.live.programs, program, &mut self.double_frees);
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
        if let Some(pixels) = pixels {
            let expected = (desc.size.x * desc.size.y * 4) as usize;
            if desc.format.is_depth() || pixels.len() != expected {
                return Err(GraphicsError::TextureCreationFailed(format!(
                    "'{}' expected {} bytes of RGBA8 data, got {}",
                    desc.label,
                    expected,
                    pixels.len()
                )));
            }
        }
        let id = TextureId(self.next());
        self.live.textures.insert(id, desc.clone());
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.live.textures.remove(&texture).is_none() {
            self.double_frees += 1;
        }
    }

    fn create_sampler(&mut self, _desc: &SamplerDescriptor) -> SamplerId {
        let id = SamplerId(self.next());
        self.live.samplers.insert(id);
        id
    }

    fn delete_sampler(&mut self, sampler: SamplerId) {
        Self::release(&mut self.live.samplers, sampler, &mut self.double_frees);
    }

    fn create_mesh(&mut self, _vertices: &[Vertex], indices: &[u32]) -> MeshId {
        let id = MeshId(self.next());
        self.live.meshes.insert(id, indices.len() as u32);
        id
    }

    fn delete_mesh(&mut self, mesh: MeshId) {
        if self.live.meshes.remove(&mesh).is_none() {
            self.double_frees += 1;
        }
    }

    fn create_framebuffer(
        &mut self,
        color: TextureId,
        depth: TextureId,
    ) -> GraphicsResult<FramebufferId> {
        let color_ok = self
            .live
            .textures
            .get(&color)
            .is_some_and(|desc| !desc.format.is_depth());
        let depth_ok = self
            .live
            .textures
            .get(&depth)
            .is_some_and(|desc| desc.format.is_depth());
        if !color_ok || !depth_ok {
            return Err(GraphicsError::FramebufferCreationFailed(
                "attachments must be a live color texture and a live depth texture".to_string(),
            ));
        }
        let id = FramebufferId(self.next());
        self.live.framebuffers.insert(id);
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.state.framebuffer == Some(framebuffer) {
            self.state.framebuffer = None;
        }
        Self::release(&mut self.live.framebuffers, framebuffer, &mut self.double_frees);
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = VertexArrayId(self.next());
        self.live.vertex_arrays.insert(id);
        id
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        Self::release(&mut self.live.vertex_arrays, vertex_array, &mut self.double_frees);
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        match capability {
            Capability::FaceCulling => self.state.face_culling = enabled,
            Capability::DepthTest => self.state.depth_test = enabled,
            Capability::Blending => self.state.blending = enabled,
        }
        self.record(DeviceCommand::SetCapability(capability, enabled));
    }

    fn set_cull_face(&mut self, face: Face) {
        self.state.cull_face = face;
        self.record(DeviceCommand::SetCullFace(face));
    }

    fn set_front_face(&mut self, winding: Winding) {
        self.state.front_face = winding;
        self.record(DeviceCommand::SetFrontFace(winding));
    }

    fn set_depth_function(&mut self, function: CompareFunction) {
        self.state.depth_function = function;
        self.record(DeviceCommand::SetDepthFunction(function));
    }

    fn set_blend_equation(&mut self, equation: BlendEquation) {
        self.state.blend_equation = equation;
        self.record(DeviceCommand::SetBlendEquation(equation));
    }

    fn set_blend_factors(&mut self, source: BlendFactor, destination: BlendFactor) {
        self.state.blend_factors = (source, destination);
        self.record(DeviceCommand::SetBlendFactors(source, destination));
    }

    fn set_blend_constant(&mut self, color: Vec4) {
        self.state.blend_constant = color;
        self.record(DeviceCommand::SetBlendConstant(color));
    }

    fn set_color_mask(&mut self, mask: [bool; 4]) {
        self.state.color_mask = mask;
        self.record(DeviceCommand::SetColorMask(mask));
    }

    fn set_depth_mask(&mut self, enabled: bool) {
        self.state.depth_mask = enabled;
        self.record(DeviceCommand::SetDepthMask(enabled));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = Some(viewport);
        self.record(DeviceCommand::SetViewport(viewport));
    }

    fn set_clear_color(&mut self, color: Vec4) {
        self.state.clear_color = color;
        self.record(DeviceCommand::SetClearColor(color));
    }

    fn set_clear_depth(&mut self, depth: f32) {
        self.state.clear_depth = depth;
        self.record(DeviceCommand::SetClearDepth(depth));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.state.program = Some(program);
        self.record(DeviceCommand::UseProgram(program));
    }

    fn set_uniform(&mut self, name: UniformName, value: UniformValue) {
        match self.state.program {
            Some(program) => {
                self.uniforms.entry(program).or_default().insert(name, value);
            }
            None => log::warn!("Uniform {:?} set with no program in use", name),
        }
        self.record(DeviceCommand::SetUniform(name, value));
    }

    fn active_texture(&mut self, unit: u32) {
        self.state.active_unit = unit;
        self.record(DeviceCommand::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, texture: TextureId) {
        let unit = self.state.active_unit;
        if let Some(slot) = self.state.textures.get_mut(unit as usize) {
            *slot = Some(texture);
        }
        self.record(DeviceCommand::BindTexture { unit, texture });
    }

    fn unbind_texture(&mut self) {
        let unit = self.state.active_unit;
        if let Some(slot) = self.state.textures.get_mut(unit as usize) {
            *slot = None;
        }
        self.record(DeviceCommand::UnbindTexture(unit));
    }

    fn bind_sampler(&mut self, unit: u32, sampler: Option<SamplerId>) {
        if let Some(slot) = self.state.samplers.get_mut(unit as usize) {
            *slot = sampler;
        }
        self.record(DeviceCommand::BindSampler { unit, sampler });
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.state.framebuffer = framebuffer;
        self.record(DeviceCommand::BindFramebuffer(framebuffer));
    }

    fn clear(&mut self, flags: ClearFlags) {
        let color = flags.color && self.state.color_mask.iter().any(|&channel| channel);
        let depth = flags.depth && self.state.depth_mask;
        self.record(DeviceCommand::Clear {
            framebuffer: self.state.framebuffer,
            color,
            depth,
        });
    }

    fn draw_mesh(&mut self, mesh: MeshId) {
        let index_count = self.live.meshes.get(&mesh).copied().unwrap_or(0);
        self.record(DeviceCommand::DrawMesh(mesh));
        self.record_draw(DrawGeometry::Mesh { mesh, index_count });
    }

    fn draw_arrays(&mut self, vertex_array: VertexArrayId, vertex_count: u32) {
        self.record(DeviceCommand::DrawArrays {
            vertex_array,
            vertex_count,
        });
        self.record_draw(DrawGeometry::Procedural {
            vertex_array,
            vertex_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::context::TextureFormat;
    use glam::UVec2;

    #[test]
    fn clear_respects_write_masks() {
        let mut gfx = RecordingContext::new();
        gfx.set_depth_mask(false);
        gfx.clear(ClearFlags::COLOR_AND_DEPTH);
        assert_eq!(
            gfx.commands().last(),
            Some(&DeviceCommand::Clear {
                framebuffer: None,
                color: true,
                depth: false
            })
        );
    }

    #[test]
    fn bind_texture_targets_active_unit() {
        let mut gfx = RecordingContext::new();
        let texture = gfx
            .create_texture(
                &TextureDescriptor {
                    label: "t".into(),
                    size: UVec2::new(1, 1),
                    format: TextureFormat::Rgba8,
                },
                Some(&[255, 255, 255, 255]),
            )
            .unwrap();
        gfx.active_texture(3);
        gfx.bind_texture(texture);
        assert_eq!(gfx.state().textures[3], Some(texture));
        assert_eq!(gfx.state().textures[0], None);

        gfx.unbind_texture();
        assert_eq!(gfx.state().textures[3], None);
        assert_eq!(gfx.commands().last(), Some(&DeviceCommand::UnbindTexture(3)));
    }

    #[test]
    fn deleting_twice_is_counted() {
        let mut gfx = RecordingContext::new();
        let vao = gfx.create_vertex_array();
        gfx.delete_vertex_array(vao);
        gfx.delete_vertex_array(vao);
        assert_eq!(gfx.double_free_count(), 1);
        assert_eq!(gfx.live_resource_count(), 0);
    }

    #[test]
    fn framebuffer_requires_matching_attachments() {
        let mut gfx = RecordingContext::new();
        let color = gfx
            .create_texture(
                &TextureDescriptor {
                    label: "color".into(),
                    size: UVec2::new(4, 4),
                    format: TextureFormat::Rgba8,
                },
                None,
            )
            .unwrap();
        assert!(gfx.create_framebuffer(color, color).is_err());
    }
}
