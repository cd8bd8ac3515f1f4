// renderer/forward.rs
//! Forward renderer: traverse, sort, then draw opaque, sky and transparent
//! geometry, optionally through an offscreen target and a composite pass.

use std::path::{Path, PathBuf};

use glam::{Mat4, UVec2, Vec3, Vec4};
use thiserror::Error;

use crate::asset::Assets;
use crate::renderer::command::{sort_back_to_front, CommandLists, RenderCommand};
use crate::renderer::context::{
    ClearFlags, CompareFunction, Face, FilterMode, FramebufferId, GraphicsContext, GraphicsError,
    MeshId, ProgramId, SamplerDescriptor, SamplerId, TextureBinding, TextureFormat, TextureId,
    UniformName, UniformValue, VertexArrayId, Viewport, WrapMode,
};
use crate::renderer::lights::{truncate_lights, upload_lights, LightSnapshot, MAX_LIGHTS};
use crate::renderer::material::{Material, MaterialKind};
use crate::renderer::pipeline_state::PipelineState;
use crate::renderer::primitives::sphere_mesh;
use crate::renderer::shaders::{self, BUILTIN_PREFIX};
use crate::renderer::texture::{empty_texture, load_texture, TextureError};
use crate::scene::{Camera, Light, MeshRenderer, Scene};
use crate::settings::RendererConfig;

/// Replaces clip-space z with w, so after the perspective divide every
/// vertex sits on the far plane.
pub const CLAMP_TO_FAR_PLANE: Mat4 = Mat4::from_cols(
    Vec4::X,
    Vec4::Y,
    Vec4::ZERO,
    Vec4::new(0.0, 0.0, 1.0, 1.0),
);

const SKY_SEGMENTS: u32 = 16;
const SKY_RINGS: u32 = 16;
const CLEAR_COLOR: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);
const CLEAR_DEPTH: f32 = 1.0;
/// Composite pass texture units.
const SCENE_UNIT: u32 = 0;
const DISTORTION_UNIT: u32 = 1;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to read shader {path:?}: {source}")]
    ShaderSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unknown built-in post-process stage '{0}'")]
    UnknownBuiltin(String),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error(transparent)]
    Graphics(#[from] GraphicsError),
}

/// Variant of the composite pass, uploaded as the `Effect` uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeEffect {
    #[default]
    Normal,
    Alternate,
}

impl CompositeEffect {
    pub fn toggled(self) -> Self {
        match self {
            CompositeEffect::Normal => CompositeEffect::Alternate,
            CompositeEffect::Alternate => CompositeEffect::Normal,
        }
    }

    fn code(self) -> i32 {
        match self {
            CompositeEffect::Normal => 0,
            CompositeEffect::Alternate => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub opaque: usize,
    pub transparent: usize,
    pub lights: usize,
    pub sky: bool,
    pub composited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No camera in the scene; nothing was cleared or drawn.
    Skipped,
    Rendered(FrameStats),
}

/// Everything created during a fallible setup step, released on failure.
#[derive(Default)]
struct Created {
    programs: Vec<ProgramId>,
    textures: Vec<TextureId>,
    samplers: Vec<SamplerId>,
    meshes: Vec<MeshId>,
    framebuffers: Vec<FramebufferId>,
    vertex_arrays: Vec<VertexArrayId>,
}

impl Created {
    fn release(self, gfx: &mut dyn GraphicsContext) {
        for framebuffer in self.framebuffers {
            gfx.delete_framebuffer(framebuffer);
        }
        for vertex_array in self.vertex_arrays {
            gfx.delete_vertex_array(vertex_array);
        }
        for program in self.programs {
            gfx.delete_program(program);
        }
        for texture in self.textures {
            gfx.delete_texture(texture);
        }
        for sampler in self.samplers {
            gfx.delete_sampler(sampler);
        }
        for mesh in self.meshes {
            gfx.delete_mesh(mesh);
        }
    }
}

fn with_rollback<T>(
    gfx: &mut dyn GraphicsContext,
    build: impl FnOnce(&mut dyn GraphicsContext, &mut Created) -> Result<T, RenderError>,
) -> Result<T, RenderError> {
    let mut created = Created::default();
    match build(gfx, &mut created) {
        Ok(value) => Ok(value),
        Err(err) => {
            created.release(gfx);
            Err(err)
        }
    }
}

/// Sky sphere and the textured material drawing it. Owned by the renderer.
struct SkyPass {
    mesh: MeshId,
    texture: TextureId,
    sampler: SamplerId,
    material: Material,
}

impl SkyPass {
    fn create(gfx: &mut dyn GraphicsContext, texture_path: &Path) -> Result<Self, RenderError> {
        with_rollback(gfx, |gfx, created| {
            let texture = load_texture(gfx, texture_path, true)?;
            created.textures.push(texture);

            let program = gfx.create_program(&shaders::textured())?;
            created.programs.push(program);

            let sampler = gfx.create_sampler(&SamplerDescriptor {
                mag_filter: FilterMode::Linear,
                min_filter: FilterMode::Linear,
                wrap_s: WrapMode::Repeat,
                wrap_t: WrapMode::ClampToEdge,
            });
            created.samplers.push(sampler);

            let (vertices, indices) = sphere_mesh(SKY_SEGMENTS, SKY_RINGS);
            let mesh = gfx.create_mesh(&vertices, &indices);
            created.meshes.push(mesh);

            // Drawn from inside the sphere, after the opaque pass
            let mut state = PipelineState::default();
            state.face_culling.enabled = true;
            state.face_culling.culled_face = Face::Front;
            state.depth_testing.enabled = true;
            state.depth_testing.function = CompareFunction::LessEqual;

            let material = Material::new(MaterialKind::Textured, program)
                .with_pipeline_state(state)
                .with_texture(texture, sampler)
                .with_tint(Vec4::ONE)
                .with_alpha_threshold(1.0)
                .transparent(false);

            Ok(SkyPass {
                mesh,
                texture,
                sampler,
                material,
            })
        })
    }

    fn draw(&self, gfx: &mut dyn GraphicsContext, view_projection: Mat4, eye: Vec3) {
        self.material.setup(gfx);
        let model = Mat4::from_translation(eye);
        gfx.set_uniform(
            UniformName::Transform,
            (CLAMP_TO_FAR_PLANE * view_projection * model).into(),
        );
        gfx.draw_mesh(self.mesh);
    }

    fn destroy(self, gfx: &mut dyn GraphicsContext) {
        gfx.delete_mesh(self.mesh);
        gfx.delete_program(self.material.shader);
        gfx.delete_texture(self.texture);
        gfx.delete_sampler(self.sampler);
    }
}

/// Offscreen color + depth target and the full-screen composite drawing it.
struct PostProcessPass {
    framebuffer: FramebufferId,
    color_target: TextureId,
    depth_target: TextureId,
    vertex_array: VertexArrayId,
    sampler: SamplerId,
    distortion: Option<TextureId>,
    material: Material,
}

impl PostProcessPass {
    fn create(
        gfx: &mut dyn GraphicsContext,
        size: UVec2,
        fragment: &Path,
        distortion: Option<&Path>,
    ) -> Result<Self, RenderError> {
        let fragment_source = read_fragment(fragment)?;
        with_rollback(gfx, |gfx, created| {
            let color_target = empty_texture(gfx, "postprocess color", TextureFormat::Rgba8, size)?;
            created.textures.push(color_target);
            let depth_target =
                empty_texture(gfx, "postprocess depth", TextureFormat::Depth24, size)?;
            created.textures.push(depth_target);

            let framebuffer = gfx.create_framebuffer(color_target, depth_target)?;
            created.framebuffers.push(framebuffer);

            let label = fragment.display().to_string();
            let program = gfx.create_program(&shaders::fullscreen(&label, &fragment_source))?;
            created.programs.push(program);

            let distortion = match distortion {
                Some(path) => {
                    let texture = load_texture(gfx, path, false)?;
                    created.textures.push(texture);
                    Some(texture)
                }
                None => None,
            };

            let vertex_array = gfx.create_vertex_array();
            created.vertex_arrays.push(vertex_array);

            let sampler = gfx.create_sampler(&SamplerDescriptor {
                mag_filter: FilterMode::Linear,
                min_filter: FilterMode::Linear,
                wrap_s: WrapMode::ClampToEdge,
                wrap_t: WrapMode::ClampToEdge,
            });
            created.samplers.push(sampler);

            // Depth is never read or written by the composite
            let mut state = PipelineState::default();
            state.depth_mask = false;
            let material = Material::new(MaterialKind::Textured, program)
                .with_pipeline_state(state)
                .with_texture(color_target, sampler);

            Ok(PostProcessPass {
                framebuffer,
                color_target,
                depth_target,
                vertex_array,
                sampler,
                distortion,
                material,
            })
        })
    }

    fn composite(&self, gfx: &mut dyn GraphicsContext, effect: CompositeEffect) {
        gfx.bind_framebuffer(None);
        self.material.setup(gfx);
        if let Some(distortion) = self.distortion {
            gfx.active_texture(DISTORTION_UNIT);
            gfx.bind_texture(distortion);
            gfx.bind_sampler(DISTORTION_UNIT, Some(self.sampler));
            gfx.set_uniform(
                UniformName::Texture(TextureBinding::Distortion),
                UniformValue::Int(DISTORTION_UNIT as i32),
            );
            gfx.active_texture(SCENE_UNIT);
        }
        gfx.set_uniform(UniformName::Effect, UniformValue::Int(effect.code()));
        gfx.draw_arrays(self.vertex_array, 3);

        // The next frame renders into color_target again
        if self.distortion.is_some() {
            gfx.active_texture(DISTORTION_UNIT);
            gfx.unbind_texture();
            gfx.active_texture(SCENE_UNIT);
        }
        gfx.unbind_texture();
    }

    fn destroy(self, gfx: &mut dyn GraphicsContext) {
        gfx.delete_framebuffer(self.framebuffer);
        gfx.delete_vertex_array(self.vertex_array);
        gfx.delete_texture(self.color_target);
        gfx.delete_texture(self.depth_target);
        if let Some(distortion) = self.distortion {
            gfx.delete_texture(distortion);
        }
        gfx.delete_sampler(self.sampler);
        gfx.delete_program(self.material.shader);
    }
}

fn read_fragment(path: &Path) -> Result<String, RenderError> {
    let name = path.to_str().and_then(|p| p.strip_prefix(BUILTIN_PREFIX));
    if let Some(name) = name {
        return shaders::builtin_postprocess(name)
            .map(str::to_string)
            .ok_or_else(|| RenderError::UnknownBuiltin(name.to_string()));
    }
    std::fs::read_to_string(path).map_err(|source| RenderError::ShaderSource {
        path: path.to_path_buf(),
        source,
    })
}

pub struct ForwardRenderer {
    viewport: UVec2,
    sky: Option<SkyPass>,
    postprocess: Option<PostProcessPass>,
    effect: CompositeEffect,
    warned_light_overflow: bool,
}

impl ForwardRenderer {
    /// Allocates the sky and post-process resources the configuration asks
    /// for. Any failure releases what was already created.
    pub fn initialize(
        gfx: &mut dyn GraphicsContext,
        viewport: UVec2,
        config: &RendererConfig,
    ) -> Result<Self, RenderError> {
        let mut renderer = Self {
            viewport,
            sky: None,
            postprocess: None,
            effect: CompositeEffect::default(),
            warned_light_overflow: false,
        };

        if let Some(sky) = &config.sky {
            match SkyPass::create(gfx, sky) {
                Ok(pass) => {
                    log::info!("Sky enabled with texture {:?}", sky);
                    renderer.sky = Some(pass);
                }
                Err(err) => {
                    renderer.destroy(gfx);
                    return Err(err);
                }
            }
        }

        if let Some(fragment) = &config.postprocess {
            let distortion = config.pp_texture.as_deref();
            match PostProcessPass::create(gfx, viewport, fragment, distortion) {
                Ok(pass) => {
                    log::info!(
                        "Post-processing enabled: {:?} at {}x{}",
                        fragment,
                        viewport.x,
                        viewport.y
                    );
                    renderer.postprocess = Some(pass);
                }
                Err(err) => {
                    renderer.destroy(gfx);
                    return Err(err);
                }
            }
        }

        Ok(renderer)
    }

    /// Releases every renderer-owned resource. Calling it again is a no-op.
    pub fn destroy(&mut self, gfx: &mut dyn GraphicsContext) {
        if let Some(sky) = self.sky.take() {
            sky.destroy(gfx);
            log::info!("Sky resources released");
        }
        if let Some(postprocess) = self.postprocess.take() {
            postprocess.destroy(gfx);
            log::info!("Post-process resources released");
        }
    }

    pub fn viewport(&self) -> UVec2 {
        self.viewport
    }

    pub fn has_sky(&self) -> bool {
        self.sky.is_some()
    }

    pub fn has_postprocess(&self) -> bool {
        self.postprocess.is_some()
    }

    pub fn effect(&self) -> CompositeEffect {
        self.effect
    }

    pub fn toggle_postprocess_effect(&mut self) -> CompositeEffect {
        self.effect = self.effect.toggled();
        log::info!("Composite effect set to {:?}", self.effect);
        self.effect
    }

    /// Offscreen color target, if post-processing is enabled.
    pub fn offscreen_target(&self) -> Option<TextureId> {
        self.postprocess.as_ref().map(|pp| pp.color_target)
    }

    pub fn render(
        &mut self,
        gfx: &mut dyn GraphicsContext,
        scene: &Scene,
        assets: &Assets,
    ) -> FrameOutcome {
        let mut camera: Option<(Camera, Mat4)> = None;
        let mut commands = CommandLists::new();
        let mut lights: Vec<LightSnapshot> = Vec::new();

        for entity in scene.entities() {
            if camera.is_none() {
                camera = scene
                    .component::<Camera>(entity)
                    .map(|cam| (cam, scene.local_to_world(entity)));
            }
            if let Some(renderer) = scene.component::<MeshRenderer>(entity) {
                match assets.materials.get(renderer.material) {
                    Some(material) => commands.push(RenderCommand::new(
                        scene.local_to_world(entity),
                        renderer.mesh,
                        material,
                    )),
                    None => log::warn!(
                        "{:?} references a missing material {:?}",
                        entity,
                        renderer.material
                    ),
                }
            }
            if let Some(light) = scene.component::<Light>(entity) {
                lights.push(LightSnapshot::new(light, scene.local_to_world(entity)));
            }
        }

        let Some((camera, camera_to_world)) = camera else {
            log::debug!("No camera in scene; skipping frame");
            return FrameOutcome::Skipped;
        };

        let dropped = truncate_lights(&mut lights);
        if dropped > 0 && !self.warned_light_overflow {
            log::warn!(
                "Scene has {} lights; only the first {} are used",
                dropped + MAX_LIGHTS,
                MAX_LIGHTS
            );
            self.warned_light_overflow = true;
        }

        let eye = camera_to_world.transform_point3(Vec3::ZERO);
        let center = camera_to_world.transform_point3(Vec3::NEG_Z);
        let forward = (center - eye).normalize_or_zero();

        sort_back_to_front(&mut commands.transparent, forward);

        let aspect = self.viewport.x.max(1) as f32 / self.viewport.y.max(1) as f32;
        let view_projection = camera.view_proj(camera_to_world, aspect);

        gfx.set_viewport(Viewport::from_size(self.viewport));
        gfx.set_clear_color(CLEAR_COLOR);
        gfx.set_clear_depth(CLEAR_DEPTH);
        // Masked channels are not cleared
        gfx.set_color_mask([true; 4]);
        gfx.set_depth_mask(true);
        if let Some(postprocess) = &self.postprocess {
            gfx.bind_framebuffer(Some(postprocess.framebuffer));
        }
        gfx.clear(ClearFlags::COLOR_AND_DEPTH);

        for command in &commands.opaque {
            draw_command(gfx, command, view_projection, eye, &lights);
        }

        if let Some(sky) = &self.sky {
            sky.draw(gfx, view_projection, eye);
        }

        for command in &commands.transparent {
            draw_command(gfx, command, view_projection, eye, &lights);
        }

        if let Some(postprocess) = &self.postprocess {
            postprocess.composite(gfx, self.effect);
        }

        let stats = FrameStats {
            opaque: commands.opaque.len(),
            transparent: commands.transparent.len(),
            lights: lights.len(),
            sky: self.sky.is_some(),
            composited: self.postprocess.is_some(),
        };
        log::debug!("Rendered frame: {:?}", stats);
        FrameOutcome::Rendered(stats)
    }
}

fn draw_command(
    gfx: &mut dyn GraphicsContext,
    command: &RenderCommand<'_>,
    view_projection: Mat4,
    eye: Vec3,
    lights: &[LightSnapshot],
) {
    let material = command.material;
    material.setup(gfx);

    let model = command.local_to_world;
    if material.supports_lighting() {
        gfx.set_uniform(UniformName::ViewProjection, view_projection.into());
        gfx.set_uniform(UniformName::Model, model.into());
        gfx.set_uniform(
            UniformName::ModelInverseTranspose,
            model.inverse().transpose().into(),
        );
        gfx.set_uniform(UniformName::Eye, eye.into());
        upload_lights(gfx, lights);
    } else {
        gfx.set_uniform(UniformName::Transform, (view_projection * model).into());
    }

    gfx.draw_mesh(command.mesh);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::RecordingContext;

    #[test]
    fn clamp_to_far_plane_sets_depth_to_w() {
        let clip = CLAMP_TO_FAR_PLANE * Vec4::new(0.3, -0.2, 0.7, 2.0);
        assert!(clip.abs_diff_eq(Vec4::new(0.3, -0.2, 2.0, 2.0), 1e-6));
    }

    #[test]
    fn effect_toggles_between_two_variants() {
        let mut gfx = RecordingContext::new();
        let mut renderer =
            ForwardRenderer::initialize(&mut gfx, UVec2::new(4, 4), &RendererConfig::default())
                .unwrap();
        assert_eq!(renderer.toggle_postprocess_effect(), CompositeEffect::Alternate);
        assert_eq!(renderer.toggle_postprocess_effect(), CompositeEffect::Normal);
    }

    #[test]
    fn empty_config_allocates_nothing() {
        let mut gfx = RecordingContext::new();
        let renderer =
            ForwardRenderer::initialize(&mut gfx, UVec2::new(4, 4), &RendererConfig::default())
                .unwrap();
        assert!(!renderer.has_sky());
        assert!(!renderer.has_postprocess());
        assert_eq!(gfx.live_resource_count(), 0);
    }

    #[test]
    fn failed_sky_load_leaves_nothing_behind() {
        let mut gfx = RecordingContext::new();
        let config = RendererConfig {
            postprocess: Some(PathBuf::from("builtin:vignette")),
            sky: Some(PathBuf::from("no/such/sky.png")),
            pp_texture: None,
        };
        let result = ForwardRenderer::initialize(&mut gfx, UVec2::new(4, 4), &config);
        assert!(matches!(result, Err(RenderError::Texture(_))));
        assert_eq!(gfx.live_resource_count(), 0);
    }

    #[test]
    fn unknown_builtin_stage_is_reported() {
        let mut gfx = RecordingContext::new();
        let config = RendererConfig {
            postprocess: Some(PathBuf::from("builtin:bloom")),
            ..RendererConfig::default()
        };
        let result = ForwardRenderer::initialize(&mut gfx, UVec2::new(4, 4), &config);
        assert!(matches!(result, Err(RenderError::UnknownBuiltin(name)) if name == "bloom"));
    }

    #[test]
    fn destroy_twice_frees_once() {
        let mut gfx = RecordingContext::new();
        let config = RendererConfig {
            postprocess: Some(PathBuf::from("builtin:distortion")),
            ..RendererConfig::default()
        };
        let mut renderer = ForwardRenderer::initialize(&mut gfx, UVec2::new(8, 8), &config).unwrap();
        assert!(renderer.offscreen_target().is_some());
        renderer.destroy(&mut gfx);
        renderer.destroy(&mut gfx);
        assert_eq!(gfx.live_resource_count(), 0);
        assert_eq!(gfx.double_free_count(), 0);
    }
}
