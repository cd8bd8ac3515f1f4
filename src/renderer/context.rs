// renderer/context.rs
//! The graphics device seam.
//!
//! Every component that mutates pipeline or binding state receives a
//! `&mut dyn GraphicsContext`. Calls form a single ordered command stream:
//! state set by one call stays in effect until another call changes it.

use glam::{Mat4, UVec2, Vec3, Vec4};
use serde::Deserialize;
use thiserror::Error;

use crate::renderer::Vertex;

/// Number of texture units a material may bind (albedo .. emissive).
pub const MAX_TEXTURE_UNITS: u32 = 5;

#[derive(Error, Debug)]
pub enum GraphicsError {
    #[error("Failed to create program '{label}': {reason}")]
    ProgramCreationFailed { label: String, reason: String },
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Unknown resource handle: {0}")]
    UnknownHandle(String),
}

pub type GraphicsResult<T> = Result<T, GraphicsError>;

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) u32);

/// Handle to a 2D texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) u32);

/// Handle to a sampler object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerId(pub(crate) u32);

/// Handle to an uploaded indexed mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub(crate) u32);

/// Handle to an offscreen framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub(crate) u32);

/// Handle to a vertex array with no backing buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    FaceCulling,
    DepthTest,
    Blending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Face {
    #[serde(rename = "GL_FRONT", alias = "front")]
    Front,
    #[serde(rename = "GL_BACK", alias = "back")]
    Back,
    #[serde(rename = "GL_FRONT_AND_BACK", alias = "front_and_back")]
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Winding {
    #[serde(rename = "GL_CCW", alias = "ccw")]
    CounterClockwise,
    #[serde(rename = "GL_CW", alias = "cw")]
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum CompareFunction {
    #[serde(rename = "GL_NEVER", alias = "never")]
    Never,
    #[serde(rename = "GL_LESS", alias = "less")]
    Less,
    #[serde(rename = "GL_EQUAL", alias = "equal")]
    Equal,
    #[serde(rename = "GL_LEQUAL", alias = "less_equal")]
    LessEqual,
    #[serde(rename = "GL_GREATER", alias = "greater")]
    Greater,
    #[serde(rename = "GL_NOTEQUAL", alias = "not_equal")]
    NotEqual,
    #[serde(rename = "GL_GEQUAL", alias = "greater_equal")]
    GreaterEqual,
    #[serde(rename = "GL_ALWAYS", alias = "always")]
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum BlendEquation {
    #[serde(rename = "GL_FUNC_ADD", alias = "add")]
    Add,
    #[serde(rename = "GL_FUNC_SUBTRACT", alias = "subtract")]
    Subtract,
    #[serde(rename = "GL_FUNC_REVERSE_SUBTRACT", alias = "reverse_subtract")]
    ReverseSubtract,
    #[serde(rename = "GL_MIN", alias = "min")]
    Min,
    #[serde(rename = "GL_MAX", alias = "max")]
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum BlendFactor {
    #[serde(rename = "GL_ZERO", alias = "zero")]
    Zero,
    #[serde(rename = "GL_ONE", alias = "one")]
    One,
    #[serde(rename = "GL_SRC_COLOR", alias = "src_color")]
    SrcColor,
    #[serde(rename = "GL_ONE_MINUS_SRC_COLOR", alias = "one_minus_src_color")]
    OneMinusSrcColor,
    #[serde(rename = "GL_DST_COLOR", alias = "dst_color")]
    DstColor,
    #[serde(rename = "GL_ONE_MINUS_DST_COLOR", alias = "one_minus_dst_color")]
    OneMinusDstColor,
    #[serde(rename = "GL_SRC_ALPHA", alias = "src_alpha")]
    SrcAlpha,
    #[serde(rename = "GL_ONE_MINUS_SRC_ALPHA", alias = "one_minus_src_alpha")]
    OneMinusSrcAlpha,
    #[serde(rename = "GL_DST_ALPHA", alias = "dst_alpha")]
    DstAlpha,
    #[serde(rename = "GL_ONE_MINUS_DST_ALPHA", alias = "one_minus_dst_alpha")]
    OneMinusDstAlpha,
    #[serde(rename = "GL_CONSTANT_COLOR", alias = "constant_color")]
    ConstantColor,
    #[serde(rename = "GL_ONE_MINUS_CONSTANT_COLOR", alias = "one_minus_constant_color")]
    OneMinusConstantColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Rgba8Srgb,
    Depth24,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth24)
    }
}

#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: String,
    pub size: UVec2,
    pub format: TextureFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[serde(alias = "GL_NEAREST")]
    Nearest,
    #[serde(alias = "GL_LINEAR")]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    #[serde(alias = "GL_REPEAT")]
    Repeat,
    #[serde(alias = "GL_MIRRORED_REPEAT")]
    MirroredRepeat,
    #[serde(alias = "GL_CLAMP_TO_EDGE")]
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(default)]
pub struct SamplerDescriptor {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::Repeat,
        }
    }
}

/// Source of a program: one WGSL module per stage.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub label: String,
    pub vertex: String,
    pub fragment: String,
}

/// Texture binding points a material or pass assigns to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureBinding {
    Primary,
    Distortion,
    Albedo,
    Specular,
    AmbientOcclusion,
    Roughness,
    Emissive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightField {
    Kind,
    Position,
    Direction,
    Color,
    Diffuse,
    Specular,
    Attenuation,
    ConeAngles,
}

/// Uniform slots understood by every program in this renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformName {
    Transform,
    ViewProjection,
    Model,
    ModelInverseTranspose,
    Eye,
    Tint,
    AlphaThreshold,
    LightCount,
    Light(usize, LightField),
    Texture(TextureBinding),
    Effect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(glam::Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Int(value)
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<glam::Vec2> for UniformValue {
    fn from(value: glam::Vec2) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        UniformValue::Vec4(value)
    }
}

impl From<Mat4> for UniformValue {
    fn from(value: Mat4) -> Self {
        UniformValue::Mat4(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClearFlags {
    pub color: bool,
    pub depth: bool,
}

impl ClearFlags {
    pub const COLOR_AND_DEPTH: Self = Self {
        color: true,
        depth: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn from_size(size: UVec2) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.x,
            height: size.y,
        }
    }
}

pub trait GraphicsContext {
    fn create_program(&mut self, desc: &ProgramDescriptor) -> GraphicsResult<ProgramId>;
    fn delete_program(&mut self, program: ProgramId);

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        pixels: Option<&[u8]>,
    ) -> GraphicsResult<TextureId>;
    fn delete_texture(&mut self, texture: TextureId);

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> SamplerId;
    fn delete_sampler(&mut self, sampler: SamplerId);

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> MeshId;
    fn delete_mesh(&mut self, mesh: MeshId);

    fn create_framebuffer(
        &mut self,
        color: TextureId,
        depth: TextureId,
    ) -> GraphicsResult<FramebufferId>;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    fn create_vertex_array(&mut self) -> VertexArrayId;
    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId);

    fn set_capability(&mut self, capability: Capability, enabled: bool);
    fn set_cull_face(&mut self, face: Face);
    fn set_front_face(&mut self, winding: Winding);
    fn set_depth_function(&mut self, function: CompareFunction);
    fn set_blend_equation(&mut self, equation: BlendEquation);
    fn set_blend_factors(&mut self, source: BlendFactor, destination: BlendFactor);
    fn set_blend_constant(&mut self, color: Vec4);
    fn set_color_mask(&mut self, mask: [bool; 4]);
    fn set_depth_mask(&mut self, enabled: bool);
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_clear_color(&mut self, color: Vec4);
    fn set_clear_depth(&mut self, depth: f32);

    fn use_program(&mut self, program: ProgramId);
    fn set_uniform(&mut self, name: UniformName, value: UniformValue);

    fn active_texture(&mut self, unit: u32);
    /// Binds to the unit selected by `active_texture`.
    fn bind_texture(&mut self, texture: TextureId);
    /// Empties the unit selected by `active_texture`.
    fn unbind_texture(&mut self);
    fn bind_sampler(&mut self, unit: u32, sampler: Option<SamplerId>);

    /// `None` targets the presentation surface.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    fn clear(&mut self, flags: ClearFlags);
    fn draw_mesh(&mut self, mesh: MeshId);
    fn draw_arrays(&mut self, vertex_array: VertexArrayId, vertex_count: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_enums_accept_gl_names() {
        let face: Face = serde_json::from_str("\"GL_FRONT\"").unwrap();
        assert_eq!(face, Face::Front);
        let func: CompareFunction = serde_json::from_str("\"less_equal\"").unwrap();
        assert_eq!(func, CompareFunction::LessEqual);
        let factor: BlendFactor = serde_json::from_str("\"GL_ONE_MINUS_SRC_ALPHA\"").unwrap();
        assert_eq!(factor, BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn sampler_descriptor_defaults_missing_fields() {
        let desc: SamplerDescriptor =
            serde_json::from_str(r#"{"mag_filter": "GL_NEAREST"}"#).unwrap();
        assert_eq!(desc.mag_filter, FilterMode::Nearest);
        assert_eq!(desc.min_filter, FilterMode::Linear);
        assert_eq!(desc.wrap_s, WrapMode::Repeat);
    }
}
