// renderer/material.rs
//! Shading configuration attached to every draw.
//!
//! A material is one of four kinds, each a superset of the previous one:
//! `Base` (pipeline state + shader), `Tinted` (+ tint color), `Textured`
//! (+ texture, sampler and alpha cutoff) and `Lit` (+ five optional maps on
//! fixed texture units). Setup and deserialization walk a fixed list of
//! stages and run every stage whose kind is at or below the material's.

use glam::Vec4;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::asset::Assets;
use crate::renderer::context::{
    GraphicsContext, ProgramId, SamplerId, TextureBinding, TextureId, UniformName, UniformValue,
};
use crate::renderer::pipeline_state::PipelineState;

#[derive(Error, Debug)]
pub enum MaterialError {
    #[error("Material has no 'shader' entry")]
    MissingShader,
    #[error("Material references unknown shader '{0}'")]
    UnknownShader(String),
    #[error("Unknown material type '{0}'")]
    UnknownKind(String),
    #[error("Invalid value for '{key}': {source}")]
    InvalidField {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    #[serde(alias = "material")]
    Base,
    Tinted,
    Textured,
    Lit,
}

impl MaterialKind {
    /// Reads the `type` key; a missing key means a plain material.
    pub fn from_json(data: &Value) -> Result<Self, MaterialError> {
        match data.get("type").and_then(Value::as_str) {
            None => Ok(MaterialKind::Base),
            Some(name) => serde_json::from_value(Value::String(name.to_string()))
                .map_err(|_| MaterialError::UnknownKind(name.to_string())),
        }
    }
}

/// Texture maps of a lit material, one per texture unit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LitMaps {
    pub albedo: Option<TextureId>,
    pub specular: Option<TextureId>,
    pub ambient_occlusion: Option<TextureId>,
    pub roughness: Option<TextureId>,
    pub emissive: Option<TextureId>,
}

impl LitMaps {
    pub const KEYS: [&'static str; 5] = [
        "albedo",
        "specular",
        "ambient_occlusion",
        "roughness",
        "emissive",
    ];

    /// `(unit, binding, texture)` in unit order.
    pub fn slots(&self) -> [(u32, TextureBinding, Option<TextureId>); 5] {
        [
            (0, TextureBinding::Albedo, self.albedo),
            (1, TextureBinding::Specular, self.specular),
            (2, TextureBinding::AmbientOcclusion, self.ambient_occlusion),
            (3, TextureBinding::Roughness, self.roughness),
            (4, TextureBinding::Emissive, self.emissive),
        ]
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<TextureId>> {
        match key {
            "albedo" => Some(&mut self.albedo),
            "specular" => Some(&mut self.specular),
            "ambient_occlusion" => Some(&mut self.ambient_occlusion),
            "roughness" => Some(&mut self.roughness),
            "emissive" => Some(&mut self.emissive),
            _ => None,
        }
    }

    pub fn count(&self) -> usize {
        self.slots().iter().filter(|(_, _, tex)| tex.is_some()).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub kind: MaterialKind,
    pub shader: ProgramId,
    pub pipeline_state: PipelineState,
    pub transparent: bool,
    pub tint: Vec4,
    pub alpha_threshold: f32,
    pub texture: Option<TextureId>,
    pub sampler: Option<SamplerId>,
    pub maps: LitMaps,
}

type SetupStage = fn(&Material, &mut dyn GraphicsContext);
type DeserializeStage = fn(&mut Material, &Map<String, Value>, &Assets) -> Result<(), MaterialError>;

const SETUP_STAGES: [(MaterialKind, SetupStage); 5] = [
    (MaterialKind::Base, Material::apply_pipeline_state),
    (MaterialKind::Base, Material::activate_shader),
    (MaterialKind::Tinted, Material::upload_tint),
    (MaterialKind::Textured, Material::bind_primary_texture),
    (MaterialKind::Lit, Material::bind_lit_maps),
];

const DESERIALIZE_STAGES: [(MaterialKind, DeserializeStage); 4] = [
    (MaterialKind::Base, Material::read_base),
    (MaterialKind::Tinted, Material::read_tint),
    (MaterialKind::Textured, Material::read_texture),
    (MaterialKind::Lit, Material::read_lit_maps),
];

impl Material {
    pub fn new(kind: MaterialKind, shader: ProgramId) -> Self {
        Self {
            kind,
            shader,
            pipeline_state: PipelineState::default(),
            transparent: false,
            tint: Vec4::ONE,
            alpha_threshold: 0.0,
            texture: None,
            sampler: None,
            maps: LitMaps::default(),
        }
    }

    pub fn with_pipeline_state(mut self, state: PipelineState) -> Self {
        self.pipeline_state = state;
        self
    }

    pub fn with_tint(mut self, tint: Vec4) -> Self {
        self.tint = tint;
        self
    }

    pub fn with_texture(mut self, texture: TextureId, sampler: SamplerId) -> Self {
        self.texture = Some(texture);
        self.sampler = Some(sampler);
        self
    }

    pub fn with_alpha_threshold(mut self, threshold: f32) -> Self {
        self.alpha_threshold = threshold;
        self
    }

    pub fn transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Builds a material from a scene entry. `type` selects the kind and
    /// `shader` must name a loaded program.
    pub fn load(data: &Value, assets: &Assets) -> Result<Self, MaterialError> {
        let kind = MaterialKind::from_json(data)?;
        let shader = resolve_shader(data.get("shader"), assets)?;
        let mut material = Material::new(kind, shader);
        material.deserialize(data, assets)?;
        Ok(material)
    }

    pub fn supports_lighting(&self) -> bool {
        self.kind == MaterialKind::Lit
    }

    /// Configures the device for drawing with this material.
    pub fn setup(&self, gfx: &mut dyn GraphicsContext) {
        for (level, stage) in SETUP_STAGES {
            if self.kind >= level {
                stage(self, gfx);
            }
        }
    }

    /// Reads the keys of every level up to this material's kind. A non-object
    /// leaves the material unchanged.
    pub fn deserialize(&mut self, data: &Value, assets: &Assets) -> Result<(), MaterialError> {
        let Some(object) = data.as_object() else {
            return Ok(());
        };
        for (level, stage) in DESERIALIZE_STAGES {
            if self.kind >= level {
                stage(self, object, assets)?;
            }
        }
        Ok(())
    }

    fn apply_pipeline_state(&self, gfx: &mut dyn GraphicsContext) {
        self.pipeline_state.apply(gfx);
    }

    fn activate_shader(&self, gfx: &mut dyn GraphicsContext) {
        gfx.use_program(self.shader);
    }

    fn upload_tint(&self, gfx: &mut dyn GraphicsContext) {
        gfx.set_uniform(UniformName::Tint, self.tint.into());
    }

    fn bind_primary_texture(&self, gfx: &mut dyn GraphicsContext) {
        gfx.set_uniform(UniformName::AlphaThreshold, self.alpha_threshold.into());
        gfx.active_texture(0);
        if let Some(texture) = self.texture {
            gfx.bind_texture(texture);
        }
        if let Some(sampler) = self.sampler {
            gfx.bind_sampler(0, Some(sampler));
        }
        gfx.set_uniform(
            UniformName::Texture(TextureBinding::Primary),
            UniformValue::Int(0),
        );
    }

    fn bind_lit_maps(&self, gfx: &mut dyn GraphicsContext) {
        for (unit, binding, texture) in self.maps.slots() {
            let Some(texture) = texture else {
                continue;
            };
            gfx.active_texture(unit);
            gfx.bind_texture(texture);
            if let Some(sampler) = self.sampler {
                gfx.bind_sampler(unit, Some(sampler));
            }
            gfx.set_uniform(UniformName::Texture(binding), UniformValue::Int(unit as i32));
        }
        gfx.active_texture(0);
    }

    fn read_base(
        &mut self,
        data: &Map<String, Value>,
        assets: &Assets,
    ) -> Result<(), MaterialError> {
        if let Some(state) = data.get("pipelineState") {
            self.pipeline_state
                .deserialize(state)
                .map_err(|source| MaterialError::InvalidField {
                    key: "pipelineState",
                    source,
                })?;
        }
        self.shader = resolve_shader(data.get("shader"), assets)?;
        self.transparent = read_or(data, "transparent", false)?;
        Ok(())
    }

    fn read_tint(&mut self, data: &Map<String, Value>, _: &Assets) -> Result<(), MaterialError> {
        self.tint = read_or(data, "tint", Vec4::ONE)?;
        Ok(())
    }

    fn read_texture(
        &mut self,
        data: &Map<String, Value>,
        assets: &Assets,
    ) -> Result<(), MaterialError> {
        self.alpha_threshold = read_or(data, "alphaThreshold", 0.0)?;
        self.texture = assets.texture(str_or_empty(data, "texture"));
        self.sampler = assets.sampler(str_or_empty(data, "sampler"));
        Ok(())
    }

    fn read_lit_maps(
        &mut self,
        data: &Map<String, Value>,
        assets: &Assets,
    ) -> Result<(), MaterialError> {
        for key in LitMaps::KEYS {
            if !data.contains_key(key) {
                continue;
            }
            if let Some(slot) = self.maps.slot_mut(key) {
                *slot = assets.texture(str_or_empty(data, key));
            }
        }
        Ok(())
    }
}

fn resolve_shader(shader: Option<&Value>, assets: &Assets) -> Result<ProgramId, MaterialError> {
    let name = shader
        .and_then(Value::as_str)
        .ok_or(MaterialError::MissingShader)?;
    assets
        .shader(name)
        .ok_or_else(|| MaterialError::UnknownShader(name.to_string()))
}

fn read_or<T: serde::de::DeserializeOwned>(
    data: &Map<String, Value>,
    key: &'static str,
    default: T,
) -> Result<T, MaterialError> {
    match data.get(key) {
        None => Ok(default),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|source| MaterialError::InvalidField { key, source }),
    }
}

fn str_or_empty<'a>(data: &'a Map<String, Value>, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::context::{ProgramDescriptor, SamplerDescriptor, TextureDescriptor, TextureFormat};
    use crate::renderer::recording::{DeviceCommand, RecordingContext};
    use glam::UVec2;
    use serde_json::json;

    fn assets_with_shader(gfx: &mut RecordingContext) -> Assets {
        let mut assets = Assets::new();
        let program = gfx
            .create_program(&ProgramDescriptor {
                label: "S".into(),
                vertex: "vs".into(),
                fragment: "fs".into(),
            })
            .unwrap();
        assets.shaders.insert_named("S", program);
        assets
    }

    fn add_texture(gfx: &mut RecordingContext, assets: &mut Assets, name: &str) -> TextureId {
        let texture = gfx
            .create_texture(
                &TextureDescriptor {
                    label: name.into(),
                    size: UVec2::ONE,
                    format: TextureFormat::Rgba8,
                },
                None,
            )
            .unwrap();
        assets.textures.insert_named(name, texture);
        texture
    }

    #[test]
    fn deserialize_reads_transparency_and_tint() {
        let mut gfx = RecordingContext::new();
        let assets = assets_with_shader(&mut gfx);
        let material = Material::load(
            &json!({ "type": "tinted", "shader": "S", "transparent": true, "tint": [1, 0, 0, 1] }),
            &assets,
        )
        .unwrap();
        assert!(material.transparent);
        assert_eq!(material.tint, Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn deserialize_applies_defaults() {
        let mut gfx = RecordingContext::new();
        let assets = assets_with_shader(&mut gfx);
        let material = Material::load(&json!({ "type": "textured", "shader": "S" }), &assets).unwrap();
        assert!(!material.transparent);
        assert_eq!(material.tint, Vec4::ONE);
        assert_eq!(material.alpha_threshold, 0.0);
        assert_eq!(material.texture, None);
        assert_eq!(material.sampler, None);
    }

    #[test]
    fn missing_shader_is_an_error() {
        let assets = Assets::new();
        assert!(matches!(
            Material::load(&json!({ "type": "tinted" }), &assets),
            Err(MaterialError::MissingShader)
        ));
        assert!(matches!(
            Material::load(&json!({ "shader": "nope" }), &assets),
            Err(MaterialError::UnknownShader(name)) if name == "nope"
        ));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let mut gfx = RecordingContext::new();
        let assets = assets_with_shader(&mut gfx);
        assert!(matches!(
            Material::load(&json!({ "type": "glossy", "shader": "S" }), &assets),
            Err(MaterialError::UnknownKind(_))
        ));
    }

    #[test]
    fn non_object_deserialize_is_a_no_op() {
        let mut gfx = RecordingContext::new();
        let assets = assets_with_shader(&mut gfx);
        let mut material = Material::load(&json!({ "type": "lit", "shader": "S" }), &assets).unwrap();
        let before = material.clone();
        material.deserialize(&json!([1, 2, 3]), &assets).unwrap();
        assert_eq!(material, before);
    }

    #[test]
    fn lit_maps_are_read_only_when_present() {
        let mut gfx = RecordingContext::new();
        let mut assets = assets_with_shader(&mut gfx);
        let albedo = add_texture(&mut gfx, &mut assets, "wood");
        let material = Material::load(
            &json!({ "type": "lit", "shader": "S", "albedo": "wood", "emissive": "missing" }),
            &assets,
        )
        .unwrap();
        assert_eq!(material.maps.albedo, Some(albedo));
        assert_eq!(material.maps.emissive, None);
        assert_eq!(material.maps.count(), 1);
    }

    #[test]
    fn setup_runs_stages_in_order() {
        let mut gfx = RecordingContext::new();
        let mut assets = assets_with_shader(&mut gfx);
        let texture = add_texture(&mut gfx, &mut assets, "albedo");
        let sampler = gfx.create_sampler(&SamplerDescriptor::default());
        let mut material = Material::new(MaterialKind::Textured, assets.shader("S").unwrap())
            .with_texture(texture, sampler);
        material.pipeline_state.depth_mask = false;

        gfx.clear_recording();
        material.setup(&mut gfx);
        let commands = gfx.commands();

        let position = |pred: &dyn Fn(&DeviceCommand) -> bool| commands.iter().position(pred).unwrap();
        let mask = position(&|c| matches!(c, DeviceCommand::SetDepthMask(false)));
        let program = position(&|c| matches!(c, DeviceCommand::UseProgram(_)));
        let tint = position(&|c| matches!(c, DeviceCommand::SetUniform(UniformName::Tint, _)));
        let alpha = position(&|c| matches!(c, DeviceCommand::SetUniform(UniformName::AlphaThreshold, _)));
        let bind = position(&|c| matches!(c, DeviceCommand::BindTexture { unit: 0, .. }));
        assert!(mask < program && program < tint && tint < alpha && alpha < bind);
        assert_eq!(gfx.state().samplers[0], Some(sampler));
    }

    #[test]
    fn lit_without_maps_binds_nothing() {
        let mut gfx = RecordingContext::new();
        let assets = assets_with_shader(&mut gfx);
        let material = Material::new(MaterialKind::Lit, assets.shader("S").unwrap());
        material.setup(&mut gfx);
        assert_eq!(gfx.texture_bind_count(), 0);
        assert_eq!(gfx.state().active_unit, 0);
    }

    #[test]
    fn lit_maps_bind_to_fixed_units_and_restore_unit_zero() {
        let mut gfx = RecordingContext::new();
        let mut assets = assets_with_shader(&mut gfx);
        let specular = add_texture(&mut gfx, &mut assets, "spec");
        let emissive = add_texture(&mut gfx, &mut assets, "glow");
        let sampler = gfx.create_sampler(&SamplerDescriptor::default());
        let mut material = Material::new(MaterialKind::Lit, assets.shader("S").unwrap());
        material.sampler = Some(sampler);
        material.maps.specular = Some(specular);
        material.maps.emissive = Some(emissive);

        material.setup(&mut gfx);
        let state = gfx.state();
        assert_eq!(state.textures[1], Some(specular));
        assert_eq!(state.textures[4], Some(emissive));
        assert_eq!(state.textures[2], None);
        assert_eq!(state.samplers[1], Some(sampler));
        assert_eq!(state.samplers[4], Some(sampler));
        assert_eq!(state.active_unit, 0);
        assert!(material.supports_lighting());
    }
}
