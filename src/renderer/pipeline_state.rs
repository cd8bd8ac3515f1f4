// renderer/pipeline_state.rs
//! Fixed-function options a material needs that shaders cannot express.

use glam::Vec4;
use serde::Deserialize;

use crate::renderer::context::{
    BlendEquation, BlendFactor, Capability, CompareFunction, Face, GraphicsContext, Winding,
};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FaceCulling {
    pub enabled: bool,
    pub culled_face: Face,
    pub front_face: Winding,
}

impl Default for FaceCulling {
    fn default() -> Self {
        Self {
            enabled: false,
            culled_face: Face::Back,
            front_face: Winding::CounterClockwise,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DepthTesting {
    pub enabled: bool,
    pub function: CompareFunction,
}

impl Default for DepthTesting {
    fn default() -> Self {
        Self {
            enabled: false,
            function: CompareFunction::LessEqual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Blending {
    pub enabled: bool,
    pub equation: BlendEquation,
    pub source_factor: BlendFactor,
    pub destination_factor: BlendFactor,
    pub constant_color: Vec4,
}

impl Default for Blending {
    fn default() -> Self {
        Self {
            enabled: false,
            equation: BlendEquation::Add,
            source_factor: BlendFactor::SrcAlpha,
            destination_factor: BlendFactor::OneMinusSrcAlpha,
            constant_color: Vec4::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineState {
    pub face_culling: FaceCulling,
    pub depth_testing: DepthTesting,
    pub blending: Blending,
    pub color_mask: [bool; 4],
    pub depth_mask: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            face_culling: FaceCulling::default(),
            depth_testing: DepthTesting::default(),
            blending: Blending::default(),
            color_mask: [true; 4],
            depth_mask: true,
        }
    }
}

impl PipelineState {
    /// Writes every field to the device. Nothing is inherited from whatever
    /// the previous draw left behind, and nothing is restored afterwards.
    pub fn apply(&self, gfx: &mut dyn GraphicsContext) {
        gfx.set_color_mask(self.color_mask);
        gfx.set_depth_mask(self.depth_mask);

        gfx.set_capability(Capability::FaceCulling, self.face_culling.enabled);
        if self.face_culling.enabled {
            gfx.set_cull_face(self.face_culling.culled_face);
            gfx.set_front_face(self.face_culling.front_face);
        }

        gfx.set_capability(Capability::Blending, self.blending.enabled);
        if self.blending.enabled {
            gfx.set_blend_equation(self.blending.equation);
            gfx.set_blend_factors(
                self.blending.source_factor,
                self.blending.destination_factor,
            );
            gfx.set_blend_constant(self.blending.constant_color);
        }

        gfx.set_capability(Capability::DepthTest, self.depth_testing.enabled);
        if self.depth_testing.enabled {
            gfx.set_depth_function(self.depth_testing.function);
        }
    }

    /// Replaces this state with the one described by `data`. Keys missing
    /// from `data` take their defaults; a non-object leaves `self` untouched.
    pub fn deserialize(&mut self, data: &serde_json::Value) -> Result<(), serde_json::Error> {
        if !data.is_object() {
            return Ok(());
        }
        *self = PipelineState::deserialize_from(data)?;
        Ok(())
    }

    fn deserialize_from(data: &serde_json::Value) -> Result<Self, serde_json::Error> {
        <PipelineState as Deserialize>::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::RecordingContext;
    use serde_json::json;

    fn blended() -> PipelineState {
        PipelineState {
            face_culling: FaceCulling {
                enabled: true,
                culled_face: Face::Front,
                front_face: Winding::Clockwise,
            },
            depth_testing: DepthTesting {
                enabled: true,
                function: CompareFunction::Less,
            },
            blending: Blending {
                enabled: true,
                constant_color: Vec4::new(0.1, 0.2, 0.3, 0.4),
                ..Blending::default()
            },
            color_mask: [true, false, true, false],
            depth_mask: false,
        }
    }

    #[test]
    fn apply_is_idempotent() {
        let state = blended();
        let mut once = RecordingContext::new();
        state.apply(&mut once);

        let mut twice = RecordingContext::new();
        state.apply(&mut twice);
        state.apply(&mut twice);

        assert_eq!(once.state(), twice.state());
    }

    #[test]
    fn apply_overrides_previous_draw_state() {
        let mut gfx = RecordingContext::new();
        blended().apply(&mut gfx);
        PipelineState::default().apply(&mut gfx);

        let state = gfx.state();
        assert!(!state.face_culling);
        assert!(!state.blending);
        assert!(!state.depth_test);
        assert_eq!(state.color_mask, [true; 4]);
        assert!(state.depth_mask);
    }

    #[test]
    fn apply_sets_every_toggle() {
        let mut gfx = RecordingContext::new();
        blended().apply(&mut gfx);
        let state = gfx.state();
        assert!(state.face_culling);
        assert_eq!(state.cull_face, Face::Front);
        assert_eq!(state.front_face, Winding::Clockwise);
        assert_eq!(state.depth_function, CompareFunction::Less);
        assert_eq!(
            state.blend_factors,
            (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)
        );
        assert_eq!(state.blend_constant, Vec4::new(0.1, 0.2, 0.3, 0.4));
        assert_eq!(state.color_mask, [true, false, true, false]);
        assert!(!state.depth_mask);
    }

    #[test]
    fn deserialize_reads_nested_groups() {
        let mut state = PipelineState::default();
        state
            .deserialize(&json!({
                "faceCulling": { "enabled": true, "culledFace": "GL_FRONT" },
                "depthTesting": { "enabled": true, "function": "GL_LESS" },
                "blending": {
                    "enabled": true,
                    "sourceFactor": "GL_ONE",
                    "destinationFactor": "GL_ONE",
                    "constantColor": [1.0, 0.0, 0.0, 1.0]
                },
                "depthMask": false
            }))
            .unwrap();

        assert!(state.face_culling.enabled);
        assert_eq!(state.face_culling.culled_face, Face::Front);
        assert_eq!(state.face_culling.front_face, Winding::CounterClockwise);
        assert_eq!(state.depth_testing.function, CompareFunction::Less);
        assert_eq!(state.blending.source_factor, BlendFactor::One);
        assert_eq!(state.blending.equation, BlendEquation::Add);
        assert_eq!(state.blending.constant_color, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(state.color_mask, [true; 4]);
        assert!(!state.depth_mask);
    }

    #[test]
    fn deserialize_ignores_non_objects() {
        let mut state = blended();
        state.deserialize(&json!("opaque")).unwrap();
        assert_eq!(state, blended());
    }
}
