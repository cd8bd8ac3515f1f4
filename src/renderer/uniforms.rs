// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::renderer::context::{LightField, UniformName, UniformValue};
use crate::renderer::lights::MAX_LIGHTS;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct GpuLight {
    pub kind: [i32; 4],
    pub position: [f32; 4],
    pub direction: [f32; 4],
    pub color: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub attenuation: [f32; 4],
    pub cone_angles: [f32; 4],
}

/// Mirror of `DrawUniforms` in common.wgsl. One copy is written per draw.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct DrawUniforms {
    pub transform: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub model_inverse_transpose: [[f32; 4]; 4],
    pub tint: [f32; 4],
    pub eye: [f32; 4],
    pub alpha_threshold: f32,
    pub light_count: i32,
    pub effect: i32,
    pub texture_flags: u32,
    pub lights: [GpuLight; MAX_LIGHTS],
}

impl DrawUniforms {
    pub fn new() -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.transform = Mat4::IDENTITY.to_cols_array_2d();
        uniforms.view_projection = Mat4::IDENTITY.to_cols_array_2d();
        uniforms.model = Mat4::IDENTITY.to_cols_array_2d();
        uniforms.model_inverse_transpose = Mat4::IDENTITY.to_cols_array_2d();
        uniforms.tint = Vec4::ONE.to_array();
        uniforms
    }

    /// Writes one named value. Mismatched value types and texture unit
    /// assignments (fixed by binding slot) are ignored.
    pub fn set(&mut self, name: UniformName, value: UniformValue) {
        match (name, value) {
            (UniformName::Transform, UniformValue::Mat4(m)) => {
                self.transform = m.to_cols_array_2d()
            }
            (UniformName::ViewProjection, UniformValue::Mat4(m)) => {
                self.view_projection = m.to_cols_array_2d()
            }
            (UniformName::Model, UniformValue::Mat4(m)) => self.model = m.to_cols_array_2d(),
            (UniformName::ModelInverseTranspose, UniformValue::Mat4(m)) => {
                self.model_inverse_transpose = m.to_cols_array_2d()
            }
            (UniformName::Tint, UniformValue::Vec4(v)) => self.tint = v.to_array(),
            (UniformName::Eye, UniformValue::Vec3(v)) => self.eye = v.extend(1.0).to_array(),
            (UniformName::AlphaThreshold, UniformValue::Float(f)) => self.alpha_threshold = f,
            (UniformName::LightCount, UniformValue::Int(i)) => self.light_count = i,
            (UniformName::Effect, UniformValue::Int(i)) => self.effect = i,
            (UniformName::Light(index, field), value) if index < MAX_LIGHTS => {
                self.lights[index].set(field, value)
            }
            (UniformName::Texture(_), _) => {}
            (name, value) => log::trace!("Ignoring uniform {:?} = {:?}", name, value),
        }
    }
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuLight {
    fn set(&mut self, field: LightField, value: UniformValue) {
        let slot = match field {
            LightField::Kind => {
                if let UniformValue::Int(kind) = value {
                    self.kind = [kind, 0, 0, 0];
                }
                return;
            }
            LightField::Position => &mut self.position,
            LightField::Direction => &mut self.direction,
            LightField::Color => &mut self.color,
            LightField::Diffuse => &mut self.diffuse,
            LightField::Specular => &mut self.specular,
            LightField::Attenuation => &mut self.attenuation,
            LightField::ConeAngles => &mut self.cone_angles,
        };
        *slot = match value {
            UniformValue::Float(f) => [f, 0.0, 0.0, 0.0],
            UniformValue::Vec2(v) => [v.x, v.y, 0.0, 0.0],
            UniformValue::Vec3(v) => v.extend(0.0).to_array(),
            UniformValue::Vec4(v) => v.to_array(),
            UniformValue::Int(_) | UniformValue::Mat4(_) => return,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    #[test]
    fn draw_uniforms_match_wgsl_layout() {
        // 4 * mat4 + 2 * vec4 + 4 scalars + 16 * 128-byte lights
        assert_eq!(std::mem::size_of::<GpuLight>(), 128);
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 2352);
    }

    #[test]
    fn set_routes_light_fields() {
        let mut uniforms = DrawUniforms::new();
        uniforms.set(UniformName::Light(3, LightField::Kind), UniformValue::Int(2));
        uniforms.set(
            UniformName::Light(3, LightField::ConeAngles),
            Vec2::new(0.1, 0.2).into(),
        );
        uniforms.set(UniformName::Light(3, LightField::Position), Vec3::ONE.into());
        assert_eq!(uniforms.lights[3].kind[0], 2);
        assert_eq!(uniforms.lights[3].cone_angles, [0.1, 0.2, 0.0, 0.0]);
        assert_eq!(uniforms.lights[3].position, [1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn out_of_range_light_is_ignored() {
        let mut uniforms = DrawUniforms::new();
        let before = uniforms;
        uniforms.set(UniformName::Light(MAX_LIGHTS, LightField::Kind), UniformValue::Int(1));
        assert_eq!(uniforms, before);
    }
}
