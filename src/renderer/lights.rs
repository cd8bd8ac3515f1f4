// renderer/lights.rs
use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::Deserialize;

use crate::renderer::context::{GraphicsContext, LightField, UniformName};

/// Size of the light array every lit shader declares.
pub const MAX_LIGHTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

impl LightKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DIRECTIONAL" => Some(LightKind::Directional),
            "POINT" => Some(LightKind::Point),
            "SPOT" => Some(LightKind::Spot),
            _ => None,
        }
    }

    /// Type code shared with the shaders.
    pub fn code(self) -> i32 {
        match self {
            LightKind::Directional => 0,
            LightKind::Point => 1,
            LightKind::Spot => 2,
        }
    }
}

/// Light source attached to an entity. Position and direction come from the
/// owner's transform every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// `None` for an unrecognized type; such lights are never uploaded.
    pub kind: Option<LightKind>,
    pub color: Vec4,
    pub diffuse: Vec3,
    pub specular: Vec3,
    /// Constant, linear and quadratic terms.
    pub attenuation: Vec3,
    /// Inner and outer cone angles in radians.
    pub cone_angles: Vec2,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: Some(LightKind::Directional),
            color: Vec4::ONE,
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
            attenuation: Vec3::X,
            cone_angles: Vec2::ZERO,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct LightDesc {
    #[serde(rename = "typeOfLight")]
    type_of_light: String,
    color: Vec4,
    diffuse: Vec3,
    specular: Vec3,
    attenuation: Vec3,
    cone_angles: Option<ConeAngles>,
    #[serde(rename = "cone_angles.in")]
    cone_in: Option<f32>,
    #[serde(rename = "cone_angles.out")]
    cone_out: Option<f32>,
}

impl Default for LightDesc {
    fn default() -> Self {
        Self {
            type_of_light: "DIRECTIONAL".to_string(),
            color: Vec4::ONE,
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
            attenuation: Vec3::X,
            cone_angles: None,
            cone_in: None,
            cone_out: None,
        }
    }
}

#[derive(Deserialize)]
struct ConeAngles {
    #[serde(rename = "in")]
    inner: Option<f32>,
    #[serde(rename = "out")]
    outer: Option<f32>,
}

const DEFAULT_CONE_DEGREES: Vec2 = Vec2::new(10.0, 80.0);

impl Light {
    pub fn directional() -> Self {
        Self::default()
    }

    pub fn point(attenuation: Vec3) -> Self {
        Self {
            kind: Some(LightKind::Point),
            attenuation,
            ..Self::default()
        }
    }

    pub fn spot(attenuation: Vec3, inner_degrees: f32, outer_degrees: f32) -> Self {
        Self {
            kind: Some(LightKind::Spot),
            attenuation,
            cone_angles: Vec2::new(inner_degrees.to_radians(), outer_degrees.to_radians()),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    /// Shader type code, negative when the type was not recognized.
    pub fn type_code(&self) -> i32 {
        self.kind.map_or(-1, LightKind::code)
    }

    /// Attenuation is read for point and spot lights only, cone angles
    /// (degrees in the document) for spot lights only. A non-object yields
    /// the default light.
    pub fn from_json(data: &serde_json::Value) -> Result<Self, serde_json::Error> {
        if !data.is_object() {
            return Ok(Self::default());
        }
        let desc = LightDesc::deserialize(data)?;
        let kind = LightKind::from_name(&desc.type_of_light);
        if kind.is_none() {
            log::warn!(
                "Unknown light type '{}'; the light will be ignored",
                desc.type_of_light
            );
        }

        let mut light = Light {
            kind,
            color: desc.color,
            diffuse: desc.diffuse,
            specular: desc.specular,
            ..Light::default()
        };
        if kind != Some(LightKind::Directional) {
            light.attenuation = desc.attenuation;
        }
        if kind == Some(LightKind::Spot) {
            let nested = desc.cone_angles.as_ref();
            let inner = desc
                .cone_in
                .or_else(|| nested.and_then(|c| c.inner))
                .unwrap_or(DEFAULT_CONE_DEGREES.x);
            let outer = desc
                .cone_out
                .or_else(|| nested.and_then(|c| c.outer))
                .unwrap_or(DEFAULT_CONE_DEGREES.y);
            light.cone_angles = Vec2::new(inner.to_radians(), outer.to_radians());
        }
        Ok(light)
    }
}

/// A light paired with its owner's world transform for the current frame.
/// Rebuilt every frame so moving owners are always picked up.
#[derive(Debug, Clone, Copy)]
pub struct LightSnapshot {
    pub light: Light,
    pub local_to_world: Mat4,
}

impl LightSnapshot {
    pub fn new(light: Light, local_to_world: Mat4) -> Self {
        Self {
            light,
            local_to_world,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.local_to_world.transform_point3(Vec3::ZERO)
    }

    /// The owner's local -Z axis in world space.
    pub fn direction(&self) -> Vec3 {
        self.local_to_world
            .transform_vector3(Vec3::NEG_Z)
            .normalize_or_zero()
    }
}

/// Drops entries past [`MAX_LIGHTS`], keeping traversal order. Returns how
/// many were dropped.
pub fn truncate_lights(lights: &mut Vec<LightSnapshot>) -> usize {
    let dropped = lights.len().saturating_sub(MAX_LIGHTS);
    lights.truncate(MAX_LIGHTS);
    dropped
}

/// Uploads the light array to the program currently in use. Lights with a
/// negative type code keep their slot but only the type is written.
pub fn upload_lights(gfx: &mut dyn GraphicsContext, lights: &[LightSnapshot]) {
    let count = lights.len().min(MAX_LIGHTS);
    gfx.set_uniform(UniformName::LightCount, (count as i32).into());

    for (index, snapshot) in lights.iter().take(count).enumerate() {
        let light = &snapshot.light;
        let code = light.type_code();
        gfx.set_uniform(UniformName::Light(index, LightField::Kind), code.into());
        if code < 0 {
            continue;
        }
        let field = |field| UniformName::Light(index, field);
        gfx.set_uniform(field(LightField::Position), snapshot.position().into());
        gfx.set_uniform(field(LightField::Direction), snapshot.direction().into());
        gfx.set_uniform(field(LightField::Color), light.color.into());
        gfx.set_uniform(field(LightField::Diffuse), light.diffuse.into());
        gfx.set_uniform(field(LightField::Specular), light.specular.into());
        gfx.set_uniform(field(LightField::Attenuation), light.attenuation.into());
        gfx.set_uniform(field(LightField::ConeAngles), light.cone_angles.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::context::{ProgramDescriptor, UniformValue};
    use crate::renderer::recording::{DeviceCommand, RecordingContext};
    use glam::Quat;
    use serde_json::json;

    #[test]
    fn json_defaults_follow_light_type() {
        let directional = Light::from_json(&json!({ "attenuation": [0, 1, 0] })).unwrap();
        assert_eq!(directional.kind, Some(LightKind::Directional));
        assert_eq!(directional.attenuation, Vec3::X);
        assert_eq!(directional.diffuse, Vec3::ONE);

        let point = Light::from_json(&json!({ "typeOfLight": "POINT" })).unwrap();
        assert_eq!(point.type_code(), 1);
        assert_eq!(point.attenuation, Vec3::X);
        assert_eq!(point.cone_angles, Vec2::ZERO);

        let spot = Light::from_json(&json!({ "typeOfLight": "SPOT" })).unwrap();
        assert!(spot
            .cone_angles
            .abs_diff_eq(Vec2::new(10f32.to_radians(), 80f32.to_radians()), 1e-6));
    }

    #[test]
    fn spot_cone_accepts_flat_and_nested_keys() {
        let flat = Light::from_json(&json!({ "typeOfLight": "SPOT", "cone_angles.in": 20 })).unwrap();
        assert!((flat.cone_angles.x - 20f32.to_radians()).abs() < 1e-6);

        let nested =
            Light::from_json(&json!({ "typeOfLight": "SPOT", "cone_angles": { "out": 45 } })).unwrap();
        assert!((nested.cone_angles.y - 45f32.to_radians()).abs() < 1e-6);
        assert!((nested.cone_angles.x - 10f32.to_radians()).abs() < 1e-6);
    }

    #[test]
    fn unknown_type_has_negative_code() {
        let light = Light::from_json(&json!({ "typeOfLight": "AREA" })).unwrap();
        assert!(light.type_code() < 0);
    }

    #[test]
    fn snapshot_follows_transform() {
        let light = Light::directional();
        let transform = Mat4::from_rotation_translation(
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let snapshot = LightSnapshot::new(light, transform);
        assert!(snapshot.position().abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        assert!(snapshot.direction().abs_diff_eq(Vec3::NEG_X, 1e-6));
    }

    #[test]
    fn truncation_keeps_first_lights() {
        let mut snapshots: Vec<_> = (0..MAX_LIGHTS + 3)
            .map(|i| {
                let light = Light::point(Vec3::X).with_color(Vec4::splat(i as f32));
                LightSnapshot::new(light, Mat4::IDENTITY)
            })
            .collect();
        assert_eq!(truncate_lights(&mut snapshots), 3);
        assert_eq!(snapshots.len(), MAX_LIGHTS);
        assert_eq!(snapshots[MAX_LIGHTS - 1].light.color, Vec4::splat(15.0));
    }

    #[test]
    fn upload_skips_parameters_of_unknown_lights() {
        let mut gfx = RecordingContext::new();
        let program = gfx
            .create_program(&ProgramDescriptor {
                label: "lit".into(),
                vertex: "vs".into(),
                fragment: "fs".into(),
            })
            .unwrap();
        gfx.use_program(program);

        let unknown = Light {
            kind: None,
            ..Light::default()
        };
        let point = Light::point(Vec3::new(1.0, 0.1, 0.01));
        let snapshots = [
            LightSnapshot::new(unknown, Mat4::IDENTITY),
            LightSnapshot::new(point, Mat4::from_translation(Vec3::Y)),
        ];
        upload_lights(&mut gfx, &snapshots);

        let uploaded = |name: UniformName| {
            gfx.commands().iter().find_map(|cmd| match cmd {
                DeviceCommand::SetUniform(n, value) if *n == name => Some(*value),
                _ => None,
            })
        };
        assert_eq!(uploaded(UniformName::LightCount), Some(UniformValue::Int(2)));
        assert_eq!(
            uploaded(UniformName::Light(0, LightField::Kind)),
            Some(UniformValue::Int(-1))
        );
        assert_eq!(uploaded(UniformName::Light(0, LightField::Position)), None);
        assert_eq!(
            uploaded(UniformName::Light(1, LightField::Position)),
            Some(UniformValue::Vec3(Vec3::Y))
        );
    }
}
