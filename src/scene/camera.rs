use glam::{Mat4, Vec3};
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective { fov_y_radians: f32 },
    Orthographic { height: f32 },
}

/// Camera component. Position and orientation come from the owning entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Projection::Perspective {
                fov_y_radians: 90f32.to_radians(),
            },
            near: 0.01,
            far: 100.0,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum CameraType {
    Perspective,
    Orthographic,
}

#[derive(Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CameraDesc {
    camera_type: CameraType,
    near: f32,
    far: f32,
    /// Degrees.
    fov_y: f32,
    ortho_height: f32,
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            camera_type: CameraType::Perspective,
            near: 0.01,
            far: 100.0,
            fov_y: 90.0,
            ortho_height: 1.0,
        }
    }
}

impl Camera {
    pub fn perspective(fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Perspective { fov_y_radians },
            near,
            far,
        }
    }

    pub fn orthographic(height: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Orthographic { height },
            near,
            far,
        }
    }

    pub fn from_json(data: &serde_json::Value) -> Result<Self, serde_json::Error> {
        if !data.is_object() {
            return Ok(Self::default());
        }
        let desc = CameraDesc::deserialize(data)?;
        let projection = match desc.camera_type {
            CameraType::Perspective => Projection::Perspective {
                fov_y_radians: desc.fov_y.to_radians(),
            },
            CameraType::Orthographic => Projection::Orthographic {
                height: desc.ortho_height,
            },
        };
        Ok(Self {
            projection,
            near: desc.near,
            far: desc.far,
        })
    }

    /// Looks from the owner's origin towards its local -Z, with its local +Y up.
    pub fn view(local_to_world: Mat4) -> Mat4 {
        let eye = local_to_world.transform_point3(Vec3::ZERO);
        let center = local_to_world.transform_point3(Vec3::NEG_Z);
        let up = local_to_world.transform_vector3(Vec3::Y);
        Mat4::look_at_rh(eye, center, up)
    }

    pub fn proj(&self, aspect: f32) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov_y_radians } => {
                Mat4::perspective_rh(fov_y_radians, aspect, self.near, self.far)
            }
            Projection::Orthographic { height } => {
                let half_h = height * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
        }
    }

    pub fn view_proj(&self, local_to_world: Mat4, aspect: f32) -> Mat4 {
        self.proj(aspect) * Self::view(local_to_world)
    }
}
