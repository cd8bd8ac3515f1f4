// scene/components.rs
// Plain hecs components. Each entity carries at most one of each.

use crate::asset::Handle;
use crate::renderer::context::MeshId;
use crate::renderer::Material;

pub use crate::renderer::lights::Light;
pub use crate::scene::camera::Camera;
pub use crate::scene::transform::Transform;

/// Draws `mesh` with `material` at the owner's world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshRenderer {
    pub mesh: MeshId,
    pub material: Handle<Material>,
}

/// Name component for debugging and lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Parent entity reference; the local transform is relative to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub hecs::Entity);
