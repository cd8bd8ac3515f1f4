// renderer/command.rs
use glam::{Mat4, Vec3};

use crate::renderer::context::MeshId;
use crate::renderer::Material;

/// One mesh instance to draw this frame. Built during traversal and dropped
/// at the end of the frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderCommand<'a> {
    pub local_to_world: Mat4,
    /// World-space origin of the instance; only used for ordering.
    pub center: Vec3,
    pub mesh: MeshId,
    pub material: &'a Material,
}

impl<'a> RenderCommand<'a> {
    pub fn new(local_to_world: Mat4, mesh: MeshId, material: &'a Material) -> Self {
        Self {
            local_to_world,
            center: local_to_world.transform_point3(Vec3::ZERO),
            mesh,
            material,
        }
    }

    /// Distance of the center along the view axis.
    pub fn view_depth(&self, forward: Vec3) -> f32 {
        forward.dot(self.center)
    }
}

/// Commands split by draw phase.
#[derive(Debug, Default)]
pub struct CommandLists<'a> {
    pub opaque: Vec<RenderCommand<'a>>,
    pub transparent: Vec<RenderCommand<'a>>,
}

impl<'a> CommandLists<'a> {
    pub fn new() -> Self {
        Self {
            opaque: Vec::new(),
            transparent: Vec::new(),
        }
    }

    /// Routes by the material's `transparent` flag and nothing else.
    pub fn push(&mut self, command: RenderCommand<'a>) {
        if command.material.transparent {
            self.transparent.push(command);
        } else {
            self.opaque.push(command);
        }
    }

    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Farthest along `forward` first. Stable, so equal depths keep their
/// traversal order.
pub fn sort_back_to_front(commands: &mut [RenderCommand<'_>], forward: Vec3) {
    commands.sort_by(|a, b| b.view_depth(forward).total_cmp(&a.view_depth(forward)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::context::ProgramId;
    use crate::renderer::MaterialKind;

    fn material(transparent: bool) -> Material {
        Material::new(MaterialKind::Tinted, ProgramId(1)).transparent(transparent)
    }

    #[test]
    fn push_routes_by_transparency() {
        let opaque = material(false);
        let glass = material(true);
        let mut lists = CommandLists::new();
        lists.push(RenderCommand::new(Mat4::IDENTITY, MeshId(1), &opaque));
        lists.push(RenderCommand::new(Mat4::IDENTITY, MeshId(2), &glass));
        lists.push(RenderCommand::new(Mat4::IDENTITY, MeshId(3), &opaque));
        assert_eq!(lists.opaque.len(), 2);
        assert_eq!(lists.transparent.len(), 1);
        assert_eq!(lists.transparent[0].mesh, MeshId(2));
    }

    #[test]
    fn center_is_world_translation() {
        let m = material(false);
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::splat(3.0),
            glam::Quat::from_rotation_x(1.0),
            Vec3::new(4.0, 5.0, 6.0),
        );
        let command = RenderCommand::new(transform, MeshId(1), &m);
        assert!(command.center.abs_diff_eq(Vec3::new(4.0, 5.0, 6.0), 1e-6));
    }

    #[test]
    fn sort_is_descending_and_stable() {
        let m = material(true);
        let at = |z: f32, mesh: u32| {
            RenderCommand::new(Mat4::from_translation(Vec3::new(0.0, 0.0, z)), MeshId(mesh), &m)
        };
        let mut commands = vec![at(-2.0, 1), at(-8.0, 2), at(-2.0, 3), at(-5.0, 4)];
        sort_back_to_front(&mut commands, Vec3::NEG_Z);

        let meshes: Vec<u32> = commands.iter().map(|c| c.mesh.0).collect();
        assert_eq!(meshes, vec![2, 4, 1, 3]);
        for pair in commands.windows(2) {
            assert!(pair[0].view_depth(Vec3::NEG_Z) >= pair[1].view_depth(Vec3::NEG_Z));
        }
    }
}
