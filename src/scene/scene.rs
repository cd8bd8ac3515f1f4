// scene/scene.rs
use glam::Mat4;
use hecs::{Component, DynamicBundle, Entity, World};

use super::components::*;

/// A hecs world that remembers spawn order, so "every entity" is always
/// visited the same way.
#[derive(Default)]
pub struct Scene {
    world: World,
    order: Vec<Entity>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Raw world access for tests. Entities spawned here skip `order` and
    /// are never visited; `Scene::spawn` is the only way to add entities.
    #[cfg(test)]
    pub(crate) fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn spawn(&mut self, components: impl DynamicBundle) -> Entity {
        let entity = self.world.spawn(components);
        self.order.push(entity);
        entity
    }

    pub fn spawn_child(&mut self, parent: Entity, components: impl DynamicBundle) -> Entity {
        let entity = self.spawn(components);
        if let Err(err) = self.world.insert_one(entity, Parent(parent)) {
            log::warn!("Failed to attach {:?} to parent {:?}: {}", entity, parent, err);
        }
        entity
    }

    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.order.retain(|&e| e != entity);
        self.world.despawn(entity).is_ok()
    }

    /// Entities in spawn order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The entity's component of type `T`, if it has one.
    pub fn component<T: Component + Clone>(&self, entity: Entity) -> Option<T> {
        self.world.get::<&T>(entity).ok().map(|c| (*c).clone())
    }

    pub fn set_transform(&mut self, entity: Entity, transform: Transform) {
        if let Ok(mut current) = self.world.get::<&mut Transform>(entity) {
            *current = transform;
            return;
        }
        if let Err(err) = self.world.insert_one(entity, transform) {
            log::warn!("Failed to set transform on {:?}: {}", entity, err);
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<Entity> {
        self.entities().find(|&entity| {
            self.world
                .get::<&Name>(entity)
                .is_ok_and(|n| n.0 == name)
        })
    }

    fn local_matrix(&self, entity: Entity) -> Mat4 {
        self.world
            .get::<&Transform>(entity)
            .map(|t| t.matrix())
            .unwrap_or(Mat4::IDENTITY)
    }

    /// Local transform composed with every ancestor's, root last. Parent
    /// cycles are cut after visiting each entity once.
    pub fn local_to_world(&self, entity: Entity) -> Mat4 {
        let mut matrix = self.local_matrix(entity);
        let mut current = self.component::<Parent>(entity);
        let mut remaining = self.order.len();
        while let Some(Parent(parent)) = current {
            if remaining == 0 {
                log::warn!("Parent cycle detected at {:?}", entity);
                break;
            }
            remaining -= 1;
            matrix = self.local_matrix(parent) * matrix;
            current = self.component::<Parent>(parent);
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn entities_keep_spawn_order() {
        let mut scene = Scene::new();
        let a = scene.spawn((Name::new("a"),));
        let b = scene.spawn((Name::new("b"),));
        let c = scene.spawn((Name::new("c"),));
        scene.despawn(b);
        assert_eq!(scene.entities().collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(scene.find_by_name("c"), Some(c));
    }

    #[test]
    fn child_inherits_parent_transform() {
        let mut scene = Scene::new();
        let parent = scene.spawn((Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)),));
        let child = scene.spawn_child(parent, (Transform::from_translation(Vec3::new(0.0, 2.0, 0.0)),));
        let p = scene.local_to_world(child).transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
    }

    #[test]
    fn missing_transform_is_identity() {
        let mut scene = Scene::new();
        let entity = scene.spawn((Name::new("bare"),));
        assert!(scene.local_to_world(entity).abs_diff_eq(Mat4::IDENTITY, 1e-6));
        assert!(scene.component::<Camera>(entity).is_none());
    }

    #[test]
    fn set_transform_inserts_or_replaces() {
        let mut scene = Scene::new();
        let entity = scene.spawn((Name::new("e"),));
        scene.set_transform(entity, Transform::from_translation(Vec3::X));
        scene.set_transform(entity, Transform::from_translation(Vec3::Y));
        assert_eq!(scene.component::<Transform>(entity).map(|t| t.translation), Some(Vec3::Y));
    }

    #[test]
    fn parent_cycle_terminates() {
        let mut scene = Scene::new();
        let a = scene.spawn((Transform::default(),));
        let b = scene.spawn_child(a, (Transform::default(),));
        scene.world_mut().insert_one(a, Parent(b)).unwrap();
        let _ = scene.local_to_world(a);
    }
}
