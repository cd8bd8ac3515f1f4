// scene/mod.rs

pub mod camera;
pub mod components;
pub mod loader;
pub mod scene;
pub mod transform;

pub use camera::{Camera, Projection};
pub use components::{Light, MeshRenderer, Name, Parent};
pub use loader::{LoadedScene, SceneError, SceneLoader};
pub use scene::Scene;
pub use transform::Transform;
