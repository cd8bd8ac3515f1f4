pub mod cache;
pub mod handle;

pub use cache::AssetCache;
pub use handle::Handle;

use crate::renderer::context::{GraphicsContext, MeshId, ProgramId, SamplerId, TextureId};
use crate::renderer::Material;

/// Shared, name-keyed resources loaded from scene data.
///
/// The caches own every GPU object they hold. Materials only reference
/// entries of the other caches, so releasing the caches once in
/// [`Assets::destroy`] frees each object exactly once.
#[derive(Default)]
pub struct Assets {
    pub shaders: AssetCache<ProgramId>,
    pub textures: AssetCache<TextureId>,
    pub samplers: AssetCache<SamplerId>,
    pub meshes: AssetCache<MeshId>,
    pub materials: AssetCache<Material>,
}

impl Assets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shader(&self, name: &str) -> Option<ProgramId> {
        self.shaders.get_by_name(name).copied()
    }

    pub fn mesh(&self, name: &str) -> Option<MeshId> {
        self.meshes.get_by_name(name).copied()
    }

    pub fn material(&self, name: &str) -> Option<Handle<Material>> {
        self.materials.handle(name)
    }

    /// Empty names mean "no texture" and resolve silently.
    pub fn texture(&self, name: &str) -> Option<TextureId> {
        lookup(&self.textures, name, "texture")
    }

    pub fn sampler(&self, name: &str) -> Option<SamplerId> {
        lookup(&self.samplers, name, "sampler")
    }

    pub fn destroy(&mut self, gfx: &mut dyn GraphicsContext) {
        let counts = (
            self.shaders.len(),
            self.textures.len(),
            self.samplers.len(),
            self.meshes.len(),
        );
        self.materials.drain();
        for program in self.shaders.drain() {
            gfx.delete_program(program);
        }
        for texture in self.textures.drain() {
            gfx.delete_texture(texture);
        }
        for sampler in self.samplers.drain() {
            gfx.delete_sampler(sampler);
        }
        for mesh in self.meshes.drain() {
            gfx.delete_mesh(mesh);
        }
        log::info!(
            "Released assets: {} shaders, {} textures, {} samplers, {} meshes",
            counts.0,
            counts.1,
            counts.2,
            counts.3
        );
    }
}

fn lookup<T: Copy>(cache: &AssetCache<T>, name: &str, kind: &str) -> Option<T> {
    if name.is_empty() {
        return None;
    }
    let found = cache.get_by_name(name).copied();
    if found.is_none() {
        log::warn!("Unknown {} '{}'; treating it as absent", kind, name);
    }
    found
}
