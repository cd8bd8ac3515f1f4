// scene/loader.rs
//! JSON scene documents:
//!
//! ```json
//! {
//!   "renderer": { "sky": "sky.png", "postprocess": "builtin:vignette" },
//!   "assets": { "shaders": {}, "textures": {}, "samplers": {}, "meshes": {}, "materials": {} },
//!   "world": [ { "name": "camera", "position": [0, 0, 5], "components": [ { "type": "Camera" } ] } ]
//! }
//! ```
//!
//! Every GPU object is created through the supplied context and owned by the
//! returned [`Assets`]. A failed load releases whatever it already created.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glam::Vec3;
use hecs::{Entity, EntityBuilder};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::components::*;
use crate::asset::Assets;
use crate::renderer::context::{
    GraphicsContext, GraphicsError, ProgramDescriptor, SamplerDescriptor,
};
use crate::renderer::material::MaterialError;
use crate::renderer::primitives::{cube_mesh, plane_mesh, sphere_mesh};
use crate::renderer::shaders;
use crate::renderer::texture::{load_texture, solid_color_texture, TextureError};
use crate::renderer::Material;
use crate::scene::Scene;
use crate::settings::RendererConfig;

const SPHERE_SEGMENTS: u32 = 32;
const SPHERE_RINGS: u32 = 16;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid scene JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Material '{name}': {source}")]
    Material {
        name: String,
        #[source]
        source: MaterialError,
    },
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error(transparent)]
    Graphics(#[from] GraphicsError),
    #[error("Unknown {kind} '{name}'")]
    UnknownAsset { kind: &'static str, name: String },
    #[error("Invalid '{component}' component: {source}")]
    InvalidComponent {
        component: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything a scene document produces.
pub struct LoadedScene {
    pub scene: Scene,
    pub assets: Assets,
    /// Paths already resolved against the document's directory.
    pub renderer: RendererConfig,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ShaderEntry {
    Builtin(String),
    Files { vertex: PathBuf, fragment: PathBuf },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextureEntry {
    Path(PathBuf),
    Color { color: [u8; 4] },
    File {
        path: PathBuf,
        #[serde(default = "default_srgb")]
        srgb: bool,
    },
}

fn default_srgb() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(default)]
struct EntityTransform {
    position: Vec3,
    /// Euler degrees.
    rotation: Vec3,
    scale: Vec3,
}

impl Default for EntityTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

pub struct SceneLoader;

impl SceneLoader {
    pub fn load_file(
        gfx: &mut dyn GraphicsContext,
        path: impl AsRef<Path>,
    ) -> Result<LoadedScene, SceneError> {
        let path = path.as_ref();
        log::info!("Loading scene: {:?}", path);
        let contents = fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value = serde_json::from_str(&contents)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::load_document(gfx, &document, base)
    }

    /// `base` resolves every relative path in the document.
    pub fn load_document(
        gfx: &mut dyn GraphicsContext,
        document: &Value,
        base: &Path,
    ) -> Result<LoadedScene, SceneError> {
        let renderer = match document.get("renderer") {
            Some(config) => RendererConfig::deserialize(config)?.relative_to(base),
            None => RendererConfig::default(),
        };

        let mut assets = Assets::new();
        let mut scene = Scene::new();
        let result = Self::load_assets(gfx, document.get("assets"), base, &mut assets).and_then(
            |()| match document.get("world").and_then(Value::as_array) {
                Some(entities) => entities
                    .iter()
                    .try_for_each(|data| Self::load_entity(&mut scene, data, None, &assets)),
                None => Ok(()),
            },
        );

        match result {
            Ok(()) => {
                log::info!(
                    "Scene loaded: {} entities, {} materials",
                    scene.len(),
                    assets.materials.len()
                );
                Ok(LoadedScene {
                    scene,
                    assets,
                    renderer,
                })
            }
            Err(err) => {
                assets.destroy(gfx);
                Err(err)
            }
        }
    }

    fn load_assets(
        gfx: &mut dyn GraphicsContext,
        data: Option<&Value>,
        base: &Path,
        assets: &mut Assets,
    ) -> Result<(), SceneError> {
        let Some(data) = data.and_then(Value::as_object) else {
            return Ok(());
        };

        for (name, entry) in section(data, "shaders") {
            let desc = Self::shader_descriptor(name, entry, base)?;
            let program = gfx.create_program(&desc)?;
            assets.shaders.insert_named(name.as_str(), program);
        }

        for (name, entry) in section(data, "textures") {
            let texture = match TextureEntry::deserialize(entry)? {
                TextureEntry::Path(path) => load_texture(gfx, base.join(path), true)?,
                TextureEntry::File { path, srgb } => load_texture(gfx, base.join(path), srgb)?,
                TextureEntry::Color { color } => solid_color_texture(gfx, name, color)?,
            };
            assets.textures.insert_named(name.as_str(), texture);
        }

        for (name, entry) in section(data, "samplers") {
            let desc = SamplerDescriptor::deserialize(entry)?;
            let sampler = gfx.create_sampler(&desc);
            assets.samplers.insert_named(name.as_str(), sampler);
        }

        for (name, entry) in section(data, "meshes") {
            let kind = entry.as_str().unwrap_or_default();
            let (vertices, indices) = match kind {
                "cube" => cube_mesh(),
                "sphere" => sphere_mesh(SPHERE_SEGMENTS, SPHERE_RINGS),
                "plane" => plane_mesh(),
                _ => {
                    return Err(SceneError::UnknownAsset {
                        kind: "mesh primitive",
                        name: kind.to_string(),
                    })
                }
            };
            let mesh = gfx.create_mesh(&vertices, &indices);
            assets.meshes.insert_named(name.as_str(), mesh);
        }

        // Materials reference the caches above, so they load last
        for (name, entry) in section(data, "materials") {
            let material = Material::load(entry, assets).map_err(|source| SceneError::Material {
                name: name.clone(),
                source,
            })?;
            assets.materials.insert_named(name.as_str(), material);
        }

        log::debug!(
            "Assets: {} shaders, {} textures, {} samplers, {} meshes, {} materials",
            assets.shaders.len(),
            assets.textures.len(),
            assets.samplers.len(),
            assets.meshes.len(),
            assets.materials.len()
        );
        Ok(())
    }

    fn shader_descriptor(
        name: &str,
        entry: &Value,
        base: &Path,
    ) -> Result<ProgramDescriptor, SceneError> {
        match ShaderEntry::deserialize(entry)? {
            ShaderEntry::Builtin(builtin) => {
                shaders::builtin(&builtin).ok_or(SceneError::UnknownAsset {
                    kind: "built-in shader",
                    name: builtin,
                })
            }
            ShaderEntry::Files { vertex, fragment } => Ok(ProgramDescriptor {
                label: name.to_string(),
                vertex: shaders::with_common(&read_source(&base.join(vertex))?),
                fragment: shaders::with_common(&read_source(&base.join(fragment))?),
            }),
        }
    }

    fn load_entity(
        scene: &mut Scene,
        data: &Value,
        parent: Option<Entity>,
        assets: &Assets,
    ) -> Result<(), SceneError> {
        let Some(object) = data.as_object() else {
            return Ok(());
        };

        let transform = EntityTransform::deserialize(data).map_err(|source| {
            SceneError::InvalidComponent {
                component: "Transform",
                source,
            }
        })?;

        let mut builder = EntityBuilder::new();
        builder.add(Transform::from_euler_degrees(
            transform.position,
            transform.rotation,
            transform.scale,
        ));
        if let Some(name) = object.get("name").and_then(Value::as_str) {
            builder.add(Name::new(name));
        }
        if let Some(components) = object.get("components").and_then(Value::as_array) {
            for component in components {
                Self::add_component(&mut builder, component, assets)?;
            }
        }

        let entity = match parent {
            Some(parent) => scene.spawn_child(parent, builder.build()),
            None => scene.spawn(builder.build()),
        };

        if let Some(children) = object.get("children").and_then(Value::as_array) {
            for child in children {
                Self::load_entity(scene, child, Some(entity), assets)?;
            }
        }
        Ok(())
    }

    fn add_component(
        builder: &mut EntityBuilder,
        data: &Value,
        assets: &Assets,
    ) -> Result<(), SceneError> {
        let kind = data.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "Camera" => {
                let camera = Camera::from_json(data).map_err(|source| {
                    SceneError::InvalidComponent {
                        component: "Camera",
                        source,
                    }
                })?;
                builder.add(camera);
            }
            "Mesh Renderer" => {
                let mesh_name = data.get("mesh").and_then(Value::as_str).unwrap_or_default();
                let mesh = assets.mesh(mesh_name).ok_or_else(|| SceneError::UnknownAsset {
                    kind: "mesh",
                    name: mesh_name.to_string(),
                })?;
                let material_name = data
                    .get("material")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let material =
                    assets
                        .material(material_name)
                        .ok_or_else(|| SceneError::UnknownAsset {
                            kind: "material",
                            name: material_name.to_string(),
                        })?;
                builder.add(MeshRenderer { mesh, material });
            }
            "Light" | "light" => {
                let light = Light::from_json(data).map_err(|source| {
                    SceneError::InvalidComponent {
                        component: "Light",
                        source,
                    }
                })?;
                builder.add(light);
            }
            other => log::debug!("Ignoring unsupported component type '{}'", other),
        }
        Ok(())
    }
}

fn section<'a>(
    data: &'a Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = (&'a String, &'a Value)> {
    data.get(key)
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|entries| entries.iter())
}

fn read_source(path: &Path) -> Result<String, SceneError> {
    fs::read_to_string(path).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::RecordingContext;
    use crate::renderer::MaterialKind;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "renderer": { "postprocess": "builtin:vignette", "sky": "sky.png" },
            "assets": {
                "shaders": { "tinted": "tinted", "lit": "lit" },
                "textures": { "white": { "color": [255, 255, 255, 255] } },
                "samplers": { "linear": { "wrap_s": "GL_CLAMP_TO_EDGE" } },
                "meshes": { "cube": "cube", "ball": "sphere" },
                "materials": {
                    "glass": {
                        "type": "tinted",
                        "shader": "tinted",
                        "transparent": true,
                        "tint": [1.0, 1.0, 1.0, 0.5]
                    },
                    "stone": {
                        "type": "lit",
                        "shader": "lit",
                        "sampler": "linear",
                        "albedo": "white"
                    }
                }
            },
            "world": [
                { "name": "camera", "position": [0, 0, 5], "components": [ { "type": "Camera", "fovY": 60 } ] },
                {
                    "name": "pivot",
                    "rotation": [0, 90, 0],
                    "components": [ { "type": "Mesh Renderer", "mesh": "cube", "material": "stone" } ],
                    "children": [
                        { "name": "lamp", "position": [0, 2, 0], "components": [ { "type": "light", "typeOfLight": "POINT" } ] }
                    ]
                },
                { "name": "window", "components": [ { "type": "Mesh Renderer", "mesh": "ball", "material": "glass" }, { "type": "Scarecrow" } ] }
            ]
        })
    }

    #[test]
    fn loads_assets_and_hierarchy() {
        let mut gfx = RecordingContext::new();
        let loaded = SceneLoader::load_document(&mut gfx, &document(), Path::new("scenes")).unwrap();

        assert_eq!(loaded.scene.len(), 4);
        assert_eq!(
            loaded.renderer.sky,
            Some(PathBuf::from("scenes/sky.png"))
        );
        assert_eq!(
            loaded.renderer.postprocess,
            Some(PathBuf::from("builtin:vignette"))
        );

        let stone = loaded.assets.materials.get_by_name("stone").unwrap();
        assert_eq!(stone.kind, MaterialKind::Lit);
        assert_eq!(stone.maps.albedo, loaded.assets.texture("white"));
        assert!(loaded.assets.materials.get_by_name("glass").unwrap().transparent);

        let lamp = loaded.scene.find_by_name("lamp").unwrap();
        assert!(loaded.scene.component::<Light>(lamp).is_some());
        assert!(loaded.scene.component::<Parent>(lamp).is_some());
        // Parent yaw does not move a point on the Y axis
        let p = loaded.scene.local_to_world(lamp).transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));

        let camera = loaded.scene.find_by_name("camera").unwrap();
        assert!(loaded.scene.component::<Camera>(camera).is_some());
    }

    #[test]
    fn unknown_material_releases_created_assets() {
        let mut doc = document();
        doc["world"][2]["components"][0]["material"] = json!("missing");

        let mut gfx = RecordingContext::new();
        let err = SceneLoader::load_document(&mut gfx, &doc, Path::new(".")).err().unwrap();
        assert!(matches!(err, SceneError::UnknownAsset { kind: "material", .. }));
        assert_eq!(gfx.live_resource_count(), 0);
    }

    #[test]
    fn material_errors_name_the_material() {
        let mut doc = document();
        doc["assets"]["materials"]["glass"]["shader"] = json!("nope");

        let mut gfx = RecordingContext::new();
        let err = SceneLoader::load_document(&mut gfx, &doc, Path::new(".")).err().unwrap();
        assert!(matches!(err, SceneError::Material { ref name, .. } if name == "glass"));
        assert_eq!(gfx.live_resource_count(), 0);
    }

    #[test]
    fn unknown_mesh_primitive_is_an_error() {
        let doc = json!({ "assets": { "meshes": { "teapot": "teapot" } } });
        let mut gfx = RecordingContext::new();
        let err = SceneLoader::load_document(&mut gfx, &doc, Path::new(".")).err().unwrap();
        assert!(matches!(err, SceneError::UnknownAsset { ref name, .. } if name == "teapot"));
    }

    #[test]
    fn missing_file_reports_path() {
        let mut gfx = RecordingContext::new();
        let err = SceneLoader::load_file(&mut gfx, "no/such/scene.json").err().unwrap();
        assert!(matches!(err, SceneError::Io { .. }));
    }
}
