use std::path::{Path, PathBuf};

use glam::UVec2;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::shaders::BUILTIN_PREFIX;

/// Optional renderer features, read from the `renderer` section of a scene.
/// Each present key turns one feature on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Equirectangular sky texture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sky: Option<PathBuf>,
    /// Fragment stage of the full-screen composite pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postprocess: Option<PathBuf>,
    /// Secondary texture sampled by the composite pass on unit 1.
    #[serde(
        default,
        rename = "PPtexture",
        skip_serializing_if = "Option::is_none"
    )]
    pub pp_texture: Option<PathBuf>,
}

impl RendererConfig {
    /// Resolves relative paths against `base` (usually the scene's directory).
    pub fn relative_to(mut self, base: &Path) -> Self {
        for path in [&mut self.sky, &mut self.postprocess, &mut self.pp_texture]
            .into_iter()
            .flatten()
        {
            let builtin = path
                .to_str()
                .is_some_and(|p| p.starts_with(BUILTIN_PREFIX));
            if path.is_relative() && !builtin {
                *path = base.join(&*path);
            }
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "AppSettings::default_scene")]
    pub scene: PathBuf,
    /// Frames rendered by the headless runner before exiting.
    #[serde(default = "AppSettings::default_frames")]
    pub frames: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            scene: Self::default_scene(),
            frames: Self::default_frames(),
        }
    }
}

impl AppSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default settings.",
                        path, err
                    );
                    AppSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("Settings file {:?} not found. Using default settings.", path);
                AppSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default settings.",
                    path, err
                );
                AppSettings::default()
            }
        }
    }

    fn validate(mut self) -> Self {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        if self.frames == 0 {
            warn!("Frame count must be greater than zero. Using default value.");
            self.frames = Self::default_frames();
        }

        self
    }

    fn default_scene() -> PathBuf {
        PathBuf::from("assets/scenes/demo.json")
    }

    const fn default_frames() -> u32 {
        4
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let invalid = AppSettings {
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            frames: 0,
            ..AppSettings::default()
        };
        let validated = invalid.validate();

        assert_eq!(validated.resolution.width, Resolution::default().width);
        assert_eq!(validated.resolution.height, Resolution::default().height);
        assert_eq!(validated.frames, AppSettings::default().frames);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = AppSettings {
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            scene: PathBuf::from("custom.json"),
            frames: 10,
        };
        let validated = valid.clone().validate();

        assert_eq!(validated.resolution.size(), UVec2::new(1920, 1080));
        assert_eq!(validated.scene, valid.scene);
        assert_eq!(validated.frames, 10);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let settings = AppSettings::load_from_path("definitely/not/here/settings.json");
        assert_eq!(settings.frames, AppSettings::default().frames);
    }

    #[test]
    fn renderer_config_reads_original_keys() {
        let config: RendererConfig = serde_json::from_str(
            r#"{ "sky": "sky.jpg", "postprocess": "vignette.wgsl", "PPtexture": "noise.png" }"#,
        )
        .unwrap();
        assert_eq!(config.sky, Some(PathBuf::from("sky.jpg")));
        assert_eq!(config.pp_texture, Some(PathBuf::from("noise.png")));

        let empty: RendererConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, RendererConfig::default());
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let config = RendererConfig {
            sky: Some(PathBuf::from("sky.jpg")),
            postprocess: Some(PathBuf::from("builtin:vignette")),
            pp_texture: Some(PathBuf::from("/abs/noise.png")),
        }
        .relative_to(Path::new("scenes"));
        assert_eq!(config.sky, Some(PathBuf::from("scenes/sky.jpg")));
        assert_eq!(config.postprocess, Some(PathBuf::from("builtin:vignette")));
        assert_eq!(config.pp_texture, Some(PathBuf::from("/abs/noise.png")));
    }
}
