// renderer/texture.rs
//! Texture creation helpers on top of the device seam.

use std::path::{Path, PathBuf};

use glam::UVec2;
use thiserror::Error;

use crate::renderer::context::{
    GraphicsContext, GraphicsError, TextureDescriptor, TextureFormat, TextureId,
};

#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Failed to load image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Graphics(#[from] GraphicsError),
}

/// Decodes an image file into an RGBA8 texture. No mip chain is built.
pub fn load_texture(
    gfx: &mut dyn GraphicsContext,
    path: impl AsRef<Path>,
    is_srgb: bool,
) -> Result<TextureId, TextureError> {
    let path = path.as_ref();
    log::info!("Loading texture: {:?}", path);

    let img = image::open(path)
        .map_err(|source| TextureError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();
    let (width, height) = img.dimensions();

    let desc = TextureDescriptor {
        label: path.display().to_string(),
        size: UVec2::new(width, height),
        format: if is_srgb {
            TextureFormat::Rgba8Srgb
        } else {
            TextureFormat::Rgba8
        },
    };
    Ok(gfx.create_texture(&desc, Some(img.as_raw()))?)
}

/// 1x1 texture filled with a single color.
pub fn solid_color_texture(
    gfx: &mut dyn GraphicsContext,
    label: &str,
    rgba: [u8; 4],
) -> Result<TextureId, GraphicsError> {
    let desc = TextureDescriptor {
        label: label.to_string(),
        size: UVec2::ONE,
        format: TextureFormat::Rgba8,
    };
    gfx.create_texture(&desc, Some(&rgba))
}

/// Uninitialized texture, used as a render target.
pub fn empty_texture(
    gfx: &mut dyn GraphicsContext,
    label: &str,
    format: TextureFormat,
    size: UVec2,
) -> Result<TextureId, GraphicsError> {
    let desc = TextureDescriptor {
        label: label.to_string(),
        size: size.max(UVec2::ONE),
        format,
    };
    gfx.create_texture(&desc, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::RecordingContext;

    #[test]
    fn missing_file_reports_path() {
        let mut gfx = RecordingContext::new();
        let err = load_texture(&mut gfx, "does/not/exist.png", true).unwrap_err();
        assert!(matches!(err, TextureError::Image { ref path, .. } if path.ends_with("exist.png")));
        assert_eq!(gfx.live_resource_count(), 0);
    }

    #[test]
    fn loads_written_png() {
        let path = std::env::temp_dir().join("forward_renderer_texture_test.png");
        image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let mut gfx = RecordingContext::new();
        let texture = load_texture(&mut gfx, &path, false).unwrap();
        let desc = gfx.texture_descriptor(texture).unwrap();
        assert_eq!(desc.size, UVec2::new(2, 3));
        assert_eq!(desc.format, TextureFormat::Rgba8);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn empty_texture_never_has_zero_size() {
        let mut gfx = RecordingContext::new();
        let texture = empty_texture(&mut gfx, "target", TextureFormat::Depth24, UVec2::ZERO).unwrap();
        assert_eq!(gfx.texture_descriptor(texture).unwrap().size, UVec2::ONE);
    }
}
