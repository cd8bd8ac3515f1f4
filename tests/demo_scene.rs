//! Loads the bundled demo scene and renders it through the recording device.

use std::path::{Path, PathBuf};

use forward_renderer::renderer::recording::DrawGeometry;
use forward_renderer::renderer::{ForwardRenderer, FrameOutcome, RecordingContext};
use forward_renderer::scene::SceneLoader;
use forward_renderer::settings::AppSettings;
use glam::UVec2;

fn demo_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/scenes/demo.json")
}

#[test]
fn demo_scene_renders_every_phase() {
    let mut gfx = RecordingContext::new();
    let mut loaded = SceneLoader::load_file(&mut gfx, demo_path()).unwrap();
    let mut renderer =
        ForwardRenderer::initialize(&mut gfx, UVec2::new(320, 180), &loaded.renderer).unwrap();
    assert!(renderer.has_sky());
    assert!(renderer.has_postprocess());

    let FrameOutcome::Rendered(stats) = renderer.render(&mut gfx, &loaded.scene, &loaded.assets)
    else {
        panic!("demo scene has a camera");
    };
    assert_eq!(stats.opaque, 3);
    assert_eq!(stats.transparent, 2);
    assert_eq!(stats.lights, 3);
    assert!(stats.sky && stats.composited);

    // opaque + sky + transparent + composite
    let draws = gfx.draws();
    assert_eq!(draws.len(), 3 + 1 + 2 + 1);
    assert!(draws[4].state.blending && draws[5].state.blending);
    assert!(matches!(
        draws[6].geometry,
        DrawGeometry::Procedural { vertex_count: 3, .. }
    ));
    // Every lit map is present, so the stone draws bind five textures
    assert!(draws[1].state.textures.iter().all(Option::is_some));

    renderer.destroy(&mut gfx);
    loaded.assets.destroy(&mut gfx);
    assert_eq!(gfx.live_resource_count(), 0);
    assert_eq!(gfx.double_free_count(), 0);
}

#[test]
fn default_settings_point_at_the_demo_scene() {
    let settings = AppSettings::default();
    assert!(Path::new(env!("CARGO_MANIFEST_DIR"))
        .join(&settings.scene)
        .exists());
}
