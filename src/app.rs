// app.rs
//! Headless runner: loads a scene, renders a fixed number of frames into an
//! offscreen target and tears everything down again.

use glam::UVec2;
use thiserror::Error;

use crate::asset::Assets;
use crate::renderer::{
    ForwardRenderer, FrameOutcome, GraphicsContext, RenderError, WgpuContext,
};
use crate::scene::{Scene, SceneError, SceneLoader};
use crate::settings::AppSettings;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No suitable adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("Failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

pub struct App {
    gfx: WgpuContext,
    target: wgpu::TextureView,
    renderer: ForwardRenderer,
    scene: Scene,
    assets: Assets,
    frames: u32,
}

impl App {
    pub async fn new(settings: &AppSettings) -> Result<Self, AppError> {
        let size = settings.resolution.size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        log::info!("Using adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        let target = create_target(&device, size);
        let mut gfx = WgpuContext::new(device, queue, TARGET_FORMAT, size);

        let loaded = SceneLoader::load_file(&mut gfx, &settings.scene)?;
        let mut assets = loaded.assets;
        let renderer = match ForwardRenderer::initialize(&mut gfx, size, &loaded.renderer) {
            Ok(renderer) => renderer,
            Err(err) => {
                assets.destroy(&mut gfx);
                return Err(err.into());
            }
        };

        Ok(Self {
            gfx,
            target,
            renderer,
            scene: loaded.scene,
            assets,
            frames: settings.frames,
        })
    }

    /// Renders the configured number of frames, switching the composite
    /// effect halfway through.
    pub fn run(mut self) {
        let toggle_at = self.frames / 2;
        for frame in 0..self.frames {
            if frame == toggle_at && self.renderer.has_postprocess() {
                self.renderer.toggle_postprocess_effect();
            }
            match self.renderer.render(&mut self.gfx, &self.scene, &self.assets) {
                FrameOutcome::Rendered(stats) => log::info!("Frame {}: {:?}", frame, stats),
                FrameOutcome::Skipped => log::warn!("Frame {}: scene has no camera", frame),
            }
            self.gfx.submit(&self.target);
        }
        self.shutdown();
    }

    fn shutdown(mut self) {
        let gfx: &mut dyn GraphicsContext = &mut self.gfx;
        self.renderer.destroy(gfx);
        self.assets.destroy(gfx);
        log::info!("Application shutdown complete");
    }
}

fn create_target(device: &wgpu::Device, size: UVec2) -> wgpu::TextureView {
    let size = size.max(UVec2::ONE);
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("PresentationTarget"),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}
