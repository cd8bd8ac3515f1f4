pub mod app;
pub mod asset;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use app::{App, AppError};
pub use renderer::{ForwardRenderer, GraphicsContext, RecordingContext, WgpuContext};
pub use scene::{Scene, SceneLoader};
pub use settings::{AppSettings, RendererConfig};

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

pub fn run(settings: AppSettings) -> Result<(), AppError> {
    init_logging();
    log::info!("Starting forward renderer ({:?})", settings.scene);

    let app = pollster::block_on(App::new(&settings))?;
    app.run();
    Ok(())
}
