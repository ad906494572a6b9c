pub mod renderer;
pub mod scene;
pub mod settings;

pub use renderer::{RendererContext, SceneRenderer, ViewportId};
pub use scene::{Camera, Scene};
pub use settings::{RendererSettings, SettingsError};

/// Installs `env_logger`, defaulting to `info`. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
