pub mod config;
pub mod run;
pub mod settings;
pub mod stats;
pub mod status;
pub mod xp;

use focusroom_core::{AppConfig, ConfiguredStore};

/// Single-threaded runtime; store futures are not `Send`.
pub fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, std::io::Error> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(rt.block_on(future))
}

pub fn open_store() -> Result<ConfiguredStore, Box<dyn std::error::Error>> {
    let app = AppConfig::load()?;
    Ok(ConfiguredStore::open(&app)?)
}
