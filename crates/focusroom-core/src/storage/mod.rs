mod backend;
mod config;
pub mod database;
pub mod migrations;
pub mod rest;
pub(crate) mod store;
pub mod worker;

pub use backend::ConfiguredStore;
pub use config::{
    AppConfig, InactivityConfig, NotificationsConfig, OverlayConfig, RemoteStoreConfig, StoreBackend,
    StoreConfig, XpConfig,
};
pub use database::{SqliteStore, Stats, XpEntry};
pub use rest::RestStore;
pub use store::{load_or_seed_config, SessionRecord, SessionStore, LOCAL_USER_ID};
pub use worker::{persistence_channel, PersistenceHandle, PersistenceWorker, StoreRequest, WorkerStats};

use std::path::PathBuf;

/// Returns the data directory, creating it if needed.
///
/// `FOCUSROOM_DATA_DIR` wins when set. Otherwise `~/.config/focusroom`, or
/// `~/.config/focusroom-dev` with `FOCUSROOM_ENV=dev`.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("FOCUSROOM_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FOCUSROOM_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusroom-dev")
            } else {
                base_dir.join("focusroom")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
