use clap::Subcommand;
use focusroom_core::storage::load_or_seed_config;
use focusroom_core::{SessionConfig, SessionStore};

use super::{block_on, open_store};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the stored session settings as JSON
    Show,
    /// Change one setting (validated before saving)
    Set {
        /// Field name (e.g. "work_duration", "auto_start_breaks")
        key: String,
        /// New value
        value: String,
    },
    /// Restore the default durations and flags
    Reset,
}

pub fn run(action: SettingsAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;
    block_on(async move {
        match action {
            SettingsAction::Show => {
                let config = load_or_seed_config(&store).await;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            SettingsAction::Set { key, value } => {
                let mut config = load_or_seed_config(&store).await;
                config.set_field(&key, &value)?;
                store.save_config(&config).await?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            SettingsAction::Reset => {
                store.save_config(&SessionConfig::default()).await?;
                println!("settings reset to defaults");
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })??;
    Ok(())
}
