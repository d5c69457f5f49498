use focusroom_core::storage::load_or_seed_config;
use focusroom_core::time::system_time;
use focusroom_core::{ActivityTracker, FocusEngine};

use super::{block_on, open_store};

/// Print the snapshot of an engine built from the stored settings.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;
    let config = block_on(async { load_or_seed_config(&store).await })?;
    let time = system_time();
    let engine = FocusEngine::with_config(config, time.clone(), ActivityTracker::new(time));
    println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);
    Ok(())
}
