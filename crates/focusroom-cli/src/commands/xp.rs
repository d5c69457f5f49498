use clap::Subcommand;
use focusroom_core::{SqliteStore, XpProgress};

#[derive(Subcommand)]
pub enum XpAction {
    /// Total XP, level and progress to the next level
    Show,
    /// Most recent XP awards
    Log {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: XpAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = SqliteStore::open_default()?;

    match action {
        XpAction::Show => {
            let progress = XpProgress::from_total(db.xp_total()?);
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
        XpAction::Log { limit } => {
            let entries = db.xp_log(limit)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}
