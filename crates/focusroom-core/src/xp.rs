//! Level math over the external XP total.
//!
//! Levels grow quadratically: level `n` starts at `(n-1)² · 100` XP.

use serde::{Deserialize, Serialize};

/// Default award for a completed Work phase.
pub const DEFAULT_WORK_SESSION_XP: i64 = 50;
pub const DEFAULT_XP_SOURCE: &str = "pomodoro_completed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpProgress {
    pub total_xp: i64,
    pub level: u32,
    pub current_level_xp: i64,
    pub next_level_xp: i64,
    /// XP needed to span the current level.
    pub xp_to_next_level: i64,
    pub progress_percentage: f64,
}

pub fn level_for(total_xp: i64) -> u32 {
    let xp = total_xp.max(0) as f64;
    (xp / 100.0).sqrt().floor() as u32 + 1
}

impl XpProgress {
    pub fn from_total(total_xp: i64) -> Self {
        let level = level_for(total_xp);
        let prev = i64::from(level - 1);
        let cur = i64::from(level);
        let current_level_xp = prev * prev * 100;
        let next_level_xp = cur * cur * 100;
        let xp_to_next_level = next_level_xp - current_level_xp;
        let into_level = total_xp.max(0) - current_level_xp;
        Self {
            total_xp,
            level,
            current_level_xp,
            next_level_xp,
            xp_to_next_level,
            progress_percentage: into_level as f64 / xp_to_next_level as f64 * 100.0,
        }
    }
}
