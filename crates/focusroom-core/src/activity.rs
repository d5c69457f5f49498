//! Last-input tracking.
//!
//! An explicit service handed to the engine instead of process-wide input
//! hooks. Input sources (a terminal reader, a GUI shell) call
//! [`ActivityTracker::observe`]; the inactivity watchdog only reads.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::time::SharedTime;

/// Input classes that count as presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    PointerMove,
    KeyPress,
    Click,
}

/// Cloneable handle; all clones share one timestamp.
#[derive(Clone)]
pub struct ActivityTracker {
    time: SharedTime,
    last_activity: Arc<Mutex<Instant>>,
}

impl ActivityTracker {
    pub fn new(time: SharedTime) -> Self {
        let now = time.now();
        Self {
            time,
            last_activity: Arc::new(Mutex::new(now)),
        }
    }

    /// Record qualifying input. Applies whether or not a phase is running.
    pub fn observe(&self, kind: InputKind) {
        tracing::trace!(?kind, "input observed");
        self.record_activity();
    }

    pub fn record_activity(&self) {
        let now = self.time.now();
        *self.last_activity.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn time_since_last_activity(&self) -> Duration {
        self.time.now().saturating_duration_since(self.last_activity())
    }
}

impl std::fmt::Debug for ActivityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTracker")
            .field("idle", &self.time_since_last_activity())
            .finish()
    }
}
