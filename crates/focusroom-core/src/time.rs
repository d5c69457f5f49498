//! Monotonic time sources.
//!
//! The engine never calls `Instant::now()` directly; it asks a
//! [`TimeSource`]. Production code uses [`SystemTimeSource`], tests and
//! simulations drive a [`ManualTimeSource`] forward explicitly.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Shared handle used by the engine and the activity tracker.
pub type SharedTime = Arc<dyn TimeSource>;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time that only moves when told to.
#[derive(Debug)]
pub struct ManualTimeSource {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|p| p.into_inner());
        *offset += by;
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    pub fn advance_mins(&self, mins: u64) {
        self.advance(Duration::from_secs(mins * 60));
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|p| p.into_inner());
        self.base + offset
    }
}

pub fn system_time() -> SharedTime {
    Arc::new(SystemTimeSource)
}
