//! Per-phase countdown.
//!
//! The clock counts whole seconds. It is driven by `tick()`, one call per
//! elapsed second, and keeps a monotonic anchor so a late driver (a
//! backgrounded process, a slow event loop) can catch up with
//! [`SessionClock::due_ticks`] instead of drifting.

use std::time::Instant;

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Clock is stopped; nothing happened.
    Idle,
    /// One second elapsed and time remains.
    Counting { seconds_remaining: u64 },
    /// The phase ran out. Remaining time is pinned at zero.
    Expired,
}

#[derive(Debug, Clone)]
pub struct SessionClock {
    total_seconds: u64,
    seconds_remaining: u64,
    /// Instant the current running stretch began.
    anchor: Option<Instant>,
    /// Ticks applied since `anchor`.
    ticks_since_anchor: u64,
}

impl SessionClock {
    pub fn new(total_seconds: u64) -> Self {
        Self {
            total_seconds,
            seconds_remaining: total_seconds,
            anchor: None,
            ticks_since_anchor: 0,
        }
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    pub fn seconds_remaining(&self) -> u64 {
        self.seconds_remaining
    }

    pub fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    /// 0.0 .. 1.0 elapsed fraction of the phase.
    pub fn progress(&self) -> f64 {
        if self.total_seconds == 0 {
            return 0.0;
        }
        let elapsed = self.total_seconds.saturating_sub(self.seconds_remaining);
        elapsed as f64 / self.total_seconds as f64
    }

    /// Load a fresh phase duration. Stops the clock.
    pub fn reset(&mut self, total_seconds: u64) {
        self.total_seconds = total_seconds;
        self.seconds_remaining = total_seconds;
        self.anchor = None;
        self.ticks_since_anchor = 0;
    }

    pub fn start(&mut self, now: Instant) {
        if self.anchor.is_none() {
            self.anchor = Some(now);
            self.ticks_since_anchor = 0;
        }
    }

    /// Stop without touching the remaining time.
    pub fn pause(&mut self) {
        self.anchor = None;
        self.ticks_since_anchor = 0;
    }

    /// Whole seconds elapsed on the monotonic clock that have not been
    /// applied as ticks yet.
    pub fn due_ticks(&self, now: Instant) -> u64 {
        match self.anchor {
            Some(anchor) => now
                .saturating_duration_since(anchor)
                .as_secs()
                .saturating_sub(self.ticks_since_anchor),
            None => 0,
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.anchor.is_none() {
            return TickOutcome::Idle;
        }
        self.ticks_since_anchor += 1;
        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
        if self.seconds_remaining == 0 {
            TickOutcome::Expired
        } else {
            TickOutcome::Counting {
                seconds_remaining: self.seconds_remaining,
            }
        }
    }
}

/// `MM:SS`; minutes grow past two digits for long phases.
pub fn format_mmss(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
