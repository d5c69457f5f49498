use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timer::Phase;

/// Every state change of the focus engine produces an Event.
///
/// The engine itself performs no I/O: the runtime turns events into store
/// writes, notifications and overlay repaints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new session record begins with this phase.
    PhaseStarted {
        session_id: Uuid,
        phase: Phase,
        duration_minutes: u32,
        task_id: Option<String>,
        at: DateTime<Utc>,
    },
    TimerPaused {
        seconds_remaining: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        seconds_remaining: u64,
        at: DateTime<Utc>,
    },
    /// Work phase crossed the 5 or 1 minute mark.
    TimeWarning {
        phase: Phase,
        seconds_remaining: u64,
        at: DateTime<Utc>,
    },
    /// The phase ran out naturally.
    PhaseCompleted {
        session_id: Option<Uuid>,
        phase: Phase,
        next: Phase,
        completed_work_phases: u32,
        at: DateTime<Utc>,
    },
    /// Skip forced a transition; the in-flight session (if any) is abandoned.
    PhaseSkipped {
        session_id: Option<Uuid>,
        from: Phase,
        to: Phase,
        at: DateTime<Utc>,
    },
    /// Next phase will start by itself after a short delay.
    AutoStartScheduled {
        phase: Phase,
        delay_ms: u64,
        at: DateTime<Utc>,
    },
    /// The watchdog paused the clock; the caller must ask "still there?".
    InactivityDetected {
        idle_secs: u64,
        threshold_minutes: u64,
        at: DateTime<Utc>,
    },
    PresenceConfirmed {
        at: DateTime<Utc>,
    },
    ConfigApplied {
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::PhaseStarted { .. } => "phase_started",
            Event::TimerPaused { .. } => "timer_paused",
            Event::TimerResumed { .. } => "timer_resumed",
            Event::TimeWarning { .. } => "time_warning",
            Event::PhaseCompleted { .. } => "phase_completed",
            Event::PhaseSkipped { .. } => "phase_skipped",
            Event::AutoStartScheduled { .. } => "auto_start_scheduled",
            Event::InactivityDetected { .. } => "inactivity_detected",
            Event::PresenceConfirmed { .. } => "presence_confirmed",
            Event::ConfigApplied { .. } => "config_applied",
        }
    }
}
