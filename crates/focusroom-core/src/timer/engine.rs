//! Focus session engine.
//!
//! A single-owner state machine over [`Phase`]s. It does not spawn
//! anything: the caller drives it by calling [`FocusEngine::advance`] (or
//! `tick()` directly) and forwards user actions. Every mutation returns the
//! [`Event`]s it produced; I/O happens elsewhere.
//!
//! ## State Transitions
//!
//! ```text
//! Work --complete--> ShortBreak | LongBreak --complete--> Work
//! Work --skip------> ShortBreak
//! ShortBreak | LongBreak --skip--> Work
//! ```

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::clock::{format_mmss, SessionClock, TickOutcome};
use super::inactivity::{InactivityMonitor, InactivityVerdict};
use super::schedule::{Phase, SessionConfig};
use super::sequencer;
use crate::activity::{ActivityTracker, InputKind};
use crate::error::ValidationError;
use crate::events::Event;
use crate::time::SharedTime;

/// Delay before an auto-started phase begins ticking.
pub const AUTO_START_DELAY: Duration = Duration::from_secs(1);

/// Remaining-time marks (seconds) that warn during Work.
const WORK_WARNINGS: [u64; 2] = [300, 60];

/// Point-in-time copy of everything a view needs.
///
/// Renderers pull a fresh snapshot per frame instead of holding on to
/// values captured earlier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub phase_label: String,
    pub seconds_remaining: u64,
    pub total_seconds: u64,
    pub time_text: String,
    /// 0.0 .. 1.0 elapsed fraction of the phase.
    pub progress: f64,
    pub is_running: bool,
    pub completed_work_phases: u32,
    pub sessions_before_long_break: u32,
    pub active_session_id: Option<Uuid>,
    pub task_id: Option<String>,
    pub awaiting_presence: bool,
}

pub struct FocusEngine {
    config: SessionConfig,
    phase: Phase,
    clock: SessionClock,
    completed_work_phases: u32,
    active_session: Option<Uuid>,
    task_id: Option<String>,
    inactivity: InactivityMonitor,
    inactivity_enabled: bool,
    activity: ActivityTracker,
    time: SharedTime,
    pending_auto_start: Option<Instant>,
}

impl FocusEngine {
    /// Engine with default settings, idle at the top of a Work phase.
    pub fn new(time: SharedTime, activity: ActivityTracker) -> Self {
        let config = SessionConfig::default();
        let clock = SessionClock::new(config.seconds_for(Phase::Work));
        Self {
            config,
            phase: Phase::Work,
            clock,
            completed_work_phases: 0,
            active_session: None,
            task_id: None,
            inactivity: InactivityMonitor::new(),
            inactivity_enabled: true,
            activity,
            time,
            pending_auto_start: None,
        }
    }

    /// Engine with `config`, falling back to defaults if it is invalid.
    pub fn with_config(config: SessionConfig, time: SharedTime, activity: ActivityTracker) -> Self {
        let mut engine = Self::new(time, activity);
        if let Err(e) = engine.apply_config(config) {
            tracing::warn!(error = %e, "ignoring invalid session config, using defaults");
        }
        engine
    }

    /// Replace the watchdog (seeded monitors make tests deterministic).
    pub fn with_inactivity_monitor(mut self, monitor: InactivityMonitor) -> Self {
        self.inactivity = monitor;
        self
    }

    pub fn set_inactivity_enabled(&mut self, enabled: bool) {
        self.inactivity_enabled = enabled;
        if !enabled {
            self.inactivity.disarm();
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn seconds_remaining(&self) -> u64 {
        self.clock.seconds_remaining()
    }

    pub fn total_seconds(&self) -> u64 {
        self.clock.total_seconds()
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn completed_work_phases(&self) -> u32 {
        self.completed_work_phases
    }

    pub fn active_session_id(&self) -> Option<Uuid> {
        self.active_session
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn awaiting_presence(&self) -> bool {
        self.inactivity.awaiting_confirmation()
    }

    pub fn inactivity(&self) -> &InactivityMonitor {
        &self.inactivity
    }

    pub fn auto_start_pending(&self) -> bool {
        self.pending_auto_start.is_some()
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            phase_label: self.phase.label().to_string(),
            seconds_remaining: self.clock.seconds_remaining(),
            total_seconds: self.clock.total_seconds(),
            time_text: format_mmss(self.clock.seconds_remaining()),
            progress: self.clock.progress(),
            is_running: self.clock.is_running(),
            completed_work_phases: self.completed_work_phases,
            sessions_before_long_break: self.config.sessions_before_long_break,
            active_session_id: self.active_session,
            task_id: self.task_id.clone(),
            awaiting_presence: self.inactivity.awaiting_confirmation(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Task the next session is recorded against.
    pub fn set_task(&mut self, task_id: Option<String>) {
        self.task_id = task_id;
    }

    pub fn record_input(&self, kind: InputKind) {
        self.activity.observe(kind);
    }

    /// Begin a session for the current phase, or resume a paused one.
    pub fn start(&mut self) -> Vec<Event> {
        if self.clock.is_running() {
            return Vec::new();
        }
        if self.inactivity.awaiting_confirmation() {
            return self.confirm_presence();
        }
        if self.active_session.is_some() {
            return self.resume().into_iter().collect();
        }

        let now = self.time.now();
        let session_id = Uuid::new_v4();
        self.pending_auto_start = None;
        self.active_session = Some(session_id);
        self.clock.reset(self.config.seconds_for(self.phase));
        self.clock.start(now);
        self.activity.record_activity();
        if self.phase == Phase::Work {
            self.inactivity.restart_sequence();
            self.arm_inactivity(now);
        }
        tracing::info!(phase = %self.phase, %session_id, "phase started");
        vec![Event::PhaseStarted {
            session_id,
            phase: self.phase,
            duration_minutes: self.config.minutes_for(self.phase),
            task_id: self.task_id.clone(),
            at: Utc::now(),
        }]
    }

    pub fn pause(&mut self) -> Option<Event> {
        if !self.clock.is_running() {
            return None;
        }
        self.clock.pause();
        self.inactivity.disarm();
        tracing::debug!(remaining = self.clock.seconds_remaining(), "paused");
        Some(Event::TimerPaused {
            seconds_remaining: self.clock.seconds_remaining(),
            at: Utc::now(),
        })
    }

    pub fn resume(&mut self) -> Option<Event> {
        if self.clock.is_running() || self.active_session.is_none() {
            return None;
        }
        if self.inactivity.awaiting_confirmation() {
            return self
                .confirm_presence()
                .into_iter()
                .find(|e| matches!(e, Event::TimerResumed { .. }));
        }
        let now = self.time.now();
        self.clock.start(now);
        if self.phase == Phase::Work {
            self.arm_inactivity(now);
        }
        Some(Event::TimerResumed {
            seconds_remaining: self.clock.seconds_remaining(),
            at: Utc::now(),
        })
    }

    /// Start/pause button.
    pub fn toggle(&mut self) -> Vec<Event> {
        if self.clock.is_running() {
            self.pause().into_iter().collect()
        } else {
            self.start()
        }
    }

    /// Apply exactly one elapsed second.
    pub fn tick(&mut self) -> Vec<Event> {
        match self.clock.tick() {
            TickOutcome::Idle => Vec::new(),
            TickOutcome::Counting { seconds_remaining } => {
                if self.phase == Phase::Work && WORK_WARNINGS.contains(&seconds_remaining) {
                    vec![Event::TimeWarning {
                        phase: self.phase,
                        seconds_remaining,
                        at: Utc::now(),
                    }]
                } else {
                    Vec::new()
                }
            }
            TickOutcome::Expired => self.complete_phase(),
        }
    }

    /// Catch up with the time source: fire a due auto-start, then apply
    /// every whole second elapsed since the last call. Ticks stop at each
    /// watchdog check that fell inside the gap, so a stalled driver cannot
    /// run a phase out past a check that would have paused it.
    pub fn advance(&mut self) -> Vec<Event> {
        let now = self.time.now();
        let mut events = Vec::new();

        if let Some(at) = self.pending_auto_start {
            if now >= at {
                self.pending_auto_start = None;
                events.extend(self.start());
            }
        }

        let mut due = self.clock.due_ticks(now);
        loop {
            let check_at = self.due_check(now);
            let batch = match check_at {
                Some(at) => self.clock.due_ticks(at).min(due),
                None => due,
            };
            for _ in 0..batch {
                due -= 1;
                events.extend(self.tick());
                if !self.clock.is_running() {
                    return events;
                }
            }
            match check_at {
                Some(at) => {
                    if self.poll_inactivity(at, &mut events) {
                        break;
                    }
                }
                None => break,
            }
        }

        events
    }

    /// Force the next phase. Skip never lands on a long break, whatever the
    /// completion count.
    pub fn skip(&mut self) -> Vec<Event> {
        let from = self.phase;
        let to = sequencer::after_skip(from);
        let session_id = self.active_session.take();
        self.phase = to;
        self.clock.reset(self.config.seconds_for(to));
        self.inactivity.restart_sequence();
        self.pending_auto_start = None;
        tracing::info!(%from, %to, "phase skipped");
        vec![Event::PhaseSkipped {
            session_id,
            from,
            to,
            at: Utc::now(),
        }]
    }

    /// Answer to "still there?".
    pub fn confirm_presence(&mut self) -> Vec<Event> {
        if !self.inactivity.awaiting_confirmation() {
            return Vec::new();
        }
        let now = self.time.now();
        self.activity.record_activity();
        self.inactivity.confirm_presence(now);
        if !self.inactivity_enabled {
            self.inactivity.disarm();
        }
        let mut events = vec![Event::PresenceConfirmed { at: Utc::now() }];
        if self.active_session.is_some() {
            self.clock.start(now);
            events.push(Event::TimerResumed {
                seconds_remaining: self.clock.seconds_remaining(),
                at: Utc::now(),
            });
        }
        events
    }

    /// Swap in new settings after validating them.
    ///
    /// An idle engine reloads the current phase duration; a running or
    /// paused session keeps its countdown.
    pub fn apply_config(&mut self, config: SessionConfig) -> Result<Event, ValidationError> {
        if let Err(e) = config.validate() {
            tracing::warn!(error = %e, "rejected session config");
            return Err(e);
        }
        self.config = config;
        if !self.clock.is_running() && self.active_session.is_none() {
            self.clock.reset(self.config.seconds_for(self.phase));
        }
        Ok(Event::ConfigApplied { at: Utc::now() })
    }

    /// Stop everything scheduled. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.clock.pause();
        self.inactivity.disarm();
        self.pending_auto_start = None;
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Pending watchdog check at or before `now`, if the watchdog applies.
    fn due_check(&self, now: Instant) -> Option<Instant> {
        if !self.clock.is_running() || self.phase != Phase::Work || !self.inactivity_enabled {
            return None;
        }
        self.inactivity.next_check_at().filter(|at| *at <= now)
    }

    /// Fire the check due at `at`. Returns true if it paused the clock.
    fn poll_inactivity(&mut self, at: Instant, events: &mut Vec<Event>) -> bool {
        match self.inactivity.poll(at, &self.activity) {
            Some(InactivityVerdict::Away { idle, threshold_minutes }) => {
                self.clock.pause();
                events.push(Event::InactivityDetected {
                    idle_secs: idle.as_secs(),
                    threshold_minutes,
                    at: Utc::now(),
                });
                true
            }
            _ => false,
        }
    }

    fn arm_inactivity(&mut self, now: Instant) {
        if self.inactivity_enabled {
            self.inactivity.arm(now);
        }
    }

    fn complete_phase(&mut self) -> Vec<Event> {
        let now = self.time.now();
        self.clock.pause();
        self.inactivity.disarm();

        let finished = self.phase;
        let transition = sequencer::after_completion(
            finished,
            self.completed_work_phases,
            self.config.sessions_before_long_break,
        );
        let session_id = self.active_session.take();
        self.completed_work_phases = transition.completed_work_phases;
        self.phase = transition.next;
        self.clock.reset(self.config.seconds_for(transition.next));
        tracing::info!(
            phase = %finished,
            next = %transition.next,
            completed = self.completed_work_phases,
            "phase completed"
        );

        let mut events = vec![Event::PhaseCompleted {
            session_id,
            phase: finished,
            next: transition.next,
            completed_work_phases: self.completed_work_phases,
            at: Utc::now(),
        }];
        if self.config.auto_starts(transition.next) {
            self.pending_auto_start = Some(now + AUTO_START_DELAY);
            events.push(Event::AutoStartScheduled {
                phase: transition.next,
                delay_ms: AUTO_START_DELAY.as_millis() as u64,
                at: Utc::now(),
            });
        }
        events
    }
}

impl std::fmt::Debug for FocusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusEngine")
            .field("phase", &self.phase)
            .field("seconds_remaining", &self.clock.seconds_remaining())
            .field("running", &self.clock.is_running())
            .field("completed_work_phases", &self.completed_work_phases)
            .field("active_session", &self.active_session)
            .finish()
    }
}
