//! Event dispatch and the cooperative session loop.
//!
//! [`SessionRuntime`] owns the engine and turns every [`Event`] it emits
//! into side effects: store requests on the persistence queue, permission
//! gated notifications, and overlay repaints. Nothing here waits on the
//! store. [`SessionRuntime::run`] multiplexes the one-second clock, the
//! overlay frame timer and user commands on a single task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::activity::InputKind;
use crate::error::OverlayError;
use crate::events::Event;
use crate::notify::NotificationChannel;
use crate::overlay::{OverlayPlatform, PictureInPicture};
use crate::storage::{AppConfig, PersistenceHandle, SessionRecord, StoreRequest};
use crate::timer::{FocusEngine, Phase, SessionConfig, SessionSnapshot};
use crate::xp::{DEFAULT_WORK_SESSION_XP, DEFAULT_XP_SOURCE};

const CLOCK_PERIOD: Duration = Duration::from_secs(1);

/// User actions accepted by the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start/pause button.
    Toggle,
    Skip,
    ConfirmPresence,
    ToggleOverlay,
    Input(InputKind),
    SetTask(Option<String>),
    ApplyConfig(SessionConfig),
    Quit,
}

/// XP awarded for each completed Work phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpAward {
    pub amount: i64,
    pub source: String,
}

impl Default for XpAward {
    fn default() -> Self {
        Self {
            amount: DEFAULT_WORK_SESSION_XP,
            source: DEFAULT_XP_SOURCE.to_string(),
        }
    }
}

impl From<&AppConfig> for XpAward {
    fn from(config: &AppConfig) -> Self {
        Self {
            amount: config.xp.per_work_session,
            source: config.xp.source_label.clone(),
        }
    }
}

/// Receives what the loop does, e.g. to print status lines.
pub trait RuntimeObserver {
    fn on_event(&mut self, event: &Event);
    /// Called after every clock period with fresh state.
    fn on_clock(&mut self, _snapshot: &SessionSnapshot) {}
}

impl RuntimeObserver for () {
    fn on_event(&mut self, _event: &Event) {}
}

/// Store writes implied by one event.
pub fn store_requests_for(event: &Event, award: &XpAward) -> Vec<StoreRequest> {
    match event {
        Event::PhaseStarted {
            session_id,
            phase,
            duration_minutes,
            task_id,
            at,
        } => vec![StoreRequest::Begin(SessionRecord::begin(
            *session_id,
            *phase,
            *duration_minutes,
            task_id.clone(),
            *at,
        ))],
        Event::PhaseCompleted {
            session_id, phase, at, ..
        } => {
            let mut requests = Vec::new();
            if let Some(id) = session_id {
                requests.push(StoreRequest::Complete {
                    id: *id,
                    ended_at: *at,
                });
            }
            if *phase == Phase::Work && award.amount > 0 {
                requests.push(StoreRequest::AwardXp {
                    amount: award.amount,
                    source: award.source.clone(),
                });
            }
            requests
        }
        Event::PhaseSkipped {
            session_id: Some(id),
            at,
            ..
        } => vec![StoreRequest::Abort {
            id: *id,
            ended_at: *at,
        }],
        _ => Vec::new(),
    }
}

/// Title and body of the notification an event raises, if any.
pub fn notification_for(event: &Event, award: &XpAward) -> Option<(String, String)> {
    match event {
        Event::PhaseStarted {
            phase,
            duration_minutes,
            ..
        } => {
            let title = if *phase == Phase::Work {
                "Focus started"
            } else {
                "Break started"
            };
            Some((title.to_string(), format!("{duration_minutes} minutes")))
        }
        Event::TimeWarning {
            seconds_remaining, ..
        } => match seconds_remaining {
            300 => Some(("5 minutes left".to_string(), "Keep going!".to_string())),
            60 => Some(("1 minute left".to_string(), "Almost there!".to_string())),
            _ => None,
        },
        Event::PhaseCompleted { phase, .. } => Some(if *phase == Phase::Work {
            (
                "Session complete!".to_string(),
                format!("You earned {} XP. Take a break.", award.amount),
            )
        } else {
            ("Break over".to_string(), "Ready for another session?".to_string())
        }),
        Event::InactivityDetected { .. } => Some((
            "Still there?".to_string(),
            "No activity detected. Timer paused.".to_string(),
        )),
        _ => None,
    }
}

pub struct SessionRuntime<P: OverlayPlatform> {
    engine: FocusEngine,
    persistence: PersistenceHandle,
    notifications: NotificationChannel,
    overlay: PictureInPicture<P>,
    award: XpAward,
    torn_down: bool,
}

impl<P: OverlayPlatform> SessionRuntime<P> {
    pub fn new(
        engine: FocusEngine,
        persistence: PersistenceHandle,
        notifications: NotificationChannel,
        overlay: PictureInPicture<P>,
        award: XpAward,
    ) -> Self {
        Self {
            engine,
            persistence,
            notifications,
            overlay,
            award,
            torn_down: false,
        }
    }

    pub fn engine(&self) -> &FocusEngine {
        &self.engine
    }

    pub fn overlay(&self) -> &PictureInPicture<P> {
        &self.overlay
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.engine.snapshot()
    }

    /// Apply one command and dispatch what it produced.
    pub fn handle(&mut self, command: Command) -> Vec<Event> {
        let events = match command {
            Command::Toggle => self.engine.toggle(),
            Command::Skip => self.engine.skip(),
            Command::ConfirmPresence => self.engine.confirm_presence(),
            Command::ToggleOverlay => {
                self.toggle_overlay();
                Vec::new()
            }
            Command::Input(kind) => {
                self.engine.record_input(kind);
                Vec::new()
            }
            Command::SetTask(task) => {
                self.engine.set_task(task);
                Vec::new()
            }
            Command::ApplyConfig(config) => match self.engine.apply_config(config.clone()) {
                Ok(event) => {
                    self.submit(StoreRequest::SaveConfig(config));
                    vec![event]
                }
                Err(e) => {
                    warn!(error = %e, "config change rejected");
                    Vec::new()
                }
            },
            Command::Quit => Vec::new(),
        };
        self.dispatch(&events);
        events
    }

    /// Catch the engine up with the clock and dispatch the result.
    pub fn advance(&mut self) -> Vec<Event> {
        let events = self.engine.advance();
        self.dispatch(&events);
        events
    }

    pub fn dispatch(&mut self, events: &[Event]) {
        for event in events {
            debug!(kind = event.kind(), "dispatch");
            for request in store_requests_for(event, &self.award) {
                self.submit(request);
            }
            if let Some((title, body)) = notification_for(event, &self.award) {
                self.notifications.send(&title, &body);
            }
        }
        if !events.is_empty() {
            self.repaint();
        }
    }

    fn submit(&self, request: StoreRequest) {
        let kind = request.kind();
        if let Err(e) = self.persistence.submit(request) {
            warn!(kind, error = %e, "dropping store request");
        }
    }

    pub fn open_overlay(&mut self) -> Result<(), OverlayError> {
        let snapshot = self.engine.snapshot();
        self.overlay.open(&snapshot)
    }

    pub fn close_overlay(&mut self) {
        self.overlay.close();
    }

    pub fn toggle_overlay(&mut self) {
        if self.overlay.is_active() {
            self.close_overlay();
            return;
        }
        match self.open_overlay() {
            Ok(()) => info!("overlay opened"),
            Err(e @ (OverlayError::Unsupported | OverlayError::PermissionDenied)) => {
                info!(reason = %e, "overlay disabled")
            }
            Err(e) => warn!(error = %e, "overlay unavailable"),
        }
    }

    /// Paint the latest snapshot onto the overlay, if open.
    pub fn repaint(&mut self) {
        if !self.overlay.is_active() {
            return;
        }
        let snapshot = self.engine.snapshot();
        if let Err(e) = self.overlay.repaint(&snapshot) {
            warn!(error = %e, "overlay stream failed, closing");
        }
    }

    /// Stop the clock, the watchdog and the overlay. Idempotent.
    pub fn teardown(&mut self) {
        self.engine.teardown();
        self.overlay.close();
        if !self.torn_down {
            self.torn_down = true;
            debug!("runtime torn down");
        }
    }

    /// Drive the engine until `Quit` arrives or every command sender is
    /// dropped. Returns the final state.
    pub async fn run<O: RuntimeObserver>(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        observer: &mut O,
    ) -> SessionSnapshot {
        let mut clock = tokio::time::interval(CLOCK_PERIOD);
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames = tokio::time::interval(self.overlay.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = clock.tick() => {
                    for event in self.advance() {
                        observer.on_event(&event);
                    }
                    observer.on_clock(&self.engine.snapshot());
                }
                _ = frames.tick(), if self.overlay.is_active() => {
                    self.repaint();
                }
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if command == Command::Quit {
                        break;
                    }
                    for event in self.handle(command) {
                        observer.on_event(&event);
                    }
                }
            }
        }

        self.teardown();
        self.engine.snapshot()
    }
}

impl<P: OverlayPlatform> Drop for SessionRuntime<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityTracker;
    use crate::notify::{Permission, RecordingNotifier};
    use crate::overlay::TerminalOverlay;
    use crate::storage::persistence_channel;
    use crate::storage::store::testing::RecordingStore;
    use crate::storage::PersistenceWorker;
    use crate::time::ManualTimeSource;
    use crate::timer::InactivityMonitor;
    use std::sync::Arc;

    type TestRuntime = SessionRuntime<TerminalOverlay<Vec<u8>>>;

    struct Harness {
        time: Arc<ManualTimeSource>,
        notes: RecordingNotifier,
        store: Arc<RecordingStore>,
        worker: PersistenceWorker<Arc<RecordingStore>>,
        runtime: TestRuntime,
    }

    fn harness(config: SessionConfig, overlay_supported: bool) -> Harness {
        let time = Arc::new(ManualTimeSource::new());
        let activity = ActivityTracker::new(time.clone());
        let engine = FocusEngine::with_config(config, time.clone(), activity)
            .with_inactivity_monitor(InactivityMonitor::with_seed(3));
        let notes = RecordingNotifier::default();
        let store = Arc::new(RecordingStore::default());
        let (handle, worker) = persistence_channel(Arc::clone(&store));
        let runtime = SessionRuntime::new(
            engine,
            handle,
            NotificationChannel::new(Permission::Granted, Box::new(notes.clone())),
            PictureInPicture::new(TerminalOverlay::new(Vec::new(), overlay_supported), 30),
            XpAward::default(),
        );
        Harness {
            time,
            notes,
            store,
            worker,
            runtime,
        }
    }

    fn one_minute_work() -> SessionConfig {
        SessionConfig {
            work_duration: 1,
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn completed_work_persists_and_awards_once() {
        let Harness {
            time,
            notes,
            store,
            worker,
            mut runtime,
        } = harness(one_minute_work(), false);

        runtime.handle(Command::Toggle);
        time.advance_secs(60);
        let events = runtime.advance();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::PhaseCompleted { phase: Phase::Work, .. })));
        // Nothing more to do once the phase is over.
        time.advance_secs(5);
        assert!(runtime.advance().is_empty());

        assert_eq!(
            notes.sent(),
            vec![
                ("Focus started".to_string(), "1 minutes".to_string()),
                (
                    "Session complete!".to_string(),
                    "You earned 50 XP. Take a break.".to_string()
                ),
            ]
        );

        drop(runtime);
        let stats = worker.run().await;
        assert_eq!(stats.failed, 0);
        assert_eq!(
            store.calls(),
            vec!["begin:work:1", "complete", "xp:50:pomodoro_completed"]
        );
    }

    #[tokio::test]
    async fn skip_aborts_active_session_without_xp() {
        let Harness {
            notes,
            store,
            worker,
            mut runtime,
            ..
        } = harness(SessionConfig::default(), false);

        runtime.handle(Command::Toggle);
        runtime.handle(Command::Skip);
        // Skipping an idle phase records nothing.
        runtime.handle(Command::Skip);

        assert_eq!(notes.titles(), vec!["Focus started"]);
        drop(runtime);
        worker.run().await;
        assert_eq!(store.calls(), vec!["begin:work:25", "abort"]);
    }

    #[test]
    fn warnings_and_break_notifications() {
        let award = XpAward::default();
        let warning = |secs| Event::TimeWarning {
            phase: Phase::Work,
            seconds_remaining: secs,
            at: chrono::Utc::now(),
        };
        assert_eq!(
            notification_for(&warning(300), &award).map(|n| n.0),
            Some("5 minutes left".to_string())
        );
        assert_eq!(
            notification_for(&warning(60), &award).map(|n| n.1),
            Some("Almost there!".to_string())
        );
        assert!(notification_for(&warning(120), &award).is_none());

        let break_done = Event::PhaseCompleted {
            session_id: None,
            phase: Phase::ShortBreak,
            next: Phase::Work,
            completed_work_phases: 1,
            at: chrono::Utc::now(),
        };
        assert_eq!(
            notification_for(&break_done, &award).map(|n| n.0),
            Some("Break over".to_string())
        );
        assert!(store_requests_for(&break_done, &award).is_empty());
    }

    #[test]
    fn inactivity_raises_still_there() {
        let Harness {
            time,
            notes,
            mut runtime,
            ..
        } = harness(SessionConfig::default(), false);
        runtime.handle(Command::Toggle);
        time.advance_mins(15);
        let events = runtime.advance();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::InactivityDetected { .. })));
        assert!(notes.titles().contains(&"Still there?".to_string()));
        assert!(!runtime.engine().is_running());

        let events = runtime.handle(Command::ConfirmPresence);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::TimerResumed { .. })));
        assert!(runtime.engine().is_running());
    }

    #[test]
    fn denied_notifications_stay_silent() {
        let Harness {
            notes, mut runtime, ..
        } = harness(SessionConfig::default(), false);
        runtime.notifications.set_permission(Permission::Denied);
        runtime.handle(Command::Toggle);
        assert!(notes.sent().is_empty());
        assert!(runtime.engine().is_running());
    }

    #[test]
    fn overlay_toggle_and_teardown_release_stream() {
        let Harness { mut runtime, .. } = harness(SessionConfig::default(), true);
        runtime.handle(Command::ToggleOverlay);
        assert!(runtime.overlay().is_active());
        assert_eq!(runtime.overlay().frames_rendered(), 1);

        runtime.handle(Command::Toggle);
        assert_eq!(runtime.overlay().frames_rendered(), 2);

        runtime.teardown();
        runtime.teardown();
        assert!(!runtime.overlay().is_active());
        assert!(!runtime.engine().is_running());
    }

    #[test]
    fn overlay_reopens_after_toggle_off() {
        let Harness { mut runtime, .. } = harness(SessionConfig::default(), true);
        runtime.handle(Command::ToggleOverlay);
        assert!(runtime.overlay().is_active());
        runtime.handle(Command::ToggleOverlay);
        assert!(!runtime.overlay().is_active());
        assert!(!runtime.overlay().platform().in_use());
        runtime.handle(Command::ToggleOverlay);
        assert!(runtime.overlay().is_active());
        assert!(runtime.overlay().platform().in_use());
    }

    #[test]
    fn unsupported_overlay_is_not_fatal() {
        let Harness { mut runtime, .. } = harness(SessionConfig::default(), false);
        runtime.handle(Command::ToggleOverlay);
        assert!(!runtime.overlay().is_active());
        assert!(matches!(runtime.open_overlay(), Err(OverlayError::Unsupported)));
    }

    #[tokio::test]
    async fn invalid_config_is_not_saved() {
        let Harness {
            store,
            worker,
            mut runtime,
            ..
        } = harness(SessionConfig::default(), false);
        let bad = SessionConfig {
            work_duration: 0,
            ..SessionConfig::default()
        };
        assert!(runtime.handle(Command::ApplyConfig(bad)).is_empty());
        let good = SessionConfig {
            work_duration: 40,
            ..SessionConfig::default()
        };
        assert_eq!(runtime.handle(Command::ApplyConfig(good)).len(), 1);
        assert_eq!(runtime.snapshot().total_seconds, 40 * 60);

        drop(runtime);
        worker.run().await;
        assert_eq!(store.calls(), vec!["save_config:40"]);
    }

    #[tokio::test]
    async fn run_loop_stops_on_quit_and_tears_down() {
        let Harness { runtime, .. } = harness(SessionConfig::default(), false);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Command::Toggle).unwrap();
        tx.send(Command::Quit).unwrap();

        #[derive(Default)]
        struct Seen(Vec<&'static str>);
        impl RuntimeObserver for Seen {
            fn on_event(&mut self, event: &Event) {
                self.0.push(event.kind());
            }
        }

        let mut seen = Seen::default();
        let snapshot = runtime.run(rx, &mut seen).await;
        assert!(seen.0.contains(&"phase_started"));
        assert!(!snapshot.is_running);
        assert!(snapshot.active_session_id.is_some());
    }
}
