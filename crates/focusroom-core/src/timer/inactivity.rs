//! "Are you still there?" watchdog for Work phases.
//!
//! Checks are one-shot and escalate: 15 minutes, then 25, then a uniform
//! draw from 20..=40 for every later check. A check that finds the user
//! idle for at least its own interval trips the watchdog, which then stays
//! quiet until presence is confirmed.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::activity::ActivityTracker;

pub const FIRST_CHECK_MINUTES: u64 = 15;
pub const SECOND_CHECK_MINUTES: u64 = 25;
pub const LATER_CHECK_RANGE_MINUTES: std::ops::RangeInclusive<u64> = 20..=40;

/// Result of polling the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactivityVerdict {
    /// A check fired and found recent input; the next one is scheduled.
    Present { next_check_minutes: u64 },
    /// A check fired and found no input for at least `threshold_minutes`.
    Away { idle: Duration, threshold_minutes: u64 },
}

#[derive(Debug)]
pub struct InactivityMonitor {
    rng: Pcg64,
    checks_done: u32,
    /// Scheduled check: when it fires and which interval it uses.
    pending: Option<(Instant, u64)>,
    awaiting_confirmation: bool,
}

impl InactivityMonitor {
    pub fn new() -> Self {
        Self::with_rng(Pcg64::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(Pcg64::seed_from_u64(seed))
    }

    fn with_rng(rng: Pcg64) -> Self {
        Self {
            rng,
            checks_done: 0,
            pending: None,
            awaiting_confirmation: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn awaiting_confirmation(&self) -> bool {
        self.awaiting_confirmation
    }

    pub fn checks_done(&self) -> u32 {
        self.checks_done
    }

    /// Interval of the scheduled check, if any.
    pub fn next_check_minutes(&self) -> Option<u64> {
        self.pending.map(|(_, minutes)| minutes)
    }

    pub fn next_check_at(&self) -> Option<Instant> {
        self.pending.map(|(at, _)| at)
    }

    /// Schedule the next check relative to `now`. No-op while a check is
    /// already pending or the watchdog is waiting for confirmation.
    pub fn arm(&mut self, now: Instant) {
        if self.pending.is_some() || self.awaiting_confirmation {
            return;
        }
        let minutes = self.interval_for(self.checks_done);
        self.pending = Some((now + Duration::from_secs(minutes * 60), minutes));
    }

    /// Cancel the pending check (pause, phase change, teardown).
    pub fn disarm(&mut self) {
        self.pending = None;
    }

    /// Start over at the first interval. Used when a new Work phase begins.
    pub fn restart_sequence(&mut self) {
        self.checks_done = 0;
        self.pending = None;
        self.awaiting_confirmation = false;
    }

    /// Fire the pending check if it is due. Idle time is measured at `now`,
    /// which may lie in the past when a late driver catches up.
    pub fn poll(&mut self, now: Instant, activity: &ActivityTracker) -> Option<InactivityVerdict> {
        let (due, minutes) = self.pending?;
        if now < due {
            return None;
        }
        self.pending = None;
        let idle = now.saturating_duration_since(activity.last_activity());
        if idle >= Duration::from_secs(minutes * 60) {
            self.awaiting_confirmation = true;
            tracing::info!(idle_secs = idle.as_secs(), threshold_minutes = minutes, "no activity detected");
            return Some(InactivityVerdict::Away {
                idle,
                threshold_minutes: minutes,
            });
        }
        self.checks_done = self.checks_done.saturating_add(1);
        self.arm(now);
        let next_check_minutes = self.next_check_minutes().unwrap_or(minutes);
        tracing::debug!(checks_done = self.checks_done, next_check_minutes, "activity check passed");
        Some(InactivityVerdict::Present { next_check_minutes })
    }

    /// The user said they are here: reset the sequence and re-arm.
    pub fn confirm_presence(&mut self, now: Instant) {
        self.restart_sequence();
        self.arm(now);
    }

    fn interval_for(&mut self, checks_done: u32) -> u64 {
        match checks_done {
            0 => FIRST_CHECK_MINUTES,
            1 => SECOND_CHECK_MINUTES,
            _ => self.rng.gen_range(LATER_CHECK_RANGE_MINUTES),
        }
    }
}

impl Default for InactivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{ManualTimeSource, TimeSource};
    use std::sync::Arc;

    fn setup() -> (Arc<ManualTimeSource>, ActivityTracker, InactivityMonitor) {
        let time = Arc::new(ManualTimeSource::new());
        let tracker = ActivityTracker::new(time.clone());
        (time, tracker, InactivityMonitor::with_seed(7))
    }

    #[test]
    fn first_check_trips_after_fifteen_idle_minutes() {
        let (time, tracker, mut monitor) = setup();
        monitor.arm(time.now());
        assert_eq!(monitor.next_check_minutes(), Some(15));

        time.advance_mins(14);
        assert_eq!(monitor.poll(time.now(), &tracker), None);

        time.advance_mins(1);
        let verdict = monitor.poll(time.now(), &tracker);
        assert!(matches!(verdict, Some(InactivityVerdict::Away { threshold_minutes: 15, .. })));
        assert!(monitor.awaiting_confirmation());
        assert!(!monitor.is_armed());

        // Quiet until confirmed.
        monitor.arm(time.now());
        time.advance_mins(60);
        assert_eq!(monitor.poll(time.now(), &tracker), None);
    }

    #[test]
    fn active_user_escalates_interval() {
        let (time, tracker, mut monitor) = setup();
        monitor.arm(time.now());

        time.advance_mins(10);
        tracker.record_activity();
        time.advance_mins(5);
        assert_eq!(
            monitor.poll(time.now(), &tracker),
            Some(InactivityVerdict::Present { next_check_minutes: 25 })
        );

        time.advance_mins(20);
        tracker.record_activity();
        time.advance_mins(5);
        match monitor.poll(time.now(), &tracker) {
            Some(InactivityVerdict::Present { next_check_minutes }) => {
                assert!(LATER_CHECK_RANGE_MINUTES.contains(&next_check_minutes));
            }
            other => panic!("expected Present, got {other:?}"),
        }
        assert_eq!(monitor.checks_done(), 2);
    }

    #[test]
    fn confirm_resets_to_first_interval() {
        let (time, tracker, mut monitor) = setup();
        monitor.arm(time.now());
        time.advance_mins(15);
        tracker.record_activity();
        monitor.poll(time.now(), &tracker);
        assert_eq!(monitor.next_check_minutes(), Some(25));

        time.advance_mins(25);
        assert!(matches!(
            monitor.poll(time.now(), &tracker),
            Some(InactivityVerdict::Away { threshold_minutes: 25, .. })
        ));

        monitor.confirm_presence(time.now());
        assert!(!monitor.awaiting_confirmation());
        assert_eq!(monitor.checks_done(), 0);
        assert_eq!(monitor.next_check_minutes(), Some(15));
    }

    #[test]
    fn late_poll_measures_idle_at_check_time() {
        let (time, tracker, mut monitor) = setup();
        let start = time.now();
        monitor.arm(start);

        time.advance_mins(20);
        tracker.record_activity();
        // Input after the check instant does not count as idle time.
        let at = monitor.next_check_at().unwrap();
        assert_eq!(
            monitor.poll(at, &tracker),
            Some(InactivityVerdict::Present { next_check_minutes: 25 })
        );
        assert_eq!(
            monitor.next_check_at(),
            Some(start + Duration::from_secs(40 * 60))
        );
    }

    #[test]
    fn later_draws_stay_in_range() {
        let mut monitor = InactivityMonitor::with_seed(42);
        for _ in 0..500 {
            let minutes = monitor.interval_for(5);
            assert!(LATER_CHECK_RANGE_MINUTES.contains(&minutes));
        }
    }
}
