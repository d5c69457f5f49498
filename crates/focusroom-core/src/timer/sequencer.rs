//! Phase sequencing rules.
//!
//! Natural completion and manual skip deliberately disagree: only natural
//! completion of a Work phase can land on a long break.

use super::schedule::Phase;

/// Where a naturally completed phase leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: Phase,
    pub completed_work_phases: u32,
}

/// Next phase after `phase` ran to zero.
///
/// Completing Work bumps the counter; the destination is a long break iff
/// the new count is a multiple of `sessions_before_long_break`.
pub fn after_completion(
    phase: Phase,
    completed_work_phases: u32,
    sessions_before_long_break: u32,
) -> Transition {
    match phase {
        Phase::Work => {
            let completed = completed_work_phases.saturating_add(1);
            let every = sessions_before_long_break.max(1);
            let next = if completed % every == 0 {
                Phase::LongBreak
            } else {
                Phase::ShortBreak
            };
            Transition {
                next,
                completed_work_phases: completed,
            }
        }
        Phase::ShortBreak | Phase::LongBreak => Transition {
            next: Phase::Work,
            completed_work_phases,
        },
    }
}

/// Next phase after a manual skip. Never a long break.
pub fn after_skip(phase: Phase) -> Phase {
    match phase {
        Phase::Work => Phase::ShortBreak,
        Phase::ShortBreak | Phase::LongBreak => Phase::Work,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fourth_completion_earns_long_break() {
        let mut completed = 0;
        let mut seen = Vec::new();
        for _ in 0..5 {
            let t = after_completion(Phase::Work, completed, 4);
            completed = t.completed_work_phases;
            seen.push(t.next);
        }
        assert_eq!(
            seen,
            vec![
                Phase::ShortBreak,
                Phase::ShortBreak,
                Phase::ShortBreak,
                Phase::LongBreak,
                Phase::ShortBreak,
            ]
        );
        assert_eq!(completed, 5);
    }

    #[test]
    fn breaks_return_to_work_without_counting() {
        let t = after_completion(Phase::LongBreak, 4, 4);
        assert_eq!(t.next, Phase::Work);
        assert_eq!(t.completed_work_phases, 4);
        let t = after_completion(Phase::ShortBreak, 1, 4);
        assert_eq!(t.next, Phase::Work);
        assert_eq!(t.completed_work_phases, 1);
    }

    #[test]
    fn threshold_of_one_always_long() {
        for n in 0..3 {
            assert_eq!(after_completion(Phase::Work, n, 1).next, Phase::LongBreak);
        }
    }

    #[test]
    fn skip_never_lands_on_long_break() {
        assert_eq!(after_skip(Phase::Work), Phase::ShortBreak);
        assert_eq!(after_skip(Phase::ShortBreak), Phase::Work);
        assert_eq!(after_skip(Phase::LongBreak), Phase::Work);
    }

    proptest! {
        #[test]
        fn long_break_iff_multiple(completed in 0u32..10_000, every in 1u32..12) {
            let t = after_completion(Phase::Work, completed, every);
            prop_assert_eq!(t.completed_work_phases, completed + 1);
            prop_assert_eq!(t.next == Phase::LongBreak, (completed + 1) % every == 0);
        }
    }
}
