mod clock;
mod engine;
mod inactivity;
mod schedule;
pub mod sequencer;

pub use clock::{format_mmss, SessionClock, TickOutcome};
pub use engine::{FocusEngine, SessionSnapshot, AUTO_START_DELAY};
pub use inactivity::{
    InactivityMonitor, InactivityVerdict, FIRST_CHECK_MINUTES, LATER_CHECK_RANGE_MINUTES,
    SECOND_CHECK_MINUTES,
};
pub use schedule::{Phase, SessionConfig};
