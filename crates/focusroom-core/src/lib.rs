//! # Focusroom Core Library
//!
//! Core logic for the Focusroom focus-session timer. The `focusroom` CLI is
//! a thin shell over this crate.
//!
//! ## Architecture
//!
//! - **Focus Engine**: a single-owner Pomodoro state machine driven by a
//!   monotonic time source; every mutation returns [`Event`]s and performs
//!   no I/O
//! - **Inactivity Monitor**: randomized "still there?" checks during Work
//! - **Overlay**: picture-in-picture frames composed from fresh snapshots
//! - **Storage**: per-user session settings and records in SQLite or a
//!   hosted REST store, written through a fire-and-forget worker, plus the
//!   TOML application config
//! - **Runtime**: turns events into store requests, notifications and
//!   repaints
//!
//! ## Key Components
//!
//! - [`FocusEngine`]: Core timer state machine
//! - [`SessionRuntime`]: Event dispatch and the session loop
//! - [`SessionStore`]: Persistence seam (local and remote)
//! - [`AppConfig`]: Application configuration management

pub mod activity;
pub mod error;
pub mod events;
pub mod notify;
pub mod overlay;
pub mod runtime;
pub mod storage;
pub mod time;
pub mod timer;
pub mod xp;

pub use activity::{ActivityTracker, InputKind};
pub use error::{
    ConfigError, CoreError, DatabaseError, OverlayError, PersistenceError, ValidationError,
};
pub use events::Event;
pub use notify::{NotificationChannel, Notifier, Permission};
pub use overlay::{OverlayFrame, PictureInPicture, TerminalOverlay};
pub use runtime::{Command, RuntimeObserver, SessionRuntime, XpAward};
pub use storage::{
    AppConfig, ConfiguredStore, PersistenceHandle, SessionRecord, SessionStore, SqliteStore,
    StoreBackend,
};
pub use time::{ManualTimeSource, SharedTime, SystemTimeSource, TimeSource};
pub use timer::{FocusEngine, Phase, SessionConfig, SessionSnapshot};
pub use xp::XpProgress;
