use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::timer::{Phase, SessionConfig};

/// User id recorded by the single-user local store.
pub const LOCAL_USER_ID: &str = "local";

/// One run of a phase, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub task_id: Option<String>,
    pub duration_minutes: u32,
    pub session_type: Phase,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn begin(
        id: Uuid,
        phase: Phase,
        duration_minutes: u32,
        task_id: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id: None,
            task_id,
            duration_minutes,
            session_type: phase,
            completed: false,
            started_at,
            ended_at: None,
        }
    }
}

/// Backing store for settings, session records and XP awards.
///
/// The engine never waits on these calls; they run on the persistence
/// worker and failures are only logged.
#[allow(async_fn_in_trait)]
pub trait SessionStore {
    /// Stored settings, `None` if the user has none yet.
    async fn load_config(&self) -> Result<Option<SessionConfig>, PersistenceError>;
    /// Insert or replace the user's settings.
    async fn save_config(&self, config: &SessionConfig) -> Result<(), PersistenceError>;
    async fn begin_session(&self, record: &SessionRecord) -> Result<(), PersistenceError>;
    async fn complete_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError>;
    /// Close the record as not completed.
    async fn abort_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError>;
    async fn award_xp(&self, amount: i64, source: &str) -> Result<(), PersistenceError>;
}

/// Load settings, seeding defaults when the user has none.
///
/// Never fails: a store error yields the built-in defaults so the timer
/// stays usable.
pub async fn load_or_seed_config<S: SessionStore>(store: &S) -> SessionConfig {
    match store.load_config().await {
        Ok(Some(config)) => match config.validate() {
            Ok(()) => config,
            Err(e) => {
                tracing::warn!(error = %e, "stored settings are invalid, using defaults");
                SessionConfig::default()
            }
        },
        Ok(None) => {
            let defaults = SessionConfig::default();
            if let Err(e) = store.save_config(&defaults).await {
                tracing::warn!(error = %e, "failed to seed default settings");
            }
            defaults
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            SessionConfig::default()
        }
    }
}

impl<S: SessionStore> SessionStore for std::sync::Arc<S> {
    async fn load_config(&self) -> Result<Option<SessionConfig>, PersistenceError> {
        (**self).load_config().await
    }
    async fn save_config(&self, config: &SessionConfig) -> Result<(), PersistenceError> {
        (**self).save_config(config).await
    }
    async fn begin_session(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        (**self).begin_session(record).await
    }
    async fn complete_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        (**self).complete_session(id, ended_at).await
    }
    async fn abort_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        (**self).abort_session(id, ended_at).await
    }
    async fn award_xp(&self, amount: i64, source: &str) -> Result<(), PersistenceError> {
        (**self).award_xp(amount, source).await
    }
}
