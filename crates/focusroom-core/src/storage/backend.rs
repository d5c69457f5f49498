use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::config::{AppConfig, StoreBackend};
use super::database::SqliteStore;
use super::rest::RestStore;
use super::store::{SessionRecord, SessionStore};
use crate::error::{CoreError, PersistenceError};
use crate::timer::SessionConfig;

/// The store selected by `[store] backend`.
pub enum ConfiguredStore {
    Local(SqliteStore),
    Remote(RestStore),
}

impl ConfiguredStore {
    /// Open the backend named in `config`.
    ///
    /// # Errors
    ///
    /// Fails if the local database cannot be opened or the remote section
    /// is incomplete.
    pub fn open(config: &AppConfig) -> Result<Self, CoreError> {
        match config.store.backend {
            StoreBackend::Local => Ok(Self::Local(SqliteStore::open_default()?)),
            StoreBackend::Remote => Ok(Self::Remote(RestStore::from_config(&config.store.remote)?)),
        }
    }

    pub fn backend(&self) -> StoreBackend {
        match self {
            Self::Local(_) => StoreBackend::Local,
            Self::Remote(_) => StoreBackend::Remote,
        }
    }

    /// The local database, when that is the active backend.
    pub fn local(&self) -> Option<&SqliteStore> {
        match self {
            Self::Local(db) => Some(db),
            Self::Remote(_) => None,
        }
    }
}

impl SessionStore for ConfiguredStore {
    async fn load_config(&self) -> Result<Option<SessionConfig>, PersistenceError> {
        match self {
            Self::Local(s) => s.load_config().await,
            Self::Remote(s) => s.load_config().await,
        }
    }

    async fn save_config(&self, config: &SessionConfig) -> Result<(), PersistenceError> {
        match self {
            Self::Local(s) => s.save_config(config).await,
            Self::Remote(s) => s.save_config(config).await,
        }
    }

    async fn begin_session(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        match self {
            Self::Local(s) => s.begin_session(record).await,
            Self::Remote(s) => s.begin_session(record).await,
        }
    }

    async fn complete_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        match self {
            Self::Local(s) => s.complete_session(id, ended_at).await,
            Self::Remote(s) => s.complete_session(id, ended_at).await,
        }
    }

    async fn abort_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        match self {
            Self::Local(s) => s.abort_session(id, ended_at).await,
            Self::Remote(s) => s.abort_session(id, ended_at).await,
        }
    }

    async fn award_xp(&self, amount: i64, source: &str) -> Result<(), PersistenceError> {
        match self {
            Self::Local(s) => s.award_xp(amount, source).await,
            Self::Remote(s) => s.award_xp(amount, source).await,
        }
    }
}
