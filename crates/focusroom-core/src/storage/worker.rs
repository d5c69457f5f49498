//! Fire-and-forget persistence.
//!
//! The engine's dispatcher pushes [`StoreRequest`]s through a
//! [`PersistenceHandle`] and never waits. A single [`PersistenceWorker`]
//! drains the queue in order, so a session's begin always reaches the
//! store before its completion. Failures are logged and dropped.

use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::store::{SessionRecord, SessionStore};
use crate::error::PersistenceError;
use crate::timer::SessionConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreRequest {
    Begin(SessionRecord),
    Complete { id: Uuid, ended_at: DateTime<Utc> },
    Abort { id: Uuid, ended_at: DateTime<Utc> },
    AwardXp { amount: i64, source: String },
    SaveConfig(SessionConfig),
}

impl StoreRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreRequest::Begin(_) => "begin_session",
            StoreRequest::Complete { .. } => "complete_session",
            StoreRequest::Abort { .. } => "abort_session",
            StoreRequest::AwardXp { .. } => "award_xp",
            StoreRequest::SaveConfig(_) => "save_config",
        }
    }
}

/// Sending side of the persistence queue.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<StoreRequest>,
}

impl PersistenceHandle {
    /// Queue a request without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::WorkerClosed`] if the worker has stopped.
    pub fn submit(&self, request: StoreRequest) -> Result<(), PersistenceError> {
        self.tx.send(request).map_err(|_| PersistenceError::WorkerClosed)
    }

    pub fn begin_session(&self, record: SessionRecord) -> Result<(), PersistenceError> {
        self.submit(StoreRequest::Begin(record))
    }

    pub fn complete_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        self.submit(StoreRequest::Complete { id, ended_at })
    }

    pub fn abort_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        self.submit(StoreRequest::Abort { id, ended_at })
    }

    pub fn award_xp(&self, amount: i64, source: impl Into<String>) -> Result<(), PersistenceError> {
        self.submit(StoreRequest::AwardXp {
            amount,
            source: source.into(),
        })
    }

    pub fn save_config(&self, config: SessionConfig) -> Result<(), PersistenceError> {
        self.submit(StoreRequest::SaveConfig(config))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub applied: usize,
    pub failed: usize,
}

pub struct PersistenceWorker<S> {
    store: S,
    rx: mpsc::UnboundedReceiver<StoreRequest>,
}

/// Create a queue feeding `store`.
pub fn persistence_channel<S: SessionStore>(store: S) -> (PersistenceHandle, PersistenceWorker<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PersistenceHandle { tx }, PersistenceWorker { store, rx })
}

impl<S: SessionStore> PersistenceWorker<S> {
    /// Apply requests until every handle is dropped.
    pub async fn run(mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        while let Some(request) = self.rx.recv().await {
            let kind = request.kind();
            match self.apply(request).await {
                Ok(()) => {
                    stats.applied += 1;
                    debug!(kind, "persisted");
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(kind, error = %e, "persistence request failed");
                }
            }
        }
        debug!(applied = stats.applied, failed = stats.failed, "persistence worker stopped");
        stats
    }

    async fn apply(&self, request: StoreRequest) -> Result<(), PersistenceError> {
        match request {
            StoreRequest::Begin(record) => self.store.begin_session(&record).await,
            StoreRequest::Complete { id, ended_at } => self.store.complete_session(id, ended_at).await,
            StoreRequest::Abort { id, ended_at } => self.store.abort_session(id, ended_at).await,
            StoreRequest::AwardXp { amount, source } => self.store.award_xp(amount, &source).await,
            StoreRequest::SaveConfig(config) => self.store.save_config(&config).await,
        }
    }
}

impl<S: SessionStore + Send + 'static> PersistenceWorker<S> {
    /// Drain the queue on its own thread and runtime. Store calls may
    /// block, so they stay off the thread that drives the timers.
    ///
    /// # Errors
    ///
    /// Fails if the thread cannot be spawned.
    pub fn spawn_thread(self) -> std::io::Result<JoinHandle<WorkerStats>> {
        thread::Builder::new()
            .name("focusroom-persist".into())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt.block_on(self.run()),
                    Err(e) => {
                        warn!(error = %e, "persistence runtime failed to start");
                        WorkerStats::default()
                    }
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::testing::RecordingStore;
    use crate::timer::Phase;
    use std::sync::Arc;

    #[tokio::test]
    async fn applies_requests_in_order() {
        let store = Arc::new(RecordingStore::default());
        let (handle, worker) = persistence_channel(Arc::clone(&store));
        let id = Uuid::new_v4();

        handle
            .begin_session(SessionRecord::begin(id, Phase::Work, 25, None, Utc::now()))
            .unwrap();
        handle.complete_session(id, Utc::now()).unwrap();
        handle.award_xp(50, "pomodoro_completed").unwrap();
        handle.abort_session(Uuid::new_v4(), Utc::now()).unwrap();
        drop(handle);

        let stats = worker.run().await;
        assert_eq!(stats, WorkerStats { applied: 4, failed: 0 });
        assert_eq!(
            store.calls(),
            vec!["begin:work:25", "complete", "xp:50:pomodoro_completed", "abort"]
        );
    }

    #[tokio::test]
    async fn failures_are_counted_and_skipped() {
        let store = Arc::new(RecordingStore::failing());
        let (handle, worker) = persistence_channel(Arc::clone(&store));
        handle.award_xp(50, "a").unwrap();
        handle.save_config(SessionConfig::default()).unwrap();
        drop(handle);

        let stats = worker.run().await;
        assert_eq!(stats, WorkerStats { applied: 0, failed: 2 });
        assert_eq!(store.calls().len(), 2);
    }

    #[test]
    fn worker_thread_drains_queue() {
        let store = Arc::new(RecordingStore::default());
        let (handle, worker) = persistence_channel(Arc::clone(&store));
        let thread = worker.spawn_thread().unwrap();
        let id = Uuid::new_v4();
        handle
            .begin_session(SessionRecord::begin(id, Phase::Work, 25, None, Utc::now()))
            .unwrap();
        handle.complete_session(id, Utc::now()).unwrap();
        drop(handle);

        let stats = thread.join().unwrap();
        assert_eq!(stats, WorkerStats { applied: 2, failed: 0 });
        assert_eq!(store.calls(), vec!["begin:work:25", "complete"]);
    }

    #[tokio::test]
    async fn slow_store_does_not_stall_caller_runtime() {
        let (handle, worker) = persistence_channel(SlowStore);
        let thread = worker.spawn_thread().unwrap();
        handle.award_xp(50, "pomodoro_completed").unwrap();

        // The caller's timers keep firing while the store call blocks.
        let started = std::time::Instant::now();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(started.elapsed() < std::time::Duration::from_millis(150));

        drop(handle);
        let stats = tokio::task::spawn_blocking(move || thread.join().unwrap())
            .await
            .unwrap();
        assert_eq!(stats.applied, 1);
    }

    /// Blocks the calling thread like a synchronous database write.
    struct SlowStore;

    impl SessionStore for SlowStore {
        async fn load_config(&self) -> Result<Option<SessionConfig>, PersistenceError> {
            Ok(None)
        }

        async fn save_config(&self, _config: &SessionConfig) -> Result<(), PersistenceError> {
            Ok(())
        }

        async fn begin_session(&self, _record: &SessionRecord) -> Result<(), PersistenceError> {
            Ok(())
        }

        async fn complete_session(&self, _id: Uuid, _at: DateTime<Utc>) -> Result<(), PersistenceError> {
            Ok(())
        }

        async fn abort_session(&self, _id: Uuid, _at: DateTime<Utc>) -> Result<(), PersistenceError> {
            Ok(())
        }

        async fn award_xp(&self, _amount: i64, _source: &str) -> Result<(), PersistenceError> {
            std::thread::sleep(std::time::Duration::from_millis(300));
            Ok(())
        }
    }

    #[test]
    fn submit_after_worker_dropped_errors() {
        let (handle, worker) = persistence_channel(RecordingStore::default());
        drop(worker);
        assert!(matches!(
            handle.award_xp(1, "x"),
            Err(PersistenceError::WorkerClosed)
        ));
    }
}
