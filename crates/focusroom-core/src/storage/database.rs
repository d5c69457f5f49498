//! SQLite session store.
//!
//! Single-user local rendition of the hosted tables:
//! - `pomodoro_settings`: one row per user
//! - `pomodoro_sessions`: every started phase, completed or not
//! - `xp_ledger`: XP awards, summed for the running total

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::data_dir;
use super::migrations;
use super::store::{SessionRecord, SessionStore, LOCAL_USER_ID};
use crate::error::{DatabaseError, PersistenceError};
use crate::timer::{Phase, SessionConfig};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Stats {
    pub total_sessions: u64,
    pub completed_work_sessions: u64,
    pub abandoned_sessions: u64,
    pub total_focus_min: u64,
    pub total_break_min: u64,
    pub today_work_sessions: u64,
    pub today_focus_min: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct XpEntry {
    pub amount: i64,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

pub struct SqliteStore {
    conn: Connection,
    user_id: String,
}

impl SqliteStore {
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open `<data_dir>/focusroom.db`, creating and migrating it as needed.
    pub fn open_default() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Self::open(dir.join("focusroom.db"))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn,
            user_id: LOCAL_USER_ID.to_string(),
        })
    }

    // ── Settings ─────────────────────────────────────────────────────

    pub fn load_settings(&self) -> Result<Option<SessionConfig>, DatabaseError> {
        let row = self
            .conn
            .query_row(
                "SELECT work_duration, short_break_duration, long_break_duration,
                        sessions_before_long_break, auto_start_breaks, auto_start_pomodoros,
                        notification_sound
                 FROM pomodoro_settings WHERE user_id = ?1",
                params![self.user_id],
                |row| {
                    Ok(SessionConfig {
                        work_duration: row.get(0)?,
                        short_break_duration: row.get(1)?,
                        long_break_duration: row.get(2)?,
                        sessions_before_long_break: row.get(3)?,
                        auto_start_breaks: row.get(4)?,
                        auto_start_pomodoros: row.get(5)?,
                        notification_sound: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn save_settings(&self, config: &SessionConfig) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO pomodoro_settings (
                user_id, work_duration, short_break_duration, long_break_duration,
                sessions_before_long_break, auto_start_breaks, auto_start_pomodoros,
                notification_sound, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(user_id) DO UPDATE SET
                work_duration = excluded.work_duration,
                short_break_duration = excluded.short_break_duration,
                long_break_duration = excluded.long_break_duration,
                sessions_before_long_break = excluded.sessions_before_long_break,
                auto_start_breaks = excluded.auto_start_breaks,
                auto_start_pomodoros = excluded.auto_start_pomodoros,
                notification_sound = excluded.notification_sound,
                updated_at = excluded.updated_at",
            params![
                self.user_id,
                config.work_duration,
                config.short_break_duration,
                config.long_break_duration,
                config.sessions_before_long_break,
                config.auto_start_breaks,
                config.auto_start_pomodoros,
                config.notification_sound,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ── Sessions ─────────────────────────────────────────────────────

    pub fn insert_session(&self, record: &SessionRecord) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO pomodoro_sessions
                (id, user_id, task_id, duration_minutes, session_type, completed, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                record.user_id.as_deref().unwrap_or(&self.user_id),
                record.task_id,
                record.duration_minutes,
                record.session_type.as_str(),
                record.completed,
                record.started_at.to_rfc3339(),
                record.ended_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Close a session record. Returns whether a row matched.
    pub fn finish_session(
        &self,
        id: Uuid,
        completed: bool,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE pomodoro_sessions SET completed = ?2, ended_at = ?3 WHERE id = ?1",
            params![id.to_string(), completed, ended_at.to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    pub fn session(&self, id: Uuid) -> Result<Option<SessionRecord>, DatabaseError> {
        let record = self
            .conn
            .query_row(
                "SELECT id, user_id, task_id, duration_minutes, session_type, completed, started_at, ended_at
                 FROM pomodoro_sessions WHERE id = ?1",
                params![id.to_string()],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Most recent sessions first.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, task_id, duration_minutes, session_type, completed, started_at, ended_at
             FROM pomodoro_sessions ORDER BY started_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn stats_today(&self) -> Result<Stats, DatabaseError> {
        self.stats_since(Some(&today_start()))
    }

    pub fn stats_all(&self) -> Result<Stats, DatabaseError> {
        let mut stats = self.stats_since(None)?;
        let today = self.stats_since(Some(&today_start()))?;
        stats.today_work_sessions = today.today_work_sessions;
        stats.today_focus_min = today.today_focus_min;
        Ok(stats)
    }

    fn stats_since(&self, since: Option<&str>) -> Result<Stats, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT session_type, completed, COUNT(*), COALESCE(SUM(duration_minutes), 0)
             FROM pomodoro_sessions
             WHERE ?1 IS NULL OR started_at >= ?1
             GROUP BY session_type, completed",
        )?;

        let mut stats = Stats::default();
        let rows = stmt.query_map(params![since], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?;

        for row in rows {
            let (session_type, completed, count, minutes) = row?;
            stats.total_sessions += count;
            if !completed {
                stats.abandoned_sessions += count;
                continue;
            }
            match Phase::parse(&session_type) {
                Some(Phase::Work) => {
                    stats.completed_work_sessions += count;
                    stats.total_focus_min += minutes;
                    if since.is_some() {
                        stats.today_work_sessions += count;
                        stats.today_focus_min += minutes;
                    }
                }
                Some(Phase::ShortBreak | Phase::LongBreak) => {
                    stats.total_break_min += minutes;
                }
                None => {}
            }
        }
        Ok(stats)
    }

    // ── XP ───────────────────────────────────────────────────────────

    pub fn add_xp(&self, amount: i64, source: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO xp_ledger (amount, source, created_at) VALUES (?1, ?2, ?3)",
            params![amount, source, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn xp_total(&self) -> Result<i64, DatabaseError> {
        let total = self
            .conn
            .query_row("SELECT COALESCE(SUM(amount), 0) FROM xp_ledger", [], |row| {
                row.get::<_, i64>(0)
            })?;
        Ok(total)
    }

    /// Newest entries first.
    pub fn xp_log(&self, limit: usize) -> Result<Vec<XpEntry>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT amount, source, created_at FROM xp_ledger ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            let (amount, source, created_at) = row?;
            entries.push(XpEntry {
                amount,
                source,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(entries)
    }
}

impl SessionStore for SqliteStore {
    async fn load_config(&self) -> Result<Option<SessionConfig>, PersistenceError> {
        Ok(self.load_settings()?)
    }

    async fn save_config(&self, config: &SessionConfig) -> Result<(), PersistenceError> {
        Ok(self.save_settings(config)?)
    }

    async fn begin_session(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        Ok(self.insert_session(record)?)
    }

    async fn complete_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        if !self.finish_session(id, true, ended_at)? {
            tracing::warn!(%id, "complete: no session record matched");
        }
        Ok(())
    }

    async fn abort_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        if !self.finish_session(id, false, ended_at)? {
            tracing::warn!(%id, "abort: no session record matched");
        }
        Ok(())
    }

    async fn award_xp(&self, amount: i64, source: &str) -> Result<(), PersistenceError> {
        Ok(self.add_xp(amount, source)?)
    }
}

fn today_start() -> String {
    format!("{}T00:00:00+00:00", Utc::now().format("%Y-%m-%d"))
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::QueryFailed(format!("bad timestamp '{s}': {e}")))
}

fn conversion(idx: usize, e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let id: String = row.get(0)?;
    let session_type: String = row.get(4)?;
    let started_at: String = row.get(6)?;
    let ended_at: Option<String> = row.get(7)?;
    Ok(SessionRecord {
        id: Uuid::parse_str(&id).map_err(|e| conversion(0, e))?,
        user_id: row.get(1)?,
        task_id: row.get(2)?,
        duration_minutes: row.get(3)?,
        session_type: Phase::parse(&session_type)
            .ok_or_else(|| conversion(4, format!("unknown session type '{session_type}'")))?,
        completed: row.get(5)?,
        started_at: parse_ts(&started_at).map_err(|e| conversion(6, e))?,
        ended_at: ended_at
            .as_deref()
            .map(parse_ts)
            .transpose()
            .map_err(|e| conversion(7, e))?,
    })
}
