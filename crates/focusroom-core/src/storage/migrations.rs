//! Schema migrations for the local session store.
//!
//! Migrations are versioned and applied when the database is opened.
//! The `schema_version` table holds the current version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations.
///
/// # Errors
/// Returns an error if a migration statement fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 for a fresh database.
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// v1: settings, sessions and the XP ledger.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS pomodoro_settings (
            user_id                    TEXT PRIMARY KEY,
            work_duration              INTEGER NOT NULL,
            short_break_duration       INTEGER NOT NULL,
            long_break_duration        INTEGER NOT NULL,
            sessions_before_long_break INTEGER NOT NULL,
            auto_start_breaks          INTEGER NOT NULL DEFAULT 0,
            auto_start_pomodoros       INTEGER NOT NULL DEFAULT 0,
            updated_at                 TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pomodoro_sessions (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            task_id          TEXT,
            duration_minutes INTEGER NOT NULL,
            session_type     TEXT NOT NULL,
            completed        INTEGER NOT NULL DEFAULT 0,
            started_at       TEXT NOT NULL,
            ended_at         TEXT
        );

        CREATE TABLE IF NOT EXISTS xp_ledger (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            amount     INTEGER NOT NULL,
            source     TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON pomodoro_sessions(started_at);
        CREATE INDEX IF NOT EXISTS idx_sessions_type_started_at ON pomodoro_sessions(session_type, started_at);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// v2: optional notification sound label on settings.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch("ALTER TABLE pomodoro_settings ADD COLUMN notification_sound TEXT;")?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }
}
