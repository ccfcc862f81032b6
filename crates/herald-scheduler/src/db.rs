use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

/// How long a writer waits on a locked database file before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `schedules` and `publish_log` tables (idempotent) and an
/// index matching the due-list query.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schedules (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            content_id        INTEGER NOT NULL,
            provider_target   TEXT    NOT NULL,
            status            TEXT    NOT NULL DEFAULT 'pending',
            scheduled_at      TEXT    NOT NULL,
            next_eligible_at  TEXT,               -- set after a transient failure
            attempt_count     INTEGER NOT NULL DEFAULT 0,
            last_error        TEXT,
            claim_token       TEXT,               -- owner of a claimed/publishing row
            claimed_at        TEXT,
            external_ref      TEXT,
            created_at        TEXT    NOT NULL,
            updated_at        TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_schedules_due
            ON schedules (status, scheduled_at, id);

        CREATE TABLE IF NOT EXISTS publish_log (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            content_id    INTEGER NOT NULL,
            schedule_id   INTEGER,                -- NULL for immediate publishes
            provider      TEXT    NOT NULL,
            outcome       TEXT    NOT NULL,
            external_ref  TEXT,
            message       TEXT,
            created_at    TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_publish_log_content
            ON publish_log (content_id, id);
        ",
    )?;
    Ok(())
}
