use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Initialise the content schema in `conn`.
///
/// `content_attachments` keeps the display order of each content's
/// attachments; the same attachment may appear more than once.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS attachments (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            filename      TEXT    NOT NULL,
            content_type  TEXT    NOT NULL,
            size          INTEGER NOT NULL,
            storage_path  TEXT    NOT NULL,
            description   TEXT,
            created_at    TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS content (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            kind            TEXT    NOT NULL,   -- 'page' | 'post'
            title           TEXT,
            body            TEXT,
            space_key       TEXT,
            parent_page_id  INTEGER,
            text            TEXT,
            locked_at       TEXT,               -- first publish attempt
            created_at      TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS content_attachments (
            content_id     INTEGER NOT NULL,
            position       INTEGER NOT NULL,
            attachment_id  INTEGER NOT NULL,
            PRIMARY KEY (content_id, position)
        ) STRICT;
        ",
    )?;
    Ok(())
}

/// Read a stored RFC 3339 timestamp column.
pub fn read_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    herald_core::time::parse_ts(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Nullable variant of [`read_ts`].
pub fn read_opt_ts(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        herald_core::time::parse_ts(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}
