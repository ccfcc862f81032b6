use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};

use crate::db::{read_opt_ts, read_ts};
use crate::error::{ContentError, Result};
use crate::types::{Content, ContentBody, NewContent};

/// Thread-safe store for pages and posts.
///
/// Shares its connection with [`crate::AttachmentStore`] so attachment ids
/// can be checked in the same database.
pub struct ContentStore {
    db: Arc<Mutex<Connection>>,
    default_space: String,
}

impl ContentStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(db: Arc<Mutex<Connection>>, default_space: impl Into<String>) -> Self {
        Self {
            db,
            default_space: default_space.into(),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-query leaves the connection itself usable.
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate and persist new content, returning its id.
    ///
    /// Text fields are stored trimmed. Every referenced attachment must
    /// already exist.
    #[instrument(skip(self, new))]
    pub fn create(&self, new: NewContent) -> Result<i64> {
        let body = self.validate(&new)?;
        let now = herald_core::time::format_ts(herald_core::time::now());

        let mut db = self.conn();
        let tx = db.transaction()?;
        for attachment_id in &new.attachment_ids {
            if !attachment_exists(&tx, *attachment_id)? {
                return Err(ContentError::AttachmentNotFound { id: *attachment_id });
            }
        }

        match &body {
            ContentBody::Page {
                title,
                body,
                space_key,
                parent_page_id,
            } => tx.execute(
                "INSERT INTO content (kind, title, body, space_key, parent_page_id, created_at)
                 VALUES ('page', ?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![title, body, space_key, parent_page_id, now],
            )?,
            ContentBody::Post { text } => tx.execute(
                "INSERT INTO content (kind, text, created_at) VALUES ('post', ?1, ?2)",
                rusqlite::params![text, now],
            )?,
        };
        let id = tx.last_insert_rowid();

        for (position, attachment_id) in new.attachment_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO content_attachments (content_id, position, attachment_id)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![id, position as i64, attachment_id],
            )?;
        }
        tx.commit()?;

        info!(content_id = id, kind = body.kind(), "content created");
        Ok(id)
    }

    /// Load content by id with its ordered attachment ids.
    pub fn get(&self, id: i64) -> Result<Content> {
        let db = self.conn();
        let content = db
            .query_row(
                "SELECT id, kind, title, body, space_key, parent_page_id, text,
                        locked_at, created_at
                 FROM content WHERE id = ?1",
                [id],
                row_to_content,
            )
            .optional()?
            .ok_or(ContentError::NotFound { id })?;

        let attachment_ids = load_attachment_ids(&db, id)?;
        Ok(Content {
            attachment_ids,
            ..content
        })
    }

    /// Append an attachment to the content's ordered list.
    ///
    /// Fails once the content has been locked by a publish attempt.
    #[instrument(skip(self))]
    pub fn attach(&self, id: i64, attachment_id: i64) -> Result<Content> {
        {
            let mut db = self.conn();
            let tx = db.transaction()?;

            let locked: Option<Option<String>> = tx
                .query_row("SELECT locked_at FROM content WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            match locked {
                None => return Err(ContentError::NotFound { id }),
                Some(Some(_)) => return Err(ContentError::Locked { id }),
                Some(None) => {}
            }
            if !attachment_exists(&tx, attachment_id)? {
                return Err(ContentError::AttachmentNotFound { id: attachment_id });
            }

            tx.execute(
                "INSERT INTO content_attachments (content_id, position, attachment_id)
                 VALUES (?1,
                         (SELECT COALESCE(MAX(position) + 1, 0)
                          FROM content_attachments WHERE content_id = ?1),
                         ?2)",
                rusqlite::params![id, attachment_id],
            )?;
            tx.commit()?;
        }
        debug!(content_id = id, attachment_id, "attachment appended");
        self.get(id)
    }

    /// Mark the start of the first publish attempt. Idempotent: later calls
    /// keep the original timestamp.
    pub fn lock(&self, id: i64) -> Result<()> {
        let now = herald_core::time::format_ts(herald_core::time::now());
        let db = self.conn();
        db.execute(
            "UPDATE content SET locked_at = COALESCE(locked_at, ?1) WHERE id = ?2",
            rusqlite::params![now, id],
        )?;
        if db.changes() == 0 {
            return Err(ContentError::NotFound { id });
        }
        Ok(())
    }

    fn validate(&self, new: &NewContent) -> Result<ContentBody> {
        if let Some(title) = &new.title {
            let title = non_blank(title).ok_or_else(|| {
                ContentError::Validation("page title is required".to_string())
            })?;
            let body = new
                .body
                .as_deref()
                .and_then(non_blank)
                .ok_or_else(|| ContentError::Validation("page body is required".to_string()))?;
            let space_key = new
                .space_key
                .as_deref()
                .and_then(non_blank)
                .or_else(|| non_blank(&self.default_space))
                .ok_or_else(|| ContentError::Validation("space key is required".to_string()))?;
            return Ok(ContentBody::Page {
                title: title.to_string(),
                body: body.to_string(),
                space_key: space_key.to_string(),
                parent_page_id: new.parent_page_id,
            });
        }

        match &new.text {
            Some(text) => {
                let text = non_blank(text).ok_or_else(|| {
                    ContentError::Validation("post text is required".to_string())
                })?;
                Ok(ContentBody::Post {
                    text: text.to_string(),
                })
            }
            None => Err(ContentError::Validation(
                "either title (page) or text (post) is required".to_string(),
            )),
        }
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn attachment_exists(conn: &Connection, id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM attachments WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

fn load_attachment_ids(conn: &Connection, content_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT attachment_id FROM content_attachments
         WHERE content_id = ?1 ORDER BY position",
    )?;
    let ids = stmt
        .query_map([content_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

fn row_to_content(row: &rusqlite::Row<'_>) -> rusqlite::Result<Content> {
    let kind: String = row.get(1)?;
    let body = match kind.as_str() {
        "page" => ContentBody::Page {
            title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            body: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            space_key: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            parent_page_id: row.get(5)?,
        },
        _ => ContentBody::Post {
            text: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        },
    };
    Ok(Content {
        id: row.get(0)?,
        body,
        attachment_ids: Vec::new(),
        locked_at: read_opt_ts(row, 7)?,
        created_at: read_ts(row, 8)?,
    })
}
