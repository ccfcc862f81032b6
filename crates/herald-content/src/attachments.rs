use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::read_ts;
use crate::error::{ContentError, Result};
use crate::types::Attachment;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Filesystem-backed attachment storage with metadata in SQLite.
///
/// Files are written under `dir` with a random name that keeps the original
/// extension; the original file name is kept in the metadata row.
pub struct AttachmentStore {
    db: Arc<Mutex<Connection>>,
    dir: PathBuf,
    max_bytes: u64,
}

impl AttachmentStore {
    pub fn new(db: Arc<Mutex<Connection>>, dir: impl AsRef<Path>, max_bytes: u64) -> Self {
        Self {
            db,
            dir: dir.as_ref().to_path_buf(),
            max_bytes,
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist an uploaded file and return its metadata.
    #[instrument(skip(self, bytes, description), fields(size = bytes.len()))]
    pub fn store(
        &self,
        filename: &str,
        content_type: Option<&str>,
        bytes: &[u8],
        description: Option<&str>,
    ) -> Result<Attachment> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(ContentError::Validation("file name is required".to_string()));
        }
        if bytes.is_empty() {
            return Err(ContentError::Validation("file is required".to_string()));
        }
        if bytes.len() as u64 > self.max_bytes {
            return Err(ContentError::Validation(format!(
                "file size exceeds maximum allowed size of {} bytes",
                self.max_bytes
            )));
        }

        std::fs::create_dir_all(&self.dir)?;
        let suffix = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let path = self.dir.join(format!("{}{}", Uuid::new_v4().simple(), suffix));
        std::fs::write(&path, bytes)?;

        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        let description = description.map(str::trim).filter(|d| !d.is_empty());
        let storage_path = path.to_string_lossy().into_owned();
        let now = herald_core::time::now();

        let db = self.conn();
        db.execute(
            "INSERT INTO attachments
             (filename, content_type, size, storage_path, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                filename,
                content_type,
                bytes.len() as i64,
                storage_path,
                description,
                herald_core::time::format_ts(now),
            ],
        )?;
        let id = db.last_insert_rowid();
        info!(attachment_id = id, %filename, "attachment stored");

        Ok(Attachment {
            id,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            storage_path,
            description: description.map(String::from),
            created_at: now,
        })
    }

    pub fn get(&self, id: i64) -> Result<Attachment> {
        self.conn()
            .query_row(
                "SELECT id, filename, content_type, size, storage_path, description, created_at
                 FROM attachments WHERE id = ?1",
                [id],
                row_to_attachment,
            )
            .optional()?
            .ok_or(ContentError::AttachmentNotFound { id })
    }

    /// Resolve a list of ids in order, skipping ids that no longer exist.
    pub fn get_many(&self, ids: &[i64]) -> Result<Vec<Attachment>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(*id) {
                Ok(a) => out.push(a),
                Err(ContentError::AttachmentNotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

fn row_to_attachment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        filename: row.get(1)?,
        content_type: row.get(2)?,
        size: row.get::<_, i64>(3)? as u64,
        storage_path: row.get(4)?,
        description: row.get(5)?,
        created_at: read_ts(row, 6)?,
    })
}
