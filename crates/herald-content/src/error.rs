use herald_core::HeraldError;
use thiserror::Error;

/// Errors raised by the content and attachment stores.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Required input was missing or blank.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("content not found: {id}")]
    NotFound { id: i64 },

    #[error("attachment not found: {id}")]
    AttachmentNotFound { id: i64 },

    /// Attachments can no longer be added once publishing has started.
    #[error("content {id} is locked after its first publish attempt")]
    Locked { id: i64 },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContentError>;

impl From<ContentError> for HeraldError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::Validation(msg) => HeraldError::Validation(msg),
            ContentError::NotFound { id } => HeraldError::not_found("content", id),
            ContentError::AttachmentNotFound { id } => HeraldError::not_found("attachment", id),
            ContentError::Locked { id } => HeraldError::Validation(format!(
                "content {id} is locked after its first publish attempt"
            )),
            ContentError::Database(e) => HeraldError::Database(e.to_string()),
            ContentError::Io(e) => HeraldError::Io(e),
        }
    }
}
