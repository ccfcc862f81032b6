use herald_core::HeraldError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The schedule request is invalid (e.g. scheduled too far in the past).
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Schedule not found: {id}")]
    NotFound { id: i64 },

    #[error(transparent)]
    Content(#[from] herald_content::ContentError),

    #[error(transparent)]
    Provider(#[from] herald_providers::ProviderError),

    /// An immediate publish returned a failure outcome.
    #[error("Publish failed: {0}")]
    PublishFailed(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

impl From<SchedulerError> for HeraldError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Database(e) => HeraldError::Database(e.to_string()),
            SchedulerError::InvalidSchedule(msg) => HeraldError::Validation(msg),
            SchedulerError::NotFound { id } => HeraldError::not_found("schedule", id),
            SchedulerError::Content(e) => e.into(),
            SchedulerError::Provider(e) => e.into(),
            SchedulerError::PublishFailed(msg) => HeraldError::PublishFailed(msg),
        }
    }
}
