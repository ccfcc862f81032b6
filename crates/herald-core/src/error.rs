use thiserror::Error;

/// Cross-crate error surfaced to API callers.
///
/// Subsystem crates keep their own error enums and convert into this one at
/// the boundary; the gateway turns it into an HTTP status plus `code()`.
#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Unknown provider: {name}")]
    UnknownProvider { name: String },

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HeraldError {
    /// Short error code string returned to clients in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            HeraldError::Config(_) => "CONFIG_ERROR",
            HeraldError::Validation(_) => "VALIDATION_ERROR",
            HeraldError::NotFound { .. } => "NOT_FOUND",
            HeraldError::UnknownProvider { .. } => "UNKNOWN_PROVIDER",
            HeraldError::PublishFailed(_) => "PUBLISH_FAILED",
            HeraldError::Database(_) => "DATABASE_ERROR",
            HeraldError::Serialization(_) => "SERIALIZATION_ERROR",
            HeraldError::Io(_) => "IO_ERROR",
            HeraldError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        HeraldError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HeraldError>;
