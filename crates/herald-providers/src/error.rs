use herald_core::HeraldError;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("unknown provider: {name}")]
    UnknownProvider { name: String },

    #[error("provider configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

impl From<ProviderError> for HeraldError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UnknownProvider { name } => HeraldError::UnknownProvider { name },
            ProviderError::Config(msg) => HeraldError::Config(msg),
            ProviderError::Http(e) => HeraldError::Internal(e.to_string()),
        }
    }
}
