use async_trait::async_trait;
use herald_content::{Attachment, Content};
use serde::Serialize;

/// Everything a provider needs to publish one piece of content.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub content: Content,
    /// Resolved attachments in display order.
    pub attachments: Vec<Attachment>,
    /// Stable key for the publish intent, the same across retries of one
    /// schedule. Providers log it; de-duplication itself comes from each
    /// platform's upsert semantics.
    pub idempotency_key: String,
}

/// Outcome of a single publish call.
///
/// Transient failures are retried by the scheduler; permanent ones are not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishResult {
    Success {
        /// Identifier of the item on the external platform.
        external_ref: String,
        /// Platform-reported state, e.g. "published" or "posted".
        platform_status: String,
    },
    TransientFailure { reason: String },
    PermanentFailure { reason: String },
}

impl PublishResult {
    pub fn success(external_ref: impl Into<String>, platform_status: impl Into<String>) -> Self {
        PublishResult::Success {
            external_ref: external_ref.into(),
            platform_status: platform_status.into(),
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        PublishResult::TransientFailure {
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        PublishResult::PermanentFailure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PublishResult::Success { .. })
    }

    /// Short label used in logs and the publish log table.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishResult::Success { .. } => "published",
            PublishResult::TransientFailure { .. } => "transient_failure",
            PublishResult::PermanentFailure { .. } => "permanent_failure",
        }
    }

    /// Failure reason, `None` on success.
    pub fn reason(&self) -> Option<&str> {
        match self {
            PublishResult::Success { .. } => None,
            PublishResult::TransientFailure { reason }
            | PublishResult::PermanentFailure { reason } => Some(reason),
        }
    }
}

/// Common interface for all publishing targets (wiki, social media, stubs).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for logging and the publish log.
    fn name(&self) -> &str;

    /// Publish the content. Implementations must not panic on platform
    /// errors; every failure is expressed through [`PublishResult`].
    async fn publish(&self, req: &PublishRequest) -> PublishResult;
}
