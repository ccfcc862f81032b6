//! In-process providers that always succeed. Used for local development and
//! as the default target when no external platform is configured.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::provider::{Provider, PublishRequest, PublishResult};

/// Pretends to create a wiki page and returns a `CONF-xxxxxxxx` reference.
pub struct ConfluenceStubProvider;

#[async_trait]
impl Provider for ConfluenceStubProvider {
    fn name(&self) -> &str {
        "confluence-stub"
    }

    async fn publish(&self, req: &PublishRequest) -> PublishResult {
        let simple = Uuid::new_v4().simple().to_string();
        let page_id = format!("CONF-{}", &simple[..8]);
        info!(
            content_id = req.content.id,
            idempotency_key = %req.idempotency_key,
            title = %req.content.body.label(),
            attachments = req.attachments.len(),
            %page_id,
            "stub: page published"
        );
        PublishResult::success(page_id, "published")
    }
}

/// Pretends to post to a social network and returns a uuid reference.
pub struct SocialStubProvider;

#[async_trait]
impl Provider for SocialStubProvider {
    fn name(&self) -> &str {
        "social-stub"
    }

    async fn publish(&self, req: &PublishRequest) -> PublishResult {
        let post_id = Uuid::new_v4().to_string();
        info!(
            content_id = req.content.id,
            idempotency_key = %req.idempotency_key,
            media = req.attachments.len(),
            %post_id,
            "stub: post published"
        );
        PublishResult::success(post_id, "posted")
    }
}
