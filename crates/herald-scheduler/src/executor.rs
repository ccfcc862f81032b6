//! Runs one publish attempt and moves the schedule to its next state.

use std::sync::Arc;
use std::time::Duration;

use herald_content::{AttachmentStore, ContentError, ContentStore};
use herald_providers::{ProviderRegistry, PublishRequest, PublishResult};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::policy::RetryPolicy;
use crate::store::{PublishLog, ScheduleStore};
use crate::types::{AttemptOutcome, Schedule};

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of an immediate publish.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishNow {
    pub provider: String,
    /// Platform-reported state, e.g. "published".
    pub status: String,
    pub external_ref: String,
}

pub struct PublishExecutor {
    schedules: Arc<ScheduleStore>,
    log: Arc<PublishLog>,
    content: Arc<ContentStore>,
    attachments: Arc<AttachmentStore>,
    providers: Arc<ProviderRegistry>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl PublishExecutor {
    pub fn new(
        schedules: Arc<ScheduleStore>,
        log: Arc<PublishLog>,
        content: Arc<ContentStore>,
        attachments: Arc<AttachmentStore>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            schedules,
            log,
            content,
            attachments,
            providers,
            policy: RetryPolicy::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn schedules(&self) -> &Arc<ScheduleStore> {
        &self.schedules
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drive a claimed schedule through one attempt.
    ///
    /// Returns the schedule as stored afterwards, or `None` if the claim
    /// was lost before the attempt started.
    #[instrument(skip(self, schedule, claim_token), fields(schedule_id = schedule.id, content_id = schedule.content_id))]
    pub async fn execute(&self, schedule: &Schedule, claim_token: &str) -> Result<Option<Schedule>> {
        let Some(running) = self.schedules.begin_attempt(schedule.id, claim_token)? else {
            warn!("claim lost before attempt started");
            return Ok(None);
        };
        let attempt = running.attempt_count;
        info!(provider = %running.provider_target, attempt, "publish attempt started");

        let idempotency_key = format!("schedule-{}", running.id);
        let result = self
            .attempt(running.content_id, &running.provider_target, idempotency_key)
            .await;
        self.append_log(running.content_id, Some(running.id), &running.provider_target, &result);

        let outcome = self.policy.decide(
            attempt,
            &result,
            herald_core::time::now(),
            running.next_eligible_at,
        );
        match &outcome {
            AttemptOutcome::Published { external_ref } => {
                info!(attempt, %external_ref, "schedule published")
            }
            AttemptOutcome::Retry {
                reason,
                next_eligible_at,
            } => warn!(attempt, %reason, %next_eligible_at, "transient failure; retry scheduled"),
            AttemptOutcome::Failed { reason } => error!(attempt, %reason, "schedule failed"),
        }

        if !self.schedules.record_outcome(running.id, claim_token, &outcome)? {
            return Ok(None);
        }
        self.schedules.get(running.id).map(Some)
    }

    /// Publish immediately without a schedule row and without retry.
    ///
    /// A failure outcome is returned as [`SchedulerError::PublishFailed`].
    #[instrument(skip(self))]
    pub async fn publish_now(&self, content_id: i64, target: Option<&str>) -> Result<PublishNow> {
        let (provider, _) = self.providers.resolve_or_default(target)?;
        self.content.get(content_id)?;

        let idempotency_key = format!("publish-{}", Uuid::new_v4());
        let result = self.attempt(content_id, &provider, idempotency_key).await;
        self.append_log(content_id, None, &provider, &result);

        match result {
            PublishResult::Success {
                external_ref,
                platform_status,
            } => {
                info!(content_id, %provider, %external_ref, "published immediately");
                Ok(PublishNow {
                    provider,
                    status: platform_status,
                    external_ref,
                })
            }
            PublishResult::TransientFailure { reason } | PublishResult::PermanentFailure { reason } => {
                warn!(content_id, %provider, %reason, "immediate publish failed");
                Err(SchedulerError::PublishFailed(reason))
            }
        }
    }

    /// One provider invocation. Every failure, including missing content
    /// or an unregistered target, is folded into a [`PublishResult`].
    async fn attempt(&self, content_id: i64, target: &str, idempotency_key: String) -> PublishResult {
        let content = match self.content.get(content_id) {
            Ok(c) => c,
            Err(ContentError::NotFound { id }) => {
                return PublishResult::permanent(format!("content {id} no longer exists"))
            }
            Err(e) => return PublishResult::transient(e.to_string()),
        };
        let provider = match self.providers.resolve(target) {
            Ok(p) => p,
            Err(e) => return PublishResult::permanent(e.to_string()),
        };
        if let Err(e) = self.content.lock(content_id) {
            return PublishResult::transient(e.to_string());
        }
        let attachments = match self.attachments.get_many(&content.attachment_ids) {
            Ok(a) => a,
            Err(e) => return PublishResult::transient(e.to_string()),
        };

        let request = PublishRequest {
            content,
            attachments,
            idempotency_key,
        };
        match tokio::time::timeout(self.attempt_timeout, provider.publish(&request)).await {
            Ok(result) => result,
            Err(_) => PublishResult::transient("timeout"),
        }
    }

    fn append_log(&self, content_id: i64, schedule_id: Option<i64>, provider: &str, result: &PublishResult) {
        let external_ref = match result {
            PublishResult::Success { external_ref, .. } => Some(external_ref.as_str()),
            _ => None,
        };
        if let Err(e) = self.log.append(
            content_id,
            schedule_id,
            provider,
            result.kind(),
            external_ref,
            result.reason(),
        ) {
            error!(content_id, "failed to append publish log: {e}");
        }
    }
}
