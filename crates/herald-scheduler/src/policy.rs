use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_core::config::SchedulerConfig;
use herald_providers::PublishResult;

use crate::types::AttemptOutcome;

/// Exponential backoff with jitter and a bounded number of attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    /// Ratio in `[0, 1)`; 0.2 spreads each delay over ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
            jitter: config.backoff_jitter,
        }
    }

    /// Delay before the retry that follows attempt number `attempt` (1-based).
    ///
    /// `min(base * 2^(attempt-1), max)`, jittered, capped again at `max` and
    /// never below one millisecond.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let exp = attempt.saturating_sub(1).min(32);
        let capped = base_ms.saturating_mul(1u64 << exp).min(max_ms);

        let factor = if self.jitter > 0.0 {
            1.0 - self.jitter + rand::random::<f64>() * 2.0 * self.jitter
        } else {
            1.0
        };
        let jittered = ((capped as f64) * factor) as u64;
        Duration::from_millis(jittered.clamp(1, max_ms.max(1)))
    }

    /// Map a provider result for attempt `attempt` to the state it leads to.
    ///
    /// `previous` is the next-eligible time set by the prior retry, if any.
    /// A new retry time is always strictly later than it, so jitter at the
    /// cap never moves a retry earlier.
    pub fn decide(
        &self,
        attempt: u32,
        result: &PublishResult,
        now: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> AttemptOutcome {
        match result {
            PublishResult::Success { external_ref, .. } => AttemptOutcome::Published {
                external_ref: external_ref.clone(),
            },
            PublishResult::PermanentFailure { reason } => AttemptOutcome::Failed {
                reason: non_empty(reason, "permanent failure"),
            },
            PublishResult::TransientFailure { reason } if attempt >= self.max_attempts => {
                AttemptOutcome::Failed {
                    reason: format!(
                        "{} (gave up after {attempt} attempts)",
                        non_empty(reason, "transient failure")
                    ),
                }
            }
            PublishResult::TransientFailure { reason } => {
                let delay = chrono::Duration::from_std(self.delay_for_attempt(attempt))
                    .unwrap_or_else(|_| chrono::Duration::milliseconds(1));
                let mut next_eligible_at = now + delay;
                if let Some(previous) = previous {
                    next_eligible_at =
                        next_eligible_at.max(previous + chrono::Duration::milliseconds(1));
                }
                AttemptOutcome::Retry {
                    reason: non_empty(reason, "transient failure"),
                    next_eligible_at,
                }
            }
        }
    }
}

fn non_empty(reason: &str, fallback: &str) -> String {
    if reason.trim().is_empty() {
        fallback.to_string()
    } else {
        reason.to_string()
    }
}
