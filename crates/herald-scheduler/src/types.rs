use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a scheduled publish.
///
/// `Pending → Claimed → Publishing → {Published | Pending | Failed}`.
/// Stored lower-case; serialized upper-case on the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    /// Waiting for `scheduled_at` (and `next_eligible_at`, after a retry).
    Pending,
    /// Owned by a worker, attempt not started yet.
    Claimed,
    /// Provider call in flight.
    Publishing,
    Published,
    Failed,
}

impl ScheduleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScheduleStatus::Published | ScheduleStatus::Failed)
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Claimed => "claimed",
            ScheduleStatus::Publishing => "publishing",
            ScheduleStatus::Published => "published",
            ScheduleStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "claimed" => Ok(ScheduleStatus::Claimed),
            "publishing" => Ok(ScheduleStatus::Publishing),
            "published" => Ok(ScheduleStatus::Published),
            "failed" => Ok(ScheduleStatus::Failed),
            other => Err(format!("unknown schedule status: {other}")),
        }
    }
}

/// A persisted publish intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: i64,
    pub content_id: i64,
    /// Registry name of the target platform.
    pub provider_target: String,
    pub status: ScheduleStatus,
    pub scheduled_at: DateTime<Utc>,
    /// Earliest time a retry may run. `None` before the first failure.
    pub next_eligible_at: Option<DateTime<Utc>>,
    /// Number of attempts started. Never decreases.
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal result of one attempt, as written by `record_outcome`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Published {
        external_ref: String,
    },
    /// Transient failure with attempts left.
    Retry {
        reason: String,
        next_eligible_at: DateTime<Utc>,
    },
    Failed {
        reason: String,
    },
}

impl AttemptOutcome {
    pub fn status(&self) -> ScheduleStatus {
        match self {
            AttemptOutcome::Published { .. } => ScheduleStatus::Published,
            AttemptOutcome::Retry { .. } => ScheduleStatus::Pending,
            AttemptOutcome::Failed { .. } => ScheduleStatus::Failed,
        }
    }
}

/// One provider invocation, scheduled or immediate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishLogEntry {
    pub id: i64,
    pub content_id: i64,
    pub schedule_id: Option<i64>,
    pub provider: String,
    /// `published`, `transient_failure` or `permanent_failure`.
    pub outcome: String,
    pub external_ref: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}
