use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use herald_content::db::{read_opt_ts, read_ts};
use herald_core::time::{format_ts, now};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SchedulerError};
use crate::types::{AttemptOutcome, PublishLogEntry, Schedule, ScheduleStatus};

const SCHEDULE_COLUMNS: &str = "id, content_id, provider_target, status, scheduled_at,
     next_eligible_at, attempt_count, last_error, external_ref, created_at, updated_at";

/// Durable schedule state. Every transition is a single-row conditional
/// UPDATE, so two processes sharing the database file never both win.
pub struct ScheduleStore {
    db: Arc<Mutex<Connection>>,
}

impl ScheduleStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a new PENDING schedule with zero attempts.
    #[instrument(skip(self))]
    pub fn create(
        &self,
        content_id: i64,
        provider_target: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Schedule> {
        let now = format_ts(now());
        let id = {
            let db = self.conn();
            db.execute(
                "INSERT INTO schedules
                 (content_id, provider_target, status, scheduled_at, attempt_count,
                  created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, 0, ?4, ?4)",
                rusqlite::params![content_id, provider_target, format_ts(scheduled_at), now],
            )?;
            db.last_insert_rowid()
        };
        info!(schedule_id = id, content_id, provider = %provider_target, %scheduled_at, "schedule created");
        self.get(id)
    }

    /// PENDING rows that are due at `now`, oldest first, at most `limit`.
    pub fn list_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Schedule>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = format_ts(now);
        let db = self.conn();
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE status = 'pending'
               AND scheduled_at <= ?1
               AND (next_eligible_at IS NULL OR next_eligible_at <= ?1)
             ORDER BY scheduled_at, id
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(rusqlite::params![now, limit as i64], row_to_schedule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Atomically move PENDING → CLAIMED under `claim_token`.
    /// Returns `false` when the row was not PENDING.
    pub fn try_claim(&self, id: i64, claim_token: &str) -> Result<bool> {
        let now = format_ts(now());
        let changed = self.conn().execute(
            "UPDATE schedules
             SET status = 'claimed', claim_token = ?2, claimed_at = ?3, updated_at = ?3
             WHERE id = ?1 AND status = 'pending'",
            rusqlite::params![id, claim_token, now],
        )?;
        debug!(schedule_id = id, claimed = changed == 1, "claim attempted");
        Ok(changed == 1)
    }

    /// CLAIMED → PUBLISHING for the holder of `claim_token`, counting the
    /// attempt. Returns the updated row, or `None` if the claim was lost.
    pub fn begin_attempt(&self, id: i64, claim_token: &str) -> Result<Option<Schedule>> {
        let now = format_ts(now());
        let changed = self.conn().execute(
            "UPDATE schedules
             SET status = 'publishing', attempt_count = attempt_count + 1, updated_at = ?3
             WHERE id = ?1 AND status = 'claimed' AND claim_token = ?2",
            rusqlite::params![id, claim_token, now],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.get(id).map(Some)
    }

    /// Apply the result of an attempt. Only the PUBLISHING holder of
    /// `claim_token` may write; returns `false` otherwise.
    pub fn record_outcome(&self, id: i64, claim_token: &str, outcome: &AttemptOutcome) -> Result<bool> {
        let now = format_ts(now());
        let status = outcome.status().to_string();
        let (last_error, external_ref, next_eligible_at) = match outcome {
            AttemptOutcome::Published { external_ref } => (None, Some(external_ref.as_str()), None),
            AttemptOutcome::Retry {
                reason,
                next_eligible_at,
            } => (Some(reason.as_str()), None, Some(format_ts(*next_eligible_at))),
            AttemptOutcome::Failed { reason } => (Some(reason.as_str()), None, None),
        };

        let changed = self.conn().execute(
            "UPDATE schedules
             SET status = ?3,
                 last_error = ?4,
                 external_ref = COALESCE(?5, external_ref),
                 next_eligible_at = ?6,
                 claim_token = NULL,
                 claimed_at = NULL,
                 updated_at = ?7
             WHERE id = ?1 AND status = 'publishing' AND claim_token = ?2",
            rusqlite::params![id, claim_token, status, last_error, external_ref, next_eligible_at, now],
        )?;
        if changed == 0 {
            warn!(schedule_id = id, "outcome discarded: claim no longer held");
        }
        Ok(changed == 1)
    }

    /// Return CLAIMED/PUBLISHING rows whose claim predates `older_than` to
    /// PENDING. Interrupted attempts that already used the last allowed try
    /// become FAILED instead. Returns the number of rows touched.
    pub fn recover_stale_claims(&self, older_than: DateTime<Utc>, max_attempts: u32) -> Result<usize> {
        let now = format_ts(now());
        let changed = self.conn().execute(
            "UPDATE schedules
             SET status = CASE
                     WHEN status = 'publishing' AND attempt_count >= ?2 THEN 'failed'
                     ELSE 'pending'
                 END,
                 last_error = 'attempt interrupted',
                 claim_token = NULL,
                 claimed_at = NULL,
                 updated_at = ?3
             WHERE status IN ('claimed', 'publishing') AND claimed_at < ?1",
            rusqlite::params![format_ts(older_than), max_attempts, now],
        )?;
        if changed > 0 {
            warn!(count = changed, "stale claims recovered");
        }
        Ok(changed)
    }

    /// All schedules by ascending id.
    pub fn list(&self) -> Result<Vec<Schedule>> {
        let db = self.conn();
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], row_to_schedule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get(&self, id: i64) -> Result<Schedule> {
        self.conn()
            .query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
                [id],
                row_to_schedule,
            )
            .optional()?
            .ok_or(SchedulerError::NotFound { id })
    }
}

fn row_to_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schedule> {
    let status: String = row.get(3)?;
    let status = status.parse::<ScheduleStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Schedule {
        id: row.get(0)?,
        content_id: row.get(1)?,
        provider_target: row.get(2)?,
        status,
        scheduled_at: read_ts(row, 4)?,
        next_eligible_at: read_opt_ts(row, 5)?,
        attempt_count: row.get(6)?,
        last_error: row.get(7)?,
        external_ref: row.get(8)?,
        created_at: read_ts(row, 9)?,
        updated_at: read_ts(row, 10)?,
    })
}

/// Append-only record of provider invocations.
pub struct PublishLog {
    db: Arc<Mutex<Connection>>,
}

impl PublishLog {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(
        &self,
        content_id: i64,
        schedule_id: Option<i64>,
        provider: &str,
        outcome: &str,
        external_ref: Option<&str>,
        message: Option<&str>,
    ) -> Result<i64> {
        let db = self.conn();
        db.execute(
            "INSERT INTO publish_log
             (content_id, schedule_id, provider, outcome, external_ref, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                content_id,
                schedule_id,
                provider,
                outcome,
                external_ref,
                message,
                format_ts(now())
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Entries for one content item, oldest first.
    pub fn list_for_content(&self, content_id: i64) -> Result<Vec<PublishLogEntry>> {
        let db = self.conn();
        let mut stmt = db.prepare_cached(
            "SELECT id, content_id, schedule_id, provider, outcome, external_ref, message, created_at
             FROM publish_log WHERE content_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([content_id], |row| {
                Ok(PublishLogEntry {
                    id: row.get(0)?,
                    content_id: row.get(1)?,
                    schedule_id: row.get(2)?,
                    provider: row.get(3)?,
                    outcome: row.get(4)?,
                    external_ref: row.get(5)?,
                    message: row.get(6)?,
                    created_at: read_ts(row, 7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
