use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use herald_scheduler::{Schedule, ScheduleStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::http::error::{api_error, validation, ApiJson, ApiResult};

/// How far in the past `scheduledAt` may lie, for clients that send "now".
const PAST_GRACE_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    pub content_id: i64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub provider_target: Option<String>,
}

/// Row projection used by the create and list endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSummary {
    pub id: i64,
    pub content_id: i64,
    pub provider_target: String,
    pub status: ScheduleStatus,
    pub scheduled_at: DateTime<Utc>,
    pub attempt_count: u32,
}

impl From<Schedule> for ScheduleSummary {
    fn from(s: Schedule) -> Self {
        Self {
            id: s.id,
            content_id: s.content_id,
            provider_target: s.provider_target,
            status: s.status,
            scheduled_at: s.scheduled_at,
            attempt_count: s.attempt_count,
        }
    }
}

/// POST /schedules
pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateScheduleRequest>,
) -> ApiResult<(StatusCode, Json<ScheduleSummary>)> {
    let now = herald_core::time::now();
    let scheduled_at = req.scheduled_at.unwrap_or(now);
    if scheduled_at < now - Duration::seconds(PAST_GRACE_SECS) {
        return Err(validation("scheduledAt must not be in the past"));
    }

    state.content.get(req.content_id).map_err(api_error)?;
    let (target, _) = state
        .providers
        .resolve_or_default(req.provider_target.as_deref())
        .map_err(api_error)?;

    let schedule = state
        .schedules
        .create(req.content_id, &target, scheduled_at)
        .map_err(api_error)?;
    info!(schedule_id = schedule.id, content_id = req.content_id, provider = %target, "schedule created via API");
    Ok((StatusCode::CREATED, Json(schedule.into())))
}

/// GET /schedules, ordered by id.
pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ScheduleSummary>>> {
    let schedules = state.schedules.list().map_err(api_error)?;
    Ok(Json(schedules.into_iter().map(ScheduleSummary::from).collect()))
}

/// GET /schedules/{id} with `lastError` and `nextEligibleAt`.
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Schedule>> {
    state.schedules.get(id).map(Json).map_err(api_error)
}
