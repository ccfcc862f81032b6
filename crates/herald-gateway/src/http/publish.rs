use std::sync::Arc;

use axum::{extract::State, Json};
use herald_scheduler::PublishNow;
use serde::Deserialize;

use crate::app::AppState;
use crate::http::error::{api_error, ApiJson, ApiResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub content_id: i64,
    pub provider_target: Option<String>,
}

/// POST /publish: publish right away without a schedule or retry.
///
/// A failure outcome from the platform maps to 502.
pub async fn publish_now(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<PublishRequest>,
) -> ApiResult<Json<PublishNow>> {
    let result = state
        .executor
        .publish_now(req.content_id, req.provider_target.as_deref())
        .await
        .map_err(api_error)?;
    Ok(Json(result))
}
