use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::http::error::{validation, ApiJson, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ImproveRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DescribeRequest {
    pub description: Option<String>,
}

/// POST /ai/improve
pub async fn improve(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ImproveRequest>,
) -> ApiResult<Json<Value>> {
    if req.content.trim().is_empty() {
        return Err(validation("content is required"));
    }
    let suggestions = state.improver.improve(&req.content).await;
    Ok(Json(json!({ "suggestions": suggestions })))
}

/// POST /ai/describe
pub async fn describe(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<DescribeRequest>,
) -> Json<Value> {
    let description = state.improver.describe(req.description.as_deref()).await;
    Json(json!({ "description": description }))
}
