//! Content endpoints: create pages/posts, read them back, extend their
//! attachment list and show their publish history.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use herald_content::{Attachment, Content, NewContent};
use herald_scheduler::PublishLogEntry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::app::AppState;
use crate::http::error::{api_error, ApiJson, ApiResult};

/// Content plus resolved attachment metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentView {
    #[serde(flatten)]
    pub content: Content,
    pub attachments: Vec<AttachmentSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSummary {
    pub id: i64,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<Attachment> for AttachmentSummary {
    fn from(a: Attachment) -> Self {
        Self {
            id: a.id,
            filename: a.filename,
            content_type: a.content_type,
            size: a.size,
            description: a.description,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    pub attachment_id: i64,
}

/// POST /content
pub async fn create_content(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<NewContent>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let id = state.content.create(req).map_err(api_error)?;
    info!(content_id = id, "content created via API");
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// GET /content/{id}
pub async fn get_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ContentView>> {
    let content = state.content.get(id).map_err(api_error)?;
    view(&state, content).map(Json)
}

/// POST /content/{id}/attachments
pub async fn attach_to_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<AttachRequest>,
) -> ApiResult<Json<ContentView>> {
    let content = state
        .content
        .attach(id, req.attachment_id)
        .map_err(api_error)?;
    view(&state, content).map(Json)
}

/// GET /content/{id}/publications
pub async fn list_publications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<PublishLogEntry>>> {
    state.content.get(id).map_err(api_error)?;
    let entries = state.publish_log.list_for_content(id).map_err(api_error)?;
    Ok(Json(entries))
}

fn view(state: &AppState, content: Content) -> ApiResult<ContentView> {
    let attachments = state
        .attachments
        .get_many(&content.attachment_ids)
        .map_err(api_error)?
        .into_iter()
        .map(AttachmentSummary::from)
        .collect();
    Ok(ContentView {
        content,
        attachments,
    })
}
