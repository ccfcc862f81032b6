use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::app::AppState;
use crate::http::error::{api_error, validation, ApiResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: i64,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// POST /attachments: multipart form with a `file` part and an optional
/// `description` text part.
pub async fn upload_attachment(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(error = %e, "malformed multipart body");
        validation(format!("malformed multipart body: {e}"))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(String::from);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| validation(format!("failed to read file: {e}")))?;
                file = Some((filename, content_type, bytes.to_vec()));
            }
            "description" => {
                description = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| validation(format!("failed to read description: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) = file.ok_or_else(|| validation("file is required"))?;
    let attachment = state
        .attachments
        .store(&filename, content_type.as_deref(), &bytes, description.as_deref())
        .map_err(api_error)?;
    info!(attachment_id = attachment.id, size = attachment.size, "attachment uploaded");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id: attachment.id,
            filename: attachment.filename,
            description: attachment.description,
        }),
    ))
}
