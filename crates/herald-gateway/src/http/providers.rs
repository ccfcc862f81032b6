use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /providers: registered publish targets and the default one.
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "targets": state.providers.targets(),
        "default": state.providers.default_target(),
    }))
}
