/// Webhook trigger endpoints
///
/// Requests to `/webhook/{workflow_id}/{path}` fire the matching webhook trigger of
/// a live workflow. Only the instance owning live triggers (the leader) answers 202.

use crate::{api::AppState, workflow::types::normalize_path};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::any,
    Router,
};
use serde_json::{json, Value};

pub fn create_webhook_routes() -> Router<AppState> {
    Router::new()
        // Format: /webhook/{workflow_id}/{webhook_path}
        .route("/webhook/{workflow_id}/{*path}", any(fire_webhook))
}

/// POST/GET/PUT/DELETE /webhook/{workflow_id}/{webhook_path}
/// Body: optional JSON payload handed to the execution side
async fn fire_webhook(
    State(state): State<AppState>,
    Path((workflow_id, webhook_path)): Path<(String, String)>,
    body: String,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    tracing::info!("📥 Webhook request received: {}/{}", workflow_id, webhook_path);

    let payload: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!("❌ Invalid JSON payload for webhook: {}/{} - Error: {}", workflow_id, webhook_path, e);
            StatusCode::BAD_REQUEST
        })?
    };

    let path = normalize_path(&webhook_path);
    if !state.scheduler.fire_webhook(&workflow_id, &path, payload) {
        tracing::warn!("❌ No live webhook for {}{}", workflow_id, path);
        return Err(StatusCode::NOT_FOUND);
    }

    Ok((StatusCode::ACCEPTED, Json(json!({ "workflowId": workflow_id, "path": path, "accepted": true }))))
}
