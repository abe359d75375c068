/// Cluster endpoints
///
/// Peers deliver published commands here; operators read the orchestration status.
/// When `MECHAWAY_CLUSTER_TOKEN` is set, deliveries must present it in the
/// `x-mechaway-cluster-token` header. Without it the endpoint must only be reachable
/// from the internal network.

use crate::{
    api::AppState,
    orchestration::{ClusterChannel, ClusterMessage, CLUSTER_TOKEN_HEADER},
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

pub fn create_orchestration_routes() -> Router<AppState> {
    Router::new()
        .route("/api/orchestration/messages", post(receive_message))
        .route("/api/orchestration/status", get(status))
}

/// Accept a command published by a peer instance
///
/// POST /api/orchestration/messages
/// Body: { "senderId": "main-2", "command": "workflow-updated", "payload": {...} }
async fn receive_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<ClusterMessage>,
) -> StatusCode {
    let token = headers.get(CLUSTER_TOKEN_HEADER).and_then(|value| value.to_str().ok());
    if !state.cluster.accepts(token) {
        tracing::warn!("❌ Rejected {} from {}: bad cluster token", message.command, message.sender_id);
        return StatusCode::UNAUTHORIZED;
    }
    state.cluster.deliver(message);
    StatusCode::ACCEPTED
}

/// GET /api/orchestration/status
async fn status(State(state): State<AppState>) -> Json<Value> {
    let gate = state.coordinator.gate();
    Json(json!({
        "instanceId": state.cluster.instance_id(),
        "leader": state.cluster.is_leader(),
        "gate": {
            "capacity": gate.capacity(),
            "available": gate.available(),
            "queued": gate.queued(),
        },
        "lanes": {
            "active": state.lanes.active_lanes(),
            "pending": state.lanes.pending(),
        },
        "liveWorkflows": state.scheduler.active().list_ids(),
        "pushSubscribers": state.push.subscriber_count(),
    }))
}
