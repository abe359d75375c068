/// Workflow management REST API endpoints
///
/// Provides CRUD operations for workflow definitions and activation toggles.
/// Any main instance may serve these: changes are persisted here and then
/// broadcast as `workflow-updated`, so the leader can converge its live triggers.

use crate::{
    api::AppState,
    orchestration::{
        message::{ActivationChangeMessage, WORKFLOW_UPDATED},
        ActivationStore, ActivationUpdate, ClusterChannel,
    },
    workflow::types::Workflow,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Response for workflow write operations
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResponse {
    pub id: String,
    pub active: bool,
    pub version_id: String,
    pub message: String,
}

/// Request body for workflow creation and update
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub workflow: Workflow,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow).get(list_workflows))
        .route("/api/workflows/{id}", get(get_workflow).put(update_workflow).delete(delete_workflow))
        .route("/api/workflows/{id}/activate", post(activate_workflow))
        .route("/api/workflows/{id}/deactivate", post(deactivate_workflow))
        .route("/api/workflows/{id}/activation", get(get_activation))
}

/// Create a new, inactive workflow
///
/// POST /api/workflows
/// Body: { "workflow": { "id": "...", "name": "...", "nodes": [...], "edges": [...] } }
async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, StatusCode> {
    let mut workflow = payload.workflow;

    if workflow.id.is_empty() || workflow.name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state.storage.get_workflow(&workflow.id).await {
        Ok(Some(_)) => return Err(StatusCode::CONFLICT),
        Ok(None) => {}
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    }

    // Activation goes through the activate endpoint so the leader hears about it
    workflow.active = false;
    workflow.version_id = new_version_id();

    if let Err(e) = state.storage.save_workflow(&workflow).await {
        tracing::error!("Failed to save workflow: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    tracing::info!("📝 Created workflow: {} ({})", workflow.id, workflow.name);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        active: workflow.active,
        version_id: workflow.version_id.clone(),
        message: format!("Workflow '{}' created successfully", workflow.name),
    }))
}

/// List all workflows
///
/// GET /api/workflows
async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    match state.storage.list_workflows().await {
        Ok(workflows) => Ok(Json(json!({ "workflows": workflows }))),
        Err(e) => {
            tracing::error!("Failed to list workflows: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Get a specific workflow by ID
///
/// GET /api/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, StatusCode> {
    Ok(Json(load(&state, &id).await?))
}

/// Update an existing workflow's definition
///
/// PUT /api/workflows/{id}
/// The active flag is kept; a new version is stored and broadcast so the leader
/// re-registers triggers with the new parameters.
async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, StatusCode> {
    let mut workflow = payload.workflow;
    workflow.id = id.clone();

    if workflow.name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let existing = load(&state, &id).await?;
    workflow.active = existing.active;
    workflow.version_id = new_version_id();

    if let Err(e) = state.storage.save_workflow(&workflow).await {
        tracing::error!("Failed to update workflow: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    publish_change(&state, ActivationChangeMessage {
        workflow_id: id.clone(),
        old_state: existing.active,
        new_state: workflow.active,
        version_id: workflow.version_id.clone(),
    })
    .await?;

    tracing::info!("🔥 Updated workflow: {} ({}) version {}", workflow.id, workflow.name, workflow.version_id);

    Ok(Json(WorkflowResponse {
        id,
        active: workflow.active,
        version_id: workflow.version_id.clone(),
        message: format!("Workflow '{}' updated successfully", workflow.name),
    }))
}

/// Delete a workflow
///
/// DELETE /api/workflows/{id}
/// Deleting an active workflow broadcasts its deactivation.
async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let existing = load(&state, &id).await?;

    match state.storage.delete_workflow(&id).await {
        Ok(true) => {}
        Ok(false) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to delete workflow: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    if existing.active {
        publish_change(&state, ActivationChangeMessage {
            workflow_id: id.clone(),
            old_state: true,
            new_state: false,
            version_id: existing.version_id,
        })
        .await?;
    }

    tracing::info!("🗑️ Deleted workflow: {}", id);
    Ok(Json(json!({ "message": "Workflow deleted successfully" })))
}

/// POST /api/workflows/{id}/activate
async fn activate_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<WorkflowResponse>), StatusCode> {
    change_activation(&state, &id, true).await
}

/// POST /api/workflows/{id}/deactivate
async fn deactivate_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<WorkflowResponse>), StatusCode> {
    change_activation(&state, &id, false).await
}

/// Activation state as stored and as seen by this instance's scheduler
///
/// GET /api/workflows/{id}/activation
async fn get_activation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let workflow = load(&state, &id).await?;
    let active = state.scheduler.active();

    Ok(Json(json!({
        "workflowId": workflow.id,
        "active": workflow.active,
        "versionId": workflow.version_id,
        "live": active.is_active(&id),
        "activationError": active.activation_error(&id),
    })))
}

/// Persist the new flag, then broadcast the change. The response is 202: the
/// leader converges asynchronously and may still revert the flag.
async fn change_activation(
    state: &AppState,
    id: &str,
    new_state: bool,
) -> Result<(StatusCode, Json<WorkflowResponse>), StatusCode> {
    let workflow = load(state, id).await?;

    if workflow.active == new_state {
        return Ok((StatusCode::OK, Json(WorkflowResponse {
            id: id.to_string(),
            active: new_state,
            version_id: workflow.version_id,
            message: format!("Workflow '{}' is already {}", workflow.name, describe(new_state)),
        })));
    }

    let update = ActivationUpdate { active: new_state, version_id: workflow.version_id.clone() };
    if let Err(e) = state.storage.update(id, update).await {
        tracing::error!("Failed to store activation of {}: {}", id, e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    publish_change(state, ActivationChangeMessage {
        workflow_id: id.to_string(),
        old_state: workflow.active,
        new_state,
        version_id: workflow.version_id.clone(),
    })
    .await?;

    tracing::info!("📤 Workflow {} marked {}", id, describe(new_state));

    Ok((StatusCode::ACCEPTED, Json(WorkflowResponse {
        id: id.to_string(),
        active: new_state,
        version_id: workflow.version_id,
        message: format!("Workflow '{}' {}", workflow.name, describe(new_state)),
    })))
}

async fn load(state: &AppState, id: &str) -> Result<Workflow, StatusCode> {
    match state.storage.get_workflow(id).await {
        Ok(Some(workflow)) => Ok(workflow),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get workflow {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn publish_change(state: &AppState, message: ActivationChangeMessage) -> Result<(), StatusCode> {
    let payload = serde_json::to_value(&message).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    state.cluster.publish(WORKFLOW_UPDATED, payload).await.map_err(|e| {
        tracing::error!("Failed to publish update of {}: {}", message.workflow_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn new_version_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn describe(active: bool) -> &'static str {
    if active { "activated" } else { "deactivated" }
}
