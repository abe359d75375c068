/// HTTP API Layer
///
/// This module provides the REST surface of a main instance. It handles:
/// - Workflow CRUD and activation toggles (the publishing side of `workflow-updated`)
/// - Inbound cluster commands from peer instances and orchestration status
/// - Server-sent push events for connected frontends
/// - Webhook triggers of live workflows

use crate::{
    orchestration::{ActivationCoordinator, LocalClusterChannel, PushHub, WorkflowLanes},
    runtime::TriggerScheduler,
    workflow::WorkflowStorage,
};
use std::sync::Arc;

// Workflow management endpoints (POST/GET/PUT/DELETE, activate/deactivate)
pub mod workflows;

// Cluster command delivery and status
pub mod orchestration;

// Frontend push stream
pub mod push;

// Webhook trigger endpoints
pub mod webhooks;

// Re-export router builders
pub use orchestration::create_orchestration_routes;
pub use push::create_push_routes;
pub use webhooks::create_webhook_routes;
pub use workflows::create_workflow_routes;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Workflow storage for persistence
    pub storage: WorkflowStorage,
    /// Scheduler owning live triggers on this instance
    pub scheduler: Arc<TriggerScheduler>,
    /// Cluster bus shared by all main instances
    pub cluster: Arc<LocalClusterChannel>,
    /// Leader-side activation coordinator
    pub coordinator: Arc<ActivationCoordinator>,
    /// Per-workflow ordering in front of the coordinator
    pub lanes: Arc<WorkflowLanes>,
    /// Frontend push hub
    pub push: PushHub,
}
