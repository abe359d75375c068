/// Mechaway orchestrator: multi-main workflow activation
///
/// Main instances share a cluster bus. Any main may change a workflow's active flag;
/// the leader owns the live triggers and converges on every `workflow-updated`
/// command, rolling back and telling the frontends when an activation fails.

// Core configuration and setup
pub mod config;

// Workflow definitions, SQLite storage and the registry of live workflows
pub mod workflow;

// Trigger scheduler and the activation admission gate
pub mod runtime;

// Cluster bus, activation coordinator and frontend push
pub mod orchestration;

// HTTP API layer - workflow management, cluster delivery, push stream and webhooks
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use orchestration::{ActivationCoordinator, ActivationOutcome, CoordinatorError, PushEvent};
pub use runtime::AdmissionGate;
pub use server::start_server;
pub use workflow::{Edge, Node, NodeType, Workflow};
