/// Multi-main orchestration layer
///
/// This module reacts to cluster broadcasts about workflow activation. It handles:
/// - Validation of `workflow-updated` payloads
/// - Leader-only convergence of live triggers, persistence and frontend state
/// - Per-workflow ordering of changes delivered by the cluster bus

// Cluster message model and transitions
pub mod message;

// Contracts for persistence and the trigger registry
pub mod collaborators;

// Cluster bus and leadership view
pub mod cluster;

// Frontend push notifications
pub mod push;

// Leader-side state machine
pub mod coordinator;

// Per-workflow serialization of changes
pub mod lanes;

// Background consumer of cluster commands
pub mod listener;

pub use cluster::{ClusterChannel, ClusterMessage, LocalClusterChannel, CLUSTER_TOKEN_HEADER};
pub use collaborators::{ActivationReason, ActivationStore, ActivationUpdate, TriggerRegistry};
pub use coordinator::{ActivationCoordinator, CoordinatorError};
pub use lanes::WorkflowLanes;
pub use listener::ClusterListener;
pub use message::{ActivationChangeMessage, ActivationOutcome, Transition};
pub use push::{Notifier, PushEvent, PushHub};
