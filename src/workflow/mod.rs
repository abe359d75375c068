/// Workflow Management Layer
///
/// This module handles workflow definitions, persistence, and live trigger bookkeeping:
/// - Type definitions (Workflow, Node, Edge, TriggerPlan)
/// - SQLite persistence with sqlx, including the activation store
/// - Lock-free registry of live workflows using ArcSwap

// Core workflow type definitions
pub mod types;

// SQLite persistence layer for workflow storage
pub mod storage;

// Registry of workflows whose triggers are live on this instance
pub mod registry;

// Re-export commonly used types
pub use registry::{ActiveWorkflow, ActiveWorkflowRegistry};
pub use storage::WorkflowStorage;
pub use types::{Edge, Node, NodeType, TriggerPlan, Workflow};
