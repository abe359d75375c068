/// Contracts the activation coordinator drives
///
/// The coordinator is constructed with one implementation of each; production wiring
/// uses `WorkflowStorage` and `TriggerScheduler`, tests use in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Why triggers are being registered for a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivationReason {
    /// The workflow's active flag was switched on
    Activate,
    /// The workflow changed without its active flag changing
    Update,
    /// Leader start-up, restoring workflows that were already active
    Init,
}

impl std::fmt::Display for ActivationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Activate => write!(f, "activate"),
            Self::Update => write!(f, "update"),
            Self::Init => write!(f, "init"),
        }
    }
}

/// Persisted activation state of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationUpdate {
    pub active: bool,
    pub version_id: String,
}

/// Durable owner of each workflow's `active` flag and `versionId`
#[async_trait]
pub trait ActivationStore: Send + Sync {
    async fn update(&self, workflow_id: &str, update: ActivationUpdate) -> Result<()>;
}

/// Owner of live triggers and pollers
///
/// `add` and `remove` must be idempotent: adding an already live workflow replaces
/// its triggers rather than registering them twice, removing a workflow that is not
/// live succeeds.
#[async_trait]
pub trait TriggerRegistry: Send + Sync {
    async fn add(&self, workflow_id: &str, reason: ActivationReason) -> Result<()>;

    async fn remove(&self, workflow_id: &str) -> Result<()>;

    async fn clear_activation_error(&self, workflow_id: &str);
}
