/// Cluster message model for workflow activation changes

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command broadcast when a workflow was saved, activated or deactivated
pub const WORKFLOW_UPDATED: &str = "workflow-updated";

/// Command broadcast by the leader when it could not bring a workflow live
pub const WORKFLOW_FAILED_TO_ACTIVATE: &str = "workflow-failed-to-activate";

/// Payload of a `workflow-updated` broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationChangeMessage {
    pub workflow_id: String,
    pub old_state: bool,
    pub new_state: bool,
    pub version_id: String,
}

/// Transition requested by an activation change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// false -> true
    Activate,
    /// true -> false
    Deactivate,
    /// Flag unchanged: re-register so new parameters take effect
    Refresh,
}

/// Result of applying one activation change on the leader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated,
    ActivationFailed(String),
    Deactivated,
    Refreshed,
}

/// Payload of a `workflow-failed-to-activate` broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationFailure {
    pub workflow_id: String,
    pub error_message: String,
}

impl ActivationChangeMessage {
    /// Validate a raw broadcast payload.
    ///
    /// All four fields must be present with exact JSON types (no coercion) and the
    /// workflow id must be non-empty. Anything else yields `None`.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let message = Self::deserialize(payload).ok()?;
        if message.workflow_id.is_empty() {
            return None;
        }
        Some(message)
    }

    pub fn transition(&self) -> Transition {
        match (self.old_state, self.new_state) {
            (false, true) => Transition::Activate,
            (true, false) => Transition::Deactivate,
            _ => Transition::Refresh,
        }
    }
}

impl ActivationFailure {
    /// Validate a raw `workflow-failed-to-activate` payload
    pub fn from_payload(payload: &Value) -> Option<Self> {
        Self::deserialize(payload).ok()
    }
}
