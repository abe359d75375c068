/// Leader-side reaction to workflow activation changes
///
/// In a multi-main setup any main may save or toggle a workflow, but only the leader
/// owns live triggers and pollers. Followers persist the change and broadcast a
/// `workflow-updated` command; the leader applies it here:
///
/// | old   | new   | transition | on success             | on failure                       |
/// |-------|-------|------------|------------------------|----------------------------------|
/// | false | true  | Activate   | push workflowActivated | revert flag, publish failure     |
/// | true  | false | Deactivate | push workflowDeactivated | reported to the operator       |
/// | same  | same  | Refresh    | nothing                | see [`ActivationCoordinator::refresh`] |
///
/// Registry work runs inside an admission gate slot keyed by workflow id. The slot is
/// released as soon as the registry returns, before any compensating write.

use crate::orchestration::{
    cluster::ClusterChannel,
    collaborators::{ActivationReason, ActivationStore, ActivationUpdate, TriggerRegistry},
    message::{
        ActivationChangeMessage, ActivationFailure, ActivationOutcome, Transition,
        WORKFLOW_FAILED_TO_ACTIVATE,
    },
    push::{Notifier, PushEvent},
};
use crate::runtime::gate::{AdmissionGate, AdmissionWithdrawn};
use serde_json::Value;
use std::{future::Future, sync::Arc};

/// Faults reported to the operator instead of being compensated
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("failed to remove triggers for workflow {workflow_id}: {source}")]
    Removal {
        workflow_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to re-add triggers for inactive workflow {workflow_id}: {source}")]
    Refresh {
        workflow_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to revert activation of workflow {workflow_id}: {source}")]
    Revert {
        workflow_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to publish activation failure for workflow {workflow_id}: {source}")]
    Publish {
        workflow_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Withdrawn(#[from] AdmissionWithdrawn),
}

/// Which half of a refresh failed
enum RefreshFailure {
    Removal(anyhow::Error),
    Add(anyhow::Error),
}

/// Drives the trigger registry, store, cluster and frontend to converge on an
/// activation change. Holds no state besides its admission gate.
pub struct ActivationCoordinator {
    store: Arc<dyn ActivationStore>,
    triggers: Arc<dyn TriggerRegistry>,
    cluster: Arc<dyn ClusterChannel>,
    notifier: Arc<dyn Notifier>,
    gate: AdmissionGate,
}

impl ActivationCoordinator {
    pub fn new(
        store: Arc<dyn ActivationStore>,
        triggers: Arc<dyn TriggerRegistry>,
        cluster: Arc<dyn ClusterChannel>,
        notifier: Arc<dyn Notifier>,
        gate: AdmissionGate,
    ) -> Self {
        Self { store, triggers, cluster, notifier, gate }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Entry point for raw `workflow-updated` payloads. Never fails: malformed
    /// payloads are dropped and faults are logged.
    pub async fn on_activation_change(&self, payload: &Value) {
        let Some(message) = ActivationChangeMessage::from_payload(payload) else {
            tracing::debug!("Discarding malformed workflow-updated payload: {}", payload);
            return;
        };
        self.apply(message).await;
    }

    /// Apply a validated message, logging the outcome
    pub async fn apply(&self, message: ActivationChangeMessage) {
        let workflow_id = message.workflow_id.clone();
        match self.handle(message).await {
            Ok(Some(ActivationOutcome::ActivationFailed(reason))) => {
                tracing::warn!("⚠️ Workflow {} failed to activate: {}", workflow_id, reason);
            }
            Ok(Some(outcome)) => {
                tracing::info!("✅ Workflow {} converged: {:?}", workflow_id, outcome);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("❌ Activation change for workflow {} failed: {}", workflow_id, e);
            }
        }
    }

    /// Apply a validated message. `Ok(None)` when this instance is not the leader.
    pub async fn handle(
        &self,
        message: ActivationChangeMessage,
    ) -> Result<Option<ActivationOutcome>, CoordinatorError> {
        if !self.cluster.is_leader() {
            tracing::debug!("Follower ignoring activation change for {}", message.workflow_id);
            return Ok(None);
        }

        let outcome = match message.transition() {
            Transition::Activate => self.activate(&message).await?,
            Transition::Deactivate => self.deactivate(&message).await?,
            Transition::Refresh => self.refresh(&message).await?,
        };

        Ok(Some(outcome))
    }

    async fn activate(&self, message: &ActivationChangeMessage) -> Result<ActivationOutcome, CoordinatorError> {
        let workflow_id = message.workflow_id.as_str();
        tracing::info!("🔥 Activating workflow {} ({})", workflow_id, message.version_id);

        self.triggers.clear_activation_error(workflow_id).await;

        let added = self
            .admitted(workflow_id, self.triggers.add(workflow_id, ActivationReason::Activate))
            .await?;

        match added {
            Ok(()) => {
                self.notifier.broadcast(PushEvent::WorkflowActivated { workflow_id: workflow_id.to_string() });
                Ok(ActivationOutcome::Activated)
            }
            Err(e) => self.fail_activation(message, e).await,
        }
    }

    async fn deactivate(&self, message: &ActivationChangeMessage) -> Result<ActivationOutcome, CoordinatorError> {
        let workflow_id = message.workflow_id.as_str();
        tracing::info!("🛑 Deactivating workflow {}", workflow_id);

        self.admitted(workflow_id, self.triggers.remove(workflow_id))
            .await?
            .map_err(|source| CoordinatorError::Removal { workflow_id: workflow_id.to_string(), source })?;

        self.notifier.broadcast(PushEvent::WorkflowDeactivated { workflow_id: workflow_id.to_string() });
        Ok(ActivationOutcome::Deactivated)
    }

    /// Remove then re-add triggers so changed parameters take effect.
    ///
    /// A failed removal is reported. A failed re-add of a workflow that should be
    /// live takes the activation failure path; for a workflow whose flag is off
    /// there is nothing to revert, so it is reported.
    async fn refresh(&self, message: &ActivationChangeMessage) -> Result<ActivationOutcome, CoordinatorError> {
        let workflow_id = message.workflow_id.as_str();
        tracing::info!("🔄 Refreshing triggers for workflow {}", workflow_id);

        let refreshed = self
            .admitted(workflow_id, async {
                self.triggers.remove(workflow_id).await.map_err(RefreshFailure::Removal)?;
                self.triggers
                    .add(workflow_id, ActivationReason::Update)
                    .await
                    .map_err(RefreshFailure::Add)
            })
            .await?;

        match refreshed {
            Ok(()) => Ok(ActivationOutcome::Refreshed),
            Err(RefreshFailure::Removal(source)) => {
                Err(CoordinatorError::Removal { workflow_id: workflow_id.to_string(), source })
            }
            Err(RefreshFailure::Add(source)) if message.new_state => self.fail_activation(message, source).await,
            Err(RefreshFailure::Add(source)) => {
                Err(CoordinatorError::Refresh { workflow_id: workflow_id.to_string(), source })
            }
        }
    }

    /// Compensate a failed activation: persist the flag as off with the message's
    /// version and tell the cluster. The frontend is informed through the cluster
    /// broadcast, not directly.
    async fn fail_activation(
        &self,
        message: &ActivationChangeMessage,
        error: anyhow::Error,
    ) -> Result<ActivationOutcome, CoordinatorError> {
        let workflow_id = message.workflow_id.as_str();
        let error_message = error.to_string();
        tracing::warn!("⚠️ Reverting activation of workflow {}: {}", workflow_id, error_message);

        let reverted = self
            .store
            .update(workflow_id, ActivationUpdate { active: false, version_id: message.version_id.clone() })
            .await;

        let failure = ActivationFailure {
            workflow_id: workflow_id.to_string(),
            error_message: error_message.clone(),
        };
        let published = match serde_json::to_value(&failure) {
            Ok(payload) => self.cluster.publish(WORKFLOW_FAILED_TO_ACTIVATE, payload).await,
            Err(e) => Err(e.into()),
        };

        reverted.map_err(|source| CoordinatorError::Revert { workflow_id: workflow_id.to_string(), source })?;
        published.map_err(|source| CoordinatorError::Publish { workflow_id: workflow_id.to_string(), source })?;

        Ok(ActivationOutcome::ActivationFailed(error_message))
    }

    /// Run `operation` while holding a gate slot for `workflow_id`
    async fn admitted<T>(
        &self,
        workflow_id: &str,
        operation: impl Future<Output = T>,
    ) -> Result<T, AdmissionWithdrawn> {
        let _permit = self.gate.admit(workflow_id).await?;
        Ok(operation.await)
    }
}
