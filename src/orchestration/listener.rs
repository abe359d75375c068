/// Background consumer of cluster commands
///
/// Routes `workflow-updated` to the per-workflow lanes and turns
/// `workflow-failed-to-activate` into a frontend push on every main instance.

use crate::orchestration::{
    cluster::ClusterMessage,
    lanes::WorkflowLanes,
    message::{ActivationChangeMessage, ActivationFailure, WORKFLOW_FAILED_TO_ACTIVATE, WORKFLOW_UPDATED},
    push::{Notifier, PushEvent},
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

pub struct ClusterListener {
    lanes: Arc<WorkflowLanes>,
    notifier: Arc<dyn Notifier>,
}

impl ClusterListener {
    pub fn new(lanes: Arc<WorkflowLanes>, notifier: Arc<dyn Notifier>) -> Self {
        Self { lanes, notifier }
    }

    /// Consume commands until the channel closes
    pub async fn run(self, mut rx: broadcast::Receiver<ClusterMessage>) {
        tracing::info!("👂 Cluster listener started");
        loop {
            match rx.recv().await {
                Ok(message) => self.route(message),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::error!(
                        "❌ Cluster listener lagged, {} commands lost: workflows they touched may no longer match the store until changed again",
                        skipped
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::info!("Cluster listener stopped");
    }

    /// Route a single command
    pub fn route(&self, message: ClusterMessage) {
        match message.command.as_str() {
            WORKFLOW_UPDATED => match ActivationChangeMessage::from_payload(&message.payload) {
                Some(change) => self.lanes.dispatch(change),
                None => tracing::debug!("Discarding malformed {} from {}", WORKFLOW_UPDATED, message.sender_id),
            },
            WORKFLOW_FAILED_TO_ACTIVATE => match ActivationFailure::from_payload(&message.payload) {
                Some(failure) => {
                    tracing::warn!("⚠️ Workflow {} failed to activate on leader: {}", failure.workflow_id, failure.error_message);
                    self.notifier.broadcast(PushEvent::WorkflowFailedToActivate {
                        workflow_id: failure.workflow_id,
                        error_message: failure.error_message,
                    });
                }
                None => tracing::debug!("Discarding malformed {} from {}", WORKFLOW_FAILED_TO_ACTIVATE, message.sender_id),
            },
            other => tracing::debug!("Ignoring unknown cluster command: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::{
        cluster::ClusterChannel,
        collaborators::{ActivationReason, ActivationStore, ActivationUpdate, TriggerRegistry},
        coordinator::ActivationCoordinator,
    };
    use crate::runtime::gate::AdmissionGate;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct Recorder {
        adds: Mutex<Vec<String>>,
        events: Mutex<Vec<PushEvent>>,
    }

    #[async_trait]
    impl TriggerRegistry for Recorder {
        async fn add(&self, workflow_id: &str, _reason: ActivationReason) -> anyhow::Result<()> {
            self.adds.lock().push(workflow_id.to_string());
            Ok(())
        }

        async fn remove(&self, _workflow_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn clear_activation_error(&self, _workflow_id: &str) {}
    }

    #[async_trait]
    impl ActivationStore for Recorder {
        async fn update(&self, _workflow_id: &str, _update: ActivationUpdate) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ClusterChannel for Recorder {
        fn is_leader(&self) -> bool {
            true
        }

        async fn publish(&self, _command: &str, _payload: Value) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl Notifier for Recorder {
        fn broadcast(&self, event: PushEvent) {
            self.events.lock().push(event);
        }
    }

    fn listener() -> (Arc<Recorder>, Arc<WorkflowLanes>, ClusterListener) {
        let recorder = Arc::new(Recorder::default());
        let coordinator = ActivationCoordinator::new(
            recorder.clone(),
            recorder.clone(),
            recorder.clone(),
            recorder.clone(),
            AdmissionGate::new(1),
        );
        let lanes = Arc::new(WorkflowLanes::new(Arc::new(coordinator)));
        let listener = ClusterListener::new(lanes.clone(), recorder.clone());
        (recorder, lanes, listener)
    }

    fn command(command: &str, payload: Value) -> ClusterMessage {
        ClusterMessage { sender_id: "main-2".to_string(), command: command.to_string(), payload }
    }

    #[tokio::test]
    async fn test_failure_broadcast_is_pushed_to_frontend() {
        let (recorder, _lanes, listener) = listener();

        listener.route(command(
            WORKFLOW_FAILED_TO_ACTIVATE,
            json!({ "workflowId": "w1", "errorMessage": "connection refused" }),
        ));

        assert_eq!(
            *recorder.events.lock(),
            vec![PushEvent::WorkflowFailedToActivate {
                workflow_id: "w1".to_string(),
                error_message: "connection refused".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_workflow_updated_is_dispatched_to_lanes() {
        let (recorder, lanes, listener) = listener();

        listener.route(command(
            WORKFLOW_UPDATED,
            json!({ "workflowId": "w1", "oldState": false, "newState": true, "versionId": "v1" }),
        ));
        assert_eq!(lanes.active_lanes(), 1);

        for _ in 0..100 {
            if lanes.is_idle() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*recorder.adds.lock(), vec!["w1".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_commands_are_dropped() {
        let (recorder, lanes, listener) = listener();

        listener.route(command(WORKFLOW_UPDATED, json!({ "workflowId": "w1" })));
        listener.route(command(WORKFLOW_FAILED_TO_ACTIVATE, json!({ "workflowId": "w1" })));
        listener.route(command("reload-external-secrets", json!({})));

        assert!(lanes.is_idle());
        assert!(recorder.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_lagging_listener_keeps_routing_newer_commands() {
        let (recorder, _lanes, listener) = listener();
        let (tx, rx) = broadcast::channel(2);

        for workflow_id in ["w1", "w2", "w3", "w4"] {
            tx.send(command(
                WORKFLOW_FAILED_TO_ACTIVATE,
                json!({ "workflowId": workflow_id, "errorMessage": "boom" }),
            ))
            .unwrap();
        }
        drop(tx);

        listener.run(rx).await;

        let pushed: Vec<String> = recorder
            .events
            .lock()
            .iter()
            .map(|event| match event {
                PushEvent::WorkflowFailedToActivate { workflow_id, .. } => workflow_id.clone(),
                other => panic!("unexpected push event: {:?}", other),
            })
            .collect();
        assert_eq!(pushed, vec!["w3".to_string(), "w4".to_string()]);
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let (_recorder, _lanes, listener) = listener();
        let (tx, rx) = broadcast::channel(4);
        drop(tx);

        listener.run(rx).await;
    }
}
