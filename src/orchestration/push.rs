/// Frontend push notifications
///
/// Fire-and-forget events telling connected editors that a workflow went live or
/// stopped. `PushHub` fans them out to every subscriber (the SSE endpoint).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events pushed to connected frontends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PushEvent {
    WorkflowActivated { workflow_id: String },
    WorkflowDeactivated { workflow_id: String },
    WorkflowFailedToActivate { workflow_id: String, error_message: String },
}

impl PushEvent {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkflowActivated { .. } => "workflowActivated",
            Self::WorkflowDeactivated { .. } => "workflowDeactivated",
            Self::WorkflowFailedToActivate { .. } => "workflowFailedToActivate",
        }
    }
}

/// Sink for frontend events. No acknowledgement, no error.
pub trait Notifier: Send + Sync {
    fn broadcast(&self, event: PushEvent);
}

/// Broadcast-channel backed notifier
#[derive(Debug, Clone)]
pub struct PushHub {
    tx: broadcast::Sender<PushEvent>,
}

impl PushHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all events pushed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for PushHub {
    fn broadcast(&self, event: PushEvent) {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(receivers) => tracing::debug!("📣 Pushed {} to {} subscribers", kind, receivers),
            Err(_) => tracing::debug!("📣 No frontend connected, dropping {}", kind),
        }
    }
}
