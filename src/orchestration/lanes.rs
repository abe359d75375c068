/// Per-workflow ordering of activation changes
///
/// Messages for the same workflow are applied one at a time, in delivery order.
/// Messages for different workflows run on separate tasks in parallel. A change that
/// panics is logged and the lane moves on to the next message. A lane exists
/// only while it has work; its task exits once the queue drains.

use crate::orchestration::{coordinator::ActivationCoordinator, message::ActivationChangeMessage};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

type Lanes = Arc<Mutex<HashMap<String, VecDeque<ActivationChangeMessage>>>>;

pub struct WorkflowLanes {
    coordinator: Arc<ActivationCoordinator>,
    /// Messages waiting behind the one currently applied, per workflow
    lanes: Lanes,
}

impl WorkflowLanes {
    pub fn new(coordinator: Arc<ActivationCoordinator>) -> Self {
        Self { coordinator, lanes: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Queue a message behind earlier messages for the same workflow.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, message: ActivationChangeMessage) {
        let workflow_id = message.workflow_id.clone();
        {
            let mut lanes = self.lanes.lock();
            if let Some(queue) = lanes.get_mut(&workflow_id) {
                queue.push_back(message);
                tracing::debug!("📋 Queued activation change for {} ({} pending)", workflow_id, queue.len());
                return;
            }
            lanes.insert(workflow_id.clone(), VecDeque::new());
        }

        let coordinator = Arc::clone(&self.coordinator);
        let lanes = Arc::clone(&self.lanes);
        tokio::spawn(async move {
            let mut next = Some(message);
            while let Some(message) = next.take() {
                // A panicking change must not strand the messages queued behind it
                let applying = Arc::clone(&coordinator);
                if let Err(e) = tokio::spawn(async move { applying.apply(message).await }).await {
                    tracing::error!("❌ Activation change for {} aborted: {}", workflow_id, e);
                }
                next = {
                    let mut lanes = lanes.lock();
                    let queued = lanes.get_mut(&workflow_id).and_then(VecDeque::pop_front);
                    if queued.is_none() {
                        lanes.remove(&workflow_id);
                    }
                    queued
                };
            }
        });
    }

    /// Number of workflows with a change in flight
    pub fn active_lanes(&self) -> usize {
        self.lanes.lock().len()
    }

    /// Messages waiting behind in-flight changes, across all workflows
    pub fn pending(&self) -> usize {
        self.lanes.lock().values().map(VecDeque::len).sum()
    }

    pub fn is_idle(&self) -> bool {
        self.lanes.lock().is_empty()
    }
}
