/// Lock-free registry of live workflows using ArcSwap
///
/// Tracks which workflows currently have triggers registered on this instance
/// (scheduler job ids, webhook paths) and the last activation error recorded for
/// each workflow. Readers never block; writers swap the whole map.

use crate::orchestration::collaborators::ActivationReason;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

/// Triggers registered for one live workflow
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveWorkflow {
    pub workflow_id: String,
    /// Definition revision the triggers were built from
    pub version_id: String,
    /// Scheduler jobs backing cron triggers and pollers
    pub job_ids: Vec<Uuid>,
    /// (node id, normalized path) for each webhook trigger
    pub webhook_paths: Vec<(String, String)>,
    pub activated_at: DateTime<Utc>,
    pub reason: ActivationReason,
}

/// Why a workflow could not be brought live
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationError {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ActiveWorkflowRegistry {
    /// Key: workflow_id
    active: ArcSwap<HashMap<String, ActiveWorkflow>>,
    /// Key: workflow_id
    errors: ArcSwap<HashMap<String, ActivationError>>,
}

impl ActiveWorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a workflow as live, returning the entry it replaced
    pub fn insert(&self, entry: ActiveWorkflow) -> Option<ActiveWorkflow> {
        let workflow_id = entry.workflow_id.clone();
        let previous = self.active.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(workflow_id.clone(), entry.clone());
            next
        });
        previous.get(&workflow_id).cloned()
    }

    /// Forget a live workflow, returning its entry if it was live
    pub fn remove(&self, workflow_id: &str) -> Option<ActiveWorkflow> {
        let previous = self.active.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(workflow_id);
            next
        });
        previous.get(workflow_id).cloned()
    }

    pub fn get(&self, workflow_id: &str) -> Option<ActiveWorkflow> {
        self.active.load().get(workflow_id).cloned()
    }

    pub fn is_active(&self, workflow_id: &str) -> bool {
        self.active.load().contains_key(workflow_id)
    }

    /// All live workflow IDs, sorted
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.load().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.active.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the webhook node of a live workflow serving `path`
    pub fn find_webhook(&self, workflow_id: &str, path: &str) -> Option<String> {
        let active = self.active.load();
        active.get(workflow_id)?
            .webhook_paths
            .iter()
            .find(|(_, webhook_path)| webhook_path == path)
            .map(|(node_id, _)| node_id.clone())
    }

    pub fn record_error(&self, workflow_id: &str, message: impl Into<String>) {
        let error = ActivationError { message: message.into(), occurred_at: Utc::now() };
        self.errors.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(workflow_id.to_string(), error.clone());
            next
        });
    }

    pub fn clear_error(&self, workflow_id: &str) {
        if !self.errors.load().contains_key(workflow_id) {
            return;
        }
        self.errors.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(workflow_id);
            next
        });
    }

    pub fn activation_error(&self, workflow_id: &str) -> Option<ActivationError> {
        self.errors.load().get(workflow_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(workflow_id: &str, version_id: &str) -> ActiveWorkflow {
        ActiveWorkflow {
            workflow_id: workflow_id.to_string(),
            version_id: version_id.to_string(),
            job_ids: vec![Uuid::new_v4()],
            webhook_paths: vec![("hook".to_string(), "/grade".to_string())],
            activated_at: Utc::now(),
            reason: ActivationReason::Activate,
        }
    }

    #[test]
    fn test_insert_replaces_and_returns_previous() {
        let registry = ActiveWorkflowRegistry::new();

        assert!(registry.insert(entry("wf-1", "v1")).is_none());
        let previous = registry.insert(entry("wf-1", "v2")).expect("replaced");

        assert_eq!(previous.version_id, "v1");
        assert_eq!(registry.get("wf-1").unwrap().version_id, "v2");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = ActiveWorkflowRegistry::new();
        registry.insert(entry("wf-1", "v1"));

        assert!(registry.remove("wf-1").is_some());
        assert!(registry.remove("wf-1").is_none());
        assert!(!registry.is_active("wf-1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_webhook() {
        let registry = ActiveWorkflowRegistry::new();
        registry.insert(entry("wf-1", "v1"));

        assert_eq!(registry.find_webhook("wf-1", "/grade"), Some("hook".to_string()));
        assert_eq!(registry.find_webhook("wf-1", "/other"), None);
        assert_eq!(registry.find_webhook("wf-2", "/grade"), None);
    }

    #[test]
    fn test_activation_errors() {
        let registry = ActiveWorkflowRegistry::new();

        registry.record_error("wf-1", "no trigger node");
        assert_eq!(registry.activation_error("wf-1").unwrap().message, "no trigger node");

        registry.clear_error("wf-1");
        registry.clear_error("wf-2");
        assert!(registry.activation_error("wf-1").is_none());
    }

    #[test]
    fn test_list_ids_sorted() {
        let registry = ActiveWorkflowRegistry::new();
        registry.insert(entry("wf-b", "v1"));
        registry.insert(entry("wf-a", "v1"));

        assert_eq!(registry.list_ids(), vec!["wf-a", "wf-b"]);
    }
}
