/// Core workflow type definitions
///
/// Defines workflows, nodes, and edges as they are persisted, and the trigger plan
/// extracted from a workflow when its triggers and pollers are brought live.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A complete workflow definition containing nodes and their connections
///
/// The `active` flag and `version_id` are owned by storage: they are stored in their
/// own columns and override whatever the JSON definition carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique workflow identifier (e.g., "wf-grading")
    pub id: String,
    /// Human-readable workflow name
    pub name: String,
    /// Whether the workflow's triggers should be live
    #[serde(default)]
    pub active: bool,
    /// Opaque revision token, changes every time the definition is saved
    #[serde(default)]
    pub version_id: String,
    /// List of nodes in this workflow
    pub nodes: Vec<Node>,
    /// List of edges connecting nodes
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A single node in the workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the workflow (e.g., "n1", "webhook-start")
    pub id: String,
    /// The type of node which determines whether it starts executions
    pub node_type: NodeType,
    /// Node-specific configuration parameters as flexible JSON
    #[serde(default)]
    pub params: Value,
}

/// Node types relevant to activation
///
/// Only trigger nodes matter here; every other node type is accepted and kept
/// opaque as `Action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    /// HTTP webhook trigger node
    /// Expected params: { "path": "/grade" }
    Webhook,

    /// Background cron trigger for scheduled workflows
    /// Expected params: { "schedule": "0 */1 * * * *" }
    CronTrigger,

    /// Poller checking an external system at a fixed interval
    /// Expected params: { "intervalSecs": 60 }
    Poller,

    /// Any node that does not start executions
    #[serde(other)]
    Action,
}

/// Connection between two nodes in the workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node ID
    pub from: String,
    /// Target node ID
    pub to: String,
}

/// Everything that has to be registered to bring a workflow live
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerPlan {
    /// (node id, cron expression)
    pub cron: Vec<(String, String)>,
    /// (node id, polling interval)
    pub pollers: Vec<(String, Duration)>,
    /// (node id, normalized webhook path)
    pub webhooks: Vec<(String, String)>,
}

impl TriggerPlan {
    /// Number of trigger nodes in the plan
    pub fn len(&self) -> usize {
        self.cron.len() + self.pollers.len() + self.webhooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Workflow {
    /// Extract the trigger plan, validating trigger parameters
    ///
    /// A workflow without any trigger node cannot be activated.
    pub fn trigger_plan(&self) -> Result<TriggerPlan> {
        let mut plan = TriggerPlan::default();

        for node in &self.nodes {
            match node.node_type {
                NodeType::CronTrigger => {
                    let schedule = node.params.get("schedule")
                        .and_then(|s| s.as_str())
                        .ok_or_else(|| anyhow::anyhow!("CronTrigger '{}' missing 'schedule' parameter", node.id))?;
                    plan.cron.push((node.id.clone(), schedule.to_string()));
                }
                NodeType::Poller => {
                    let interval = node.params.get("intervalSecs")
                        .and_then(|s| s.as_u64())
                        .filter(|secs| *secs > 0)
                        .ok_or_else(|| anyhow::anyhow!("Poller '{}' needs a positive 'intervalSecs' parameter", node.id))?;
                    plan.pollers.push((node.id.clone(), Duration::from_secs(interval)));
                }
                NodeType::Webhook => {
                    let path = node.params.get("path")
                        .and_then(|p| p.as_str())
                        .ok_or_else(|| anyhow::anyhow!("Webhook '{}' missing 'path' parameter", node.id))?;
                    plan.webhooks.push((node.id.clone(), normalize_path(path)));
                }
                NodeType::Action => {}
            }
        }

        if plan.is_empty() {
            anyhow::bail!("Workflow '{}' has no trigger node (Webhook, CronTrigger or Poller)", self.id);
        }

        Ok(plan)
    }
}

/// Normalize a webhook path to a leading slash without a trailing one
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{}", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow(nodes: Value) -> Workflow {
        serde_json::from_value(json!({ "id": "wf-1", "name": "Test", "nodes": nodes }))
            .expect("valid workflow json")
    }

    #[test]
    fn test_trigger_plan_collects_all_trigger_kinds() {
        let wf = workflow(json!([
            { "id": "cron", "node_type": "CronTrigger", "params": { "schedule": "0 */5 * * * *" } },
            { "id": "poll", "node_type": "Poller", "params": { "intervalSecs": 30 } },
            { "id": "hook", "node_type": "Webhook", "params": { "path": "grade/" } },
            { "id": "lua", "node_type": "FunLogic", "params": { "script": "return data" } }
        ]));

        let plan = wf.trigger_plan().expect("plan");
        assert_eq!(plan.cron, vec![("cron".to_string(), "0 */5 * * * *".to_string())]);
        assert_eq!(plan.pollers, vec![("poll".to_string(), Duration::from_secs(30))]);
        assert_eq!(plan.webhooks, vec![("hook".to_string(), "/grade".to_string())]);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_unknown_node_types_are_actions() {
        let wf = workflow(json!([{ "id": "x", "node_type": "HTTPClient" }]));
        assert_eq!(wf.nodes[0].node_type, NodeType::Action);
        assert!(!wf.active);
        assert!(wf.version_id.is_empty());
    }

    #[test]
    fn test_trigger_plan_requires_a_trigger() {
        let wf = workflow(json!([{ "id": "x", "node_type": "FunLogic" }]));
        let err = wf.trigger_plan().unwrap_err();
        assert!(err.to_string().contains("no trigger node"));
    }

    #[test]
    fn test_trigger_plan_rejects_bad_params() {
        let missing_schedule = workflow(json!([{ "id": "c", "node_type": "CronTrigger", "params": {} }]));
        assert!(missing_schedule.trigger_plan().is_err());

        let zero_interval = workflow(json!([{ "id": "p", "node_type": "Poller", "params": { "intervalSecs": 0 } }]));
        assert!(zero_interval.trigger_plan().is_err());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("grade"), "/grade");
        assert_eq!(normalize_path("/grade/"), "/grade");
        assert_eq!(normalize_path("/a/b"), "/a/b");
    }
}
