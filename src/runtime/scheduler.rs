/// Trigger and poller scheduler
///
/// Brings workflow triggers live using tokio-cron-scheduler: cron triggers become
/// cron jobs, pollers become repeated jobs, webhook paths are recorded in the
/// active workflow registry. Every firing is broadcast as a [`TriggerFired`] event
/// for the execution side to pick up.

use crate::{
    orchestration::collaborators::{ActivationReason, TriggerRegistry},
    workflow::{
        registry::{ActiveWorkflow, ActiveWorkflowRegistry},
        storage::WorkflowStorage,
        types::TriggerPlan,
    },
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Kind of trigger that started an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerSource {
    Cron,
    Poll,
    Webhook,
}

/// A trigger of a live workflow fired
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerFired {
    pub workflow_id: String,
    pub node_id: String,
    pub source: TriggerSource,
    pub fired_at: DateTime<Utc>,
    pub payload: Value,
}

/// Hot-reload trigger scheduler owning every live trigger on this instance
pub struct TriggerScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    storage: WorkflowStorage,
    active: Arc<ActiveWorkflowRegistry>,
    fired: broadcast::Sender<TriggerFired>,
}

impl TriggerScheduler {
    /// Create new trigger scheduler
    pub async fn new(storage: WorkflowStorage, active: Arc<ActiveWorkflowRegistry>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        let (fired, _) = broadcast::channel(1024);

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            storage,
            active,
            fired,
        })
    }

    /// Start firing registered jobs
    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting trigger scheduler");
        self.scheduler.read().await.start().await?;
        tracing::info!("✅ Trigger scheduler started");
        Ok(())
    }

    /// Stop the scheduler and forget every live workflow
    pub async fn stop(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping trigger scheduler");
        for workflow_id in self.active.list_ids() {
            self.unregister(&workflow_id).await;
        }
        self.scheduler.write().await.shutdown().await?;
        tracing::info!("✅ Trigger scheduler stopped");
        Ok(())
    }

    /// Subscribe to trigger firings
    pub fn subscribe(&self) -> broadcast::Receiver<TriggerFired> {
        self.fired.subscribe()
    }

    pub fn active(&self) -> &Arc<ActiveWorkflowRegistry> {
        &self.active
    }

    /// Re-add every stored active workflow (leader start-up).
    ///
    /// Individual failures are recorded as activation errors and do not stop the
    /// restore. Returns the number of workflows brought live.
    pub async fn restore_active(&self) -> Result<usize> {
        let ids = self.storage.list_active_ids().await?;
        let mut restored = 0;

        for workflow_id in &ids {
            match self.add(workflow_id, ActivationReason::Init).await {
                Ok(()) => restored += 1,
                Err(e) => tracing::warn!("⚠️ Could not restore workflow {}: {}", workflow_id, e),
            }
        }

        tracing::info!("📊 Restored {} of {} active workflows", restored, ids.len());
        Ok(restored)
    }

    /// Fire a webhook trigger of a live workflow. Returns false when no live
    /// workflow serves that path.
    pub fn fire_webhook(&self, workflow_id: &str, path: &str, payload: Value) -> bool {
        let Some(node_id) = self.active.find_webhook(workflow_id, path) else {
            return false;
        };
        emit(&self.fired, workflow_id, &node_id, TriggerSource::Webhook, payload);
        true
    }

    /// Load, compile and register a workflow's triggers, replacing any live ones
    async fn register(&self, workflow_id: &str, reason: ActivationReason) -> Result<()> {
        let workflow = self.storage.get_workflow(workflow_id).await?
            .ok_or_else(|| anyhow::anyhow!("Workflow not found: {}", workflow_id))?;

        if reason == ActivationReason::Update && !workflow.active {
            tracing::debug!("📋 Workflow {} is inactive, not registering triggers on update", workflow_id);
            self.unregister(workflow_id).await;
            return Ok(());
        }

        let plan = workflow.trigger_plan()?;
        let job_ids = self.add_jobs(workflow_id, &plan).await?;

        let previous = self.active.insert(ActiveWorkflow {
            workflow_id: workflow_id.to_string(),
            version_id: workflow.version_id.clone(),
            job_ids: job_ids.clone(),
            webhook_paths: plan.webhooks.clone(),
            activated_at: Utc::now(),
            reason,
        });

        // Old jobs are dropped only once the replacement is in place
        if let Some(previous) = previous {
            self.remove_jobs(workflow_id, &previous.job_ids).await;
        }

        tracing::info!("🔥 Registered {} triggers for workflow {} ({})", plan.len(), workflow_id, reason);
        Ok(())
    }

    /// Add scheduler jobs for a plan; on failure the jobs added so far are removed
    async fn add_jobs(&self, workflow_id: &str, plan: &TriggerPlan) -> Result<Vec<Uuid>> {
        let mut job_ids = Vec::new();

        for (node_id, schedule) in &plan.cron {
            match self.add_cron_job(workflow_id, node_id, schedule).await {
                Ok(job_id) => job_ids.push(job_id),
                Err(e) => {
                    self.remove_jobs(workflow_id, &job_ids).await;
                    return Err(e);
                }
            }
        }

        for (node_id, interval) in &plan.pollers {
            match self.add_poll_job(workflow_id, node_id, *interval).await {
                Ok(job_id) => job_ids.push(job_id),
                Err(e) => {
                    self.remove_jobs(workflow_id, &job_ids).await;
                    return Err(e);
                }
            }
        }

        Ok(job_ids)
    }

    async fn add_cron_job(&self, workflow_id: &str, node_id: &str, schedule: &str) -> Result<Uuid> {
        let workflow_id_owned = workflow_id.to_string();
        let node_id_owned = node_id.to_string();
        let fired = self.fired.clone();

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let workflow_id = workflow_id_owned.clone();
            let node_id = node_id_owned.clone();
            let fired = fired.clone();

            Box::pin(async move {
                tracing::debug!("🔔 Cron trigger fired: {} in workflow {}", node_id, workflow_id);
                let payload = serde_json::json!({ "triggerType": "cron", "timestamp": Utc::now().to_rfc3339() });
                emit(&fired, &workflow_id, &node_id, TriggerSource::Cron, payload);
            })
        })
        .map_err(|e| anyhow::anyhow!("Invalid cron schedule '{}' on node {}: {}", schedule, node_id, e))?;

        let job_id = self.scheduler.read().await.add(job).await?;
        tracing::debug!("⏰ Cron job {} registered for {}:{} ({})", job_id, workflow_id, node_id, schedule);
        Ok(job_id)
    }

    async fn add_poll_job(&self, workflow_id: &str, node_id: &str, interval: Duration) -> Result<Uuid> {
        let workflow_id_owned = workflow_id.to_string();
        let node_id_owned = node_id.to_string();
        let fired = self.fired.clone();

        let job = Job::new_repeated_async(interval, move |_uuid, _l| {
            let workflow_id = workflow_id_owned.clone();
            let node_id = node_id_owned.clone();
            let fired = fired.clone();

            Box::pin(async move {
                tracing::debug!("🔔 Poller fired: {} in workflow {}", node_id, workflow_id);
                let payload = serde_json::json!({ "triggerType": "poll", "timestamp": Utc::now().to_rfc3339() });
                emit(&fired, &workflow_id, &node_id, TriggerSource::Poll, payload);
            })
        })?;

        let job_id = self.scheduler.read().await.add(job).await?;
        tracing::debug!("⏰ Poll job {} registered for {}:{} (every {:?})", job_id, workflow_id, node_id, interval);
        Ok(job_id)
    }

    async fn remove_jobs(&self, workflow_id: &str, job_ids: &[Uuid]) {
        let scheduler = self.scheduler.read().await;
        for job_id in job_ids {
            if let Err(e) = scheduler.remove(job_id).await {
                tracing::warn!("⚠️ Failed to remove job {} of workflow {}: {}", job_id, workflow_id, e);
            }
        }
    }

    /// Drop a workflow's triggers. Returns whether it was live.
    async fn unregister(&self, workflow_id: &str) -> bool {
        let Some(previous) = self.active.remove(workflow_id) else {
            return false;
        };
        self.remove_jobs(workflow_id, &previous.job_ids).await;
        tracing::info!("🗑️ Removed {} jobs and {} webhooks for workflow {}",
            previous.job_ids.len(), previous.webhook_paths.len(), workflow_id);
        true
    }
}

fn emit(
    fired: &broadcast::Sender<TriggerFired>,
    workflow_id: &str,
    node_id: &str,
    source: TriggerSource,
    payload: Value,
) {
    let event = TriggerFired {
        workflow_id: workflow_id.to_string(),
        node_id: node_id.to_string(),
        source,
        fired_at: Utc::now(),
        payload,
    };
    if fired.send(event).is_err() {
        tracing::debug!("No execution subscriber for trigger {}:{}", workflow_id, node_id);
    }
}

#[async_trait]
impl TriggerRegistry for TriggerScheduler {
    async fn add(&self, workflow_id: &str, reason: ActivationReason) -> Result<()> {
        let registered = self.register(workflow_id, reason).await;
        if let Err(e) = &registered {
            self.active.record_error(workflow_id, e.to_string());
        }
        registered
    }

    async fn remove(&self, workflow_id: &str) -> Result<()> {
        if !self.unregister(workflow_id).await {
            tracing::debug!("Workflow {} had no live triggers", workflow_id);
        }
        Ok(())
    }

    async fn clear_activation_error(&self, workflow_id: &str) {
        self.active.clear_error(workflow_id);
    }
}
