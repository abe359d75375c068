/// SQLite persistence layer for workflow storage
///
/// Handles workflow CRUD operations and owns each workflow's activation state.
/// Definitions are stored as JSON; `active` and `version_id` live in their own
/// columns so activation changes never rewrite the definition.

use crate::orchestration::collaborators::{ActivationStore, ActivationUpdate};
use crate::workflow::types::Workflow;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};

/// SQLite-based workflow storage manager
#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    /// SQLite connection pool for workflow database
    pool: SqlitePool,
}

/// Basic workflow metadata for listing operations
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub version_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl WorkflowStorage {
    /// Create new storage instance with database connection
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the workflow storage schema
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                version_id TEXT NOT NULL,
                definition JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Start-up restores active workflows
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflows_active ON workflows(active)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Store a new workflow or update existing one
    ///
    /// Uses UPSERT to handle both create and update operations atomically.
    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        let definition_json = serde_json::to_string(workflow)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, active, version_id, definition, updated_at)
            VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                active = excluded.active,
                version_id = excluded.version_id,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(workflow.active)
        .bind(&workflow.version_id)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve a workflow by ID, with activation state taken from its columns
    pub async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT active, version_id, definition FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.get("definition");
                let mut workflow: Workflow = serde_json::from_str(&definition_json)?;
                workflow.active = row.get("active");
                workflow.version_id = row.get("version_id");
                Ok(Some(workflow))
            }
            None => Ok(None),
        }
    }

    /// List all workflows with basic metadata
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowMetadata>> {
        let rows = sqlx::query(
            "SELECT id, name, active, version_id, created_at, updated_at FROM workflows ORDER BY updated_at DESC"
        )
        .fetch_all(&self.pool)
        .await?;

        let mut workflows = Vec::new();
        for row in rows {
            workflows.push(WorkflowMetadata {
                id: row.get("id"),
                name: row.get("name"),
                active: row.get("active"),
                version_id: row.get("version_id"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            });
        }

        Ok(workflows)
    }

    /// IDs of every workflow whose flag is on
    pub async fn list_active_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM workflows WHERE active = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| row.get::<String, _>("id")).collect())
    }

    /// Delete a workflow by ID
    pub async fn delete_workflow(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ActivationStore for WorkflowStorage {
    async fn update(&self, workflow_id: &str, update: ActivationUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE workflows SET active = ?, version_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?"
        )
        .bind(update.active)
        .bind(&update.version_id)
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Workflow not found: {}", workflow_id);
        }

        tracing::debug!("💾 Stored activation of {}: active={} version={}", workflow_id, update.active, update.version_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn storage() -> WorkflowStorage {
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let storage = WorkflowStorage::new(pool);
        storage.init_schema().await.expect("schema");
        storage
    }

    fn workflow(id: &str, active: bool) -> Workflow {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("Workflow {id}"),
            "active": active,
            "versionId": "v1",
            "nodes": [{ "id": "cron", "node_type": "CronTrigger", "params": { "schedule": "0 * * * * *" } }]
        }))
        .expect("valid workflow")
    }

    #[tokio::test]
    async fn test_save_and_get_roundtrip() {
        let storage = storage().await;
        storage.save_workflow(&workflow("wf-1", true)).await.unwrap();

        let loaded = storage.get_workflow("wf-1").await.unwrap().expect("stored");
        assert_eq!(loaded.name, "Workflow wf-1");
        assert!(loaded.active);
        assert_eq!(loaded.version_id, "v1");
        assert_eq!(loaded.nodes.len(), 1);

        assert!(storage.get_workflow("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activation_update_overrides_definition() {
        let storage = storage().await;
        storage.save_workflow(&workflow("wf-1", true)).await.unwrap();

        storage
            .update("wf-1", ActivationUpdate { active: false, version_id: "v2".to_string() })
            .await
            .unwrap();

        let loaded = storage.get_workflow("wf-1").await.unwrap().unwrap();
        assert!(!loaded.active);
        assert_eq!(loaded.version_id, "v2");
    }

    #[tokio::test]
    async fn test_activation_update_of_unknown_workflow_fails() {
        let storage = storage().await;
        let result = storage
            .update("missing", ActivationUpdate { active: false, version_id: "v1".to_string() })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_active_ids_and_delete() {
        let storage = storage().await;
        storage.save_workflow(&workflow("wf-b", true)).await.unwrap();
        storage.save_workflow(&workflow("wf-a", true)).await.unwrap();
        storage.save_workflow(&workflow("wf-c", false)).await.unwrap();

        assert_eq!(storage.list_active_ids().await.unwrap(), vec!["wf-a", "wf-b"]);
        assert_eq!(storage.list_workflows().await.unwrap().len(), 3);

        assert!(storage.delete_workflow("wf-a").await.unwrap());
        assert!(!storage.delete_workflow("wf-a").await.unwrap());
        assert_eq!(storage.list_active_ids().await.unwrap(), vec!["wf-b"]);
    }
}
