//! Workflow definition store.
//!
//! Definitions are validated before every write: empty, duplicate or dangling
//! step ids and dependency cycles are rejected and nothing is stored.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::models::Workflow;
use crate::storage::{InMemoryRepository, Repository};

/// Store of reusable workflow definitions.
pub struct WorkflowStore {
    repo: Arc<dyn Repository<Workflow>>,
    write_lock: Mutex<()>,
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowStore {
    /// Creates a store over an in-memory repository.
    pub fn new() -> Self {
        Self::with_repository(Arc::new(InMemoryRepository::new()))
    }

    /// Creates a store over the given repository.
    pub fn with_repository(repo: Arc<dyn Repository<Workflow>>) -> Self {
        Self { repo, write_lock: Mutex::new(()) }
    }

    fn check(workflow: &Workflow) -> Result<()> {
        workflow.validate().inspect_err(|e| {
            warn!(workflow_id = %workflow.id, error = %e, "Rejected workflow definition");
        })
    }

    /// Stores a new definition.
    ///
    /// # Errors
    /// * `CoreError::Validation` - If the definition is malformed or cyclic
    /// * `CoreError::Conflict` - If a workflow with the same id exists
    pub async fn create(&self, mut workflow: Workflow) -> Result<Workflow> {
        Self::check(&workflow)?;

        let _guard = self.write_lock.lock().await;
        if self.repo.get(&workflow.id).await?.is_some() {
            return Err(CoreError::Conflict(format!("workflow '{}' already exists", workflow.id)));
        }

        let now = chrono::Utc::now();
        workflow.created_at = now;
        workflow.updated_at = now;
        self.repo.put(workflow.clone()).await?;

        info!(workflow_id = %workflow.id, steps = workflow.steps.len(), "Workflow created");
        Ok(workflow)
    }

    /// Replaces an existing definition, keeping its creation time.
    ///
    /// # Errors
    /// * `CoreError::Validation` - If the definition is malformed or cyclic
    /// * `CoreError::NotFound` - If no workflow has this id
    pub async fn update(&self, mut workflow: Workflow) -> Result<Workflow> {
        Self::check(&workflow)?;

        let _guard = self.write_lock.lock().await;
        let existing = self
            .repo
            .get(&workflow.id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("workflow '{}'", workflow.id)))?;

        workflow.created_at = existing.created_at;
        workflow.updated_at = chrono::Utc::now();
        self.repo.put(workflow.clone()).await?;

        info!(workflow_id = %workflow.id, steps = workflow.steps.len(), "Workflow updated");
        Ok(workflow)
    }

    /// Removes a definition. Executions already started are unaffected.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no workflow has this id
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.repo.delete(id).await? {
            return Err(CoreError::NotFound(format!("workflow '{}'", id)));
        }
        info!(workflow_id = %id, "Workflow deleted");
        Ok(())
    }

    /// Gets a definition by id.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no workflow has this id
    pub async fn get(&self, id: &str) -> Result<Workflow> {
        self.repo.get(id).await?.ok_or_else(|| CoreError::NotFound(format!("workflow '{}'", id)))
    }

    /// Lists every definition, ordered by id.
    pub async fn list(&self) -> Result<Vec<Workflow>> {
        Ok(self.repo.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Step, StepKind};

    fn agent_step(id: &str, deps: &[&str]) -> Step {
        Step::new(id, StepKind::AiAgent { agent: "writer".to_string(), prompt: "go".to_string() })
            .depends_on(deps.iter().copied())
    }

    #[tokio::test]
    async fn test_create_get_list() {
        let store = WorkflowStore::new();
        let workflow = Workflow::new("wf", "Pipeline").with_step(agent_step("a", &[]));
        store.create(workflow).await.unwrap();

        assert_eq!(store.get("wf").await.unwrap().name, "Pipeline");
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(matches!(
            store.create(Workflow::new("wf", "Again")).await.unwrap_err(),
            CoreError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_cyclic_definition_is_never_stored() {
        let store = WorkflowStore::new();
        let workflow = Workflow::new("loop", "Cycle")
            .with_step(agent_step("x", &["y"]))
            .with_step(agent_step("y", &["x"]));

        let err = store.create(workflow).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("cyclic")));
        assert!(matches!(store.get("loop").await.unwrap_err(), CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_cycle_and_keeps_previous() {
        let store = WorkflowStore::new();
        let original = Workflow::new("wf", "Pipeline")
            .with_step(agent_step("a", &[]))
            .with_step(agent_step("b", &["a"]));
        store.create(original).await.unwrap();

        let cyclic = Workflow::new("wf", "Pipeline")
            .with_step(agent_step("a", &["b"]))
            .with_step(agent_step("b", &["a"]));
        assert!(store.update(cyclic).await.is_err());

        let stored = store.get("wf").await.unwrap();
        assert!(stored.step("a").unwrap().dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_shared_output_name_is_rejected() {
        let store = WorkflowStore::new();
        let shared = Workflow::new("wf", "Summaries")
            .with_step(agent_step("s1", &[]).with_output("summary"))
            .with_step(agent_step("s2", &[]).with_output("summary"));
        let err = store.create(shared).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("duplicate output name 'summary'")));

        // An output may not shadow another step's id either
        let shadowing = Workflow::new("wf", "Shadow")
            .with_step(agent_step("a", &[]))
            .with_step(agent_step("b", &[]).with_output("a"));
        assert!(matches!(store.create(shadowing).await.unwrap_err(), CoreError::Validation(_)));
        assert!(matches!(store.get("wf").await.unwrap_err(), CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown() {
        let store = WorkflowStore::new();
        assert!(matches!(
            store.update(Workflow::new("nope", "Nope")).await.unwrap_err(),
            CoreError::NotFound(_)
        ));
        assert!(matches!(store.delete("nope").await.unwrap_err(), CoreError::NotFound(_)));
    }
}
