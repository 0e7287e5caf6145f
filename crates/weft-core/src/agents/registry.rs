//! Agent registry for runtime agent management.
//!
//! Stores agent configurations behind a [`Repository`] and validates them
//! against the text generator that will serve them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use weft_abstraction::TextGenerator;

use crate::error::{CoreError, Result};
use crate::models::Agent;
use crate::storage::{InMemoryRepository, Repository};

/// Agents captured at the start of a run, keyed by id.
///
/// Registry updates made while the run is in flight are not visible here.
pub type AgentSnapshot = HashMap<String, Arc<Agent>>;

/// Agent registry.
///
/// Create and update serialize through a write lock so the existence check
/// and the write are atomic with respect to each other.
pub struct AgentRegistry {
    repo: Arc<dyn Repository<Agent>>,
    generator: Arc<dyn TextGenerator>,
    write_lock: Mutex<()>,
}

impl AgentRegistry {
    /// Creates a registry over an in-memory repository.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self::with_repository(Arc::new(InMemoryRepository::new()), generator)
    }

    /// Creates a registry over the given repository.
    pub fn with_repository(repo: Arc<dyn Repository<Agent>>, generator: Arc<dyn TextGenerator>) -> Self {
        Self { repo, generator, write_lock: Mutex::new(()) }
    }

    fn check(&self, agent: &Agent) -> Result<()> {
        agent.validate()?;
        self.generator
            .validate_options(&agent.model, &agent.generation_options())
            .map_err(|e| CoreError::Validation(format!("agent '{}': {}", agent.id, e)))
    }

    /// Registers a new agent.
    ///
    /// # Errors
    /// * `CoreError::Validation` - If the agent is malformed or its generation
    ///   parameters fall outside the generator's bounds
    /// * `CoreError::Conflict` - If an agent with the same id exists
    pub async fn create(&self, mut agent: Agent) -> Result<Agent> {
        self.check(&agent)?;

        let _guard = self.write_lock.lock().await;
        if self.repo.get(&agent.id).await?.is_some() {
            return Err(CoreError::Conflict(format!("agent '{}' already exists", agent.id)));
        }

        let now = chrono::Utc::now();
        agent.created_at = now;
        agent.updated_at = now;
        self.repo.put(agent.clone()).await?;

        info!(agent_id = %agent.id, model = %agent.model, "Agent registered");
        Ok(agent)
    }

    /// Replaces an existing agent, keeping its creation time.
    ///
    /// Runs already in flight keep the version they snapshotted.
    ///
    /// # Errors
    /// * `CoreError::Validation` - If the agent is malformed
    /// * `CoreError::NotFound` - If no agent has this id
    pub async fn update(&self, mut agent: Agent) -> Result<Agent> {
        self.check(&agent)?;

        let _guard = self.write_lock.lock().await;
        let existing = self
            .repo
            .get(&agent.id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("agent '{}'", agent.id)))?;

        agent.created_at = existing.created_at;
        agent.updated_at = chrono::Utc::now();
        self.repo.put(agent.clone()).await?;

        info!(agent_id = %agent.id, "Agent updated");
        Ok(agent)
    }

    /// Removes an agent.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no agent has this id
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.repo.delete(id).await? {
            return Err(CoreError::NotFound(format!("agent '{}'", id)));
        }
        info!(agent_id = %id, "Agent deleted");
        Ok(())
    }

    /// Gets an agent by id.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no agent has this id
    pub async fn get(&self, id: &str) -> Result<Agent> {
        self.repo.get(id).await?.ok_or_else(|| CoreError::NotFound(format!("agent '{}'", id)))
    }

    /// Lists every agent, ordered by id.
    pub async fn list(&self) -> Result<Vec<Agent>> {
        Ok(self.repo.list().await?)
    }

    /// Lists the agents whose active flag is set.
    pub async fn list_active(&self) -> Result<Vec<Agent>> {
        Ok(self.repo.find(&|agent: &Agent| agent.active).await?)
    }

    /// Captures the current version of each listed agent.
    ///
    /// Unknown ids are left out; the step that references one fails with
    /// `NotFound` when it runs.
    pub async fn snapshot<'a, I>(&self, ids: I) -> Result<AgentSnapshot>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut snapshot = HashMap::new();
        for id in ids {
            match self.repo.get(id).await? {
                Some(agent) => {
                    snapshot.insert(id.clone(), Arc::new(agent));
                }
                None => debug!(agent_id = %id, "Referenced agent not registered"),
            }
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerationParameters;
    use weft_models::MockGenerator;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(Arc::new(MockGenerator::new()))
    }

    fn writer() -> Agent {
        Agent::new("writer", "Writer", "mock-1").with_role("Writes drafts")
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = registry();
        registry.create(writer()).await.unwrap();

        let agent = registry.get("writer").await.unwrap();
        assert_eq!(agent.name, "Writer");
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let registry = registry();
        registry.create(writer()).await.unwrap();

        let err = registry.create(writer()).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_agents() {
        let registry = registry();

        let err = registry.create(Agent::new("a", "A", "")).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let hot = writer().with_parameters(GenerationParameters {
            temperature: Some(9.0),
            max_output_length: None,
        });
        let err = registry.create(hot).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("temperature")));
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_created_at() {
        let registry = registry();
        let created = registry.create(writer()).await.unwrap();

        let updated = registry.update(writer().with_role("Edits drafts")).await.unwrap();
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(registry.get("writer").await.unwrap().role, "Edits drafts");

        let err = registry.update(Agent::new("ghost", "Ghost", "m")).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let registry = registry();
        registry.create(writer()).await.unwrap();
        registry.delete("writer").await.unwrap();

        assert!(matches!(registry.get("writer").await.unwrap_err(), CoreError::NotFound(_)));
        assert!(matches!(registry.delete("writer").await.unwrap_err(), CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_active_and_snapshot() {
        let registry = registry();
        registry.create(writer()).await.unwrap();
        let mut idle = Agent::new("idle", "Idle", "mock-1");
        idle.active = false;
        registry.create(idle).await.unwrap();

        let active = registry.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "writer");

        let ids = vec!["writer".to_string(), "missing".to_string()];
        let snapshot = registry.snapshot(&ids).await.unwrap();
        assert_eq!(snapshot.len(), 1);

        // Later updates do not reach an existing snapshot
        registry.update(writer().with_role("Changed")).await.unwrap();
        assert_eq!(snapshot["writer"].role, "Writes drafts");
    }
}
