//! Orchestration record store.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use weft_core::{InMemoryRepository, Repository};

use crate::error::{OrchestrationError, Result};
use crate::models::Orchestration;

/// Store of orchestration records.
pub struct OrchestrationStore {
    repo: Arc<dyn Repository<Orchestration>>,
    write_lock: Mutex<()>,
}

impl Default for OrchestrationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestrationStore {
    /// Creates a store over an in-memory repository.
    pub fn new() -> Self {
        Self::with_repository(Arc::new(InMemoryRepository::new()))
    }

    /// Creates a store over the given repository.
    pub fn with_repository(repo: Arc<dyn Repository<Orchestration>>) -> Self {
        Self { repo, write_lock: Mutex::new(()) }
    }

    /// Stores a new orchestration.
    ///
    /// # Errors
    /// * `OrchestrationError::Validation` - If the record is malformed
    /// * `OrchestrationError::Conflict` - If the id is taken
    pub async fn create(&self, mut orchestration: Orchestration) -> Result<Orchestration> {
        orchestration.validate()?;

        let _guard = self.write_lock.lock().await;
        if self.repo.get(&orchestration.id).await?.is_some() {
            return Err(OrchestrationError::Conflict(format!(
                "orchestration '{}' already exists",
                orchestration.id
            )));
        }

        let now = chrono::Utc::now();
        orchestration.created_at = now;
        orchestration.updated_at = now;
        self.repo.put(orchestration.clone()).await?;

        info!(
            orchestration_id = %orchestration.id,
            strategy = %orchestration.strategy,
            agents = orchestration.agents.len(),
            "Orchestration created"
        );
        Ok(orchestration)
    }

    /// Replaces an orchestration, keeping its creation time.
    ///
    /// # Errors
    /// * `OrchestrationError::Validation` - If the record is malformed
    /// * `OrchestrationError::NotFound` - If the id is unknown
    pub async fn update(&self, mut orchestration: Orchestration) -> Result<Orchestration> {
        orchestration.validate()?;

        let _guard = self.write_lock.lock().await;
        let existing = self
            .repo
            .get(&orchestration.id)
            .await?
            .ok_or_else(|| OrchestrationError::NotFound(format!("orchestration '{}'", orchestration.id)))?;

        orchestration.created_at = existing.created_at;
        orchestration.updated_at = chrono::Utc::now();
        self.repo.put(orchestration.clone()).await?;
        Ok(orchestration)
    }

    /// Removes an orchestration.
    ///
    /// # Errors
    /// * `OrchestrationError::NotFound` - If the id is unknown
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.repo.delete(id).await? {
            return Err(OrchestrationError::NotFound(format!("orchestration '{}'", id)));
        }
        Ok(())
    }

    /// Gets an orchestration by id.
    ///
    /// # Errors
    /// * `OrchestrationError::NotFound` - If the id is unknown
    pub async fn get(&self, id: &str) -> Result<Orchestration> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| OrchestrationError::NotFound(format!("orchestration '{}'", id)))
    }

    /// Lists every orchestration, ordered by id.
    pub async fn list(&self) -> Result<Vec<Orchestration>> {
        Ok(self.repo.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crud() {
        let store = OrchestrationStore::new();
        store.create(Orchestration::new("review", "Review", ["writer", "critic"])).await.unwrap();

        assert_eq!(store.get("review").await.unwrap().agents.len(), 2);
        assert!(matches!(
            store.create(Orchestration::new("review", "Again", ["a"])).await.unwrap_err(),
            OrchestrationError::Conflict(_)
        ));

        store.update(Orchestration::new("review", "Review", ["writer"])).await.unwrap();
        assert_eq!(store.get("review").await.unwrap().agents, vec!["writer"]);

        store.delete("review").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(store.delete("review").await.unwrap_err(), OrchestrationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_agent_list_is_rejected() {
        let store = OrchestrationStore::new();
        let err = store.create(Orchestration::new("empty", "Empty", Vec::<String>::new())).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Validation(_)));
        assert!(matches!(store.get("empty").await.unwrap_err(), OrchestrationError::NotFound(_)));
    }
}
