//! Repository abstraction and the in-memory implementation.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::storage::error::StorageResult;

/// Trait for records that can be stored in a repository.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Returns the kind of record, used in log fields and error messages.
    fn kind() -> &'static str;

    /// Returns the ID of this record.
    fn id(&self) -> &str;
}

/// Generic repository for keyed records.
///
/// Registries own a repository behind an `Arc` and are the only writers;
/// implementations only need to be individually atomic per call.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Retrieves a record by ID.
    async fn get(&self, id: &str) -> StorageResult<Option<T>>;

    /// Inserts or replaces a record.
    async fn put(&self, record: T) -> StorageResult<()>;

    /// Deletes a record by ID. Returns `true` if a record was removed.
    async fn delete(&self, id: &str) -> StorageResult<bool>;

    /// Lists every record, ordered by ID.
    async fn list(&self) -> StorageResult<Vec<T>>;

    /// Lists records matching `filter`, ordered by ID.
    async fn find(&self, filter: &(dyn for<'r> Fn(&'r T) -> bool + Send + Sync)) -> StorageResult<Vec<T>> {
        Ok(self.list().await?.into_iter().filter(|record| filter(record)).collect())
    }
}

/// Repository that keeps records in process memory.
pub struct InMemoryRepository<T> {
    records: RwLock<BTreeMap<String, T>>,
}

impl<T> fmt::Debug for InMemoryRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRepository")
            .field("record_count", &self.records.try_read().map(|r| r.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self { records: RwLock::new(BTreeMap::new()) }
    }
}

impl<T> InMemoryRepository<T> {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    async fn get(&self, id: &str) -> StorageResult<Option<T>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn put(&self, record: T) -> StorageResult<()> {
        debug!(kind = T::kind(), id = %record.id(), "Storing record");
        self.records.write().await.insert(record.id().to_string(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        debug!(kind = T::kind(), id = %id, "Deleting record");
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn list(&self) -> StorageResult<Vec<T>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
