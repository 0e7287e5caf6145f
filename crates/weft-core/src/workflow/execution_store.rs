//! Live and historical execution state.
//!
//! Records are mutated in place under a single write lock, so every update
//! (including a whole wave of outcomes) is atomic with respect to `cancel`.
//! Terminal records reject further writes.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::models::{ErrorEntry, ExecutionStatus, LogEntry, WorkflowExecution};

/// Moves `execution` to `next`, stamping start and completion times.
///
/// # Errors
/// * `CoreError::Conflict` - If the transition is not a forward one
pub(crate) fn transition_record(execution: &mut WorkflowExecution, next: ExecutionStatus) -> Result<()> {
    if !execution.status.can_transition_to(next) {
        return Err(CoreError::Conflict(format!(
            "execution '{}' cannot move from {} to {}",
            execution.id, execution.status, next
        )));
    }
    let now = Utc::now();
    if next == ExecutionStatus::Running {
        execution.started_at = Some(now);
    }
    if next.is_terminal() {
        execution.completed_at = Some(now);
    }
    execution.status = next;
    Ok(())
}

/// Store of workflow executions.
#[derive(Debug)]
pub struct ExecutionStore {
    records: RwLock<HashMap<String, WorkflowExecution>>,
    max_log_entries: usize,
}

impl Default for ExecutionStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ExecutionStore {
    /// Creates an empty store keeping at most `max_log_entries` log entries
    /// per execution.
    pub fn new(max_log_entries: usize) -> Self {
        Self { records: RwLock::new(HashMap::new()), max_log_entries: max_log_entries.max(1) }
    }

    /// Creates a pending execution of `workflow_id`.
    pub async fn create(&self, workflow_id: &str) -> WorkflowExecution {
        let execution = WorkflowExecution::new(workflow_id);
        debug!(execution_id = %execution.id, workflow_id = %workflow_id, "Execution created");
        self.records.write().await.insert(execution.id.clone(), execution.clone());
        execution
    }

    /// Gets an execution by id.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no execution has this id
    pub async fn get(&self, id: &str) -> Result<WorkflowExecution> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("execution '{}'", id)))
    }

    /// Returns the current status of an execution.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no execution has this id
    pub async fn status(&self, id: &str) -> Result<ExecutionStatus> {
        self.records
            .read()
            .await
            .get(id)
            .map(|e| e.status)
            .ok_or_else(|| CoreError::NotFound(format!("execution '{}'", id)))
    }

    /// Returns `true` if the execution was cancelled.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no execution has this id
    pub async fn is_cancelled(&self, id: &str) -> Result<bool> {
        Ok(self.status(id).await? == ExecutionStatus::Cancelled)
    }

    /// Lists every execution, oldest start first.
    pub async fn list(&self) -> Vec<WorkflowExecution> {
        self.select(|_| true).await
    }

    /// Lists the executions of one workflow.
    pub async fn by_workflow(&self, workflow_id: &str) -> Vec<WorkflowExecution> {
        self.select(|e| e.workflow_id == workflow_id).await
    }

    /// Lists the executions currently in `status`.
    pub async fn by_status(&self, status: ExecutionStatus) -> Vec<WorkflowExecution> {
        self.select(|e| e.status == status).await
    }

    async fn select(&self, filter: impl Fn(&WorkflowExecution) -> bool) -> Vec<WorkflowExecution> {
        let mut selected: Vec<WorkflowExecution> =
            self.records.read().await.values().filter(|e| filter(e)).cloned().collect();
        selected.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        selected
    }

    /// Applies `f` to a non-terminal execution under the write lock.
    ///
    /// Logs are trimmed to the configured bound afterwards.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no execution has this id
    /// * `CoreError::Conflict` - If the execution is already terminal
    pub async fn update<F, R>(&self, id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut WorkflowExecution) -> R + Send,
    {
        let mut records = self.records.write().await;
        let execution =
            records.get_mut(id).ok_or_else(|| CoreError::NotFound(format!("execution '{}'", id)))?;
        if execution.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "execution '{}' is {} and can no longer change",
                id, execution.status
            )));
        }

        let output = f(execution);
        while execution.logs.len() > self.max_log_entries {
            execution.logs.pop_front();
        }
        Ok(output)
    }

    /// Moves an execution to `next`.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no execution has this id
    /// * `CoreError::Conflict` - If the transition is not a forward one
    pub async fn transition(&self, id: &str, next: ExecutionStatus) -> Result<()> {
        self.update(id, |execution| transition_record(execution, next)).await??;
        debug!(execution_id = %id, status = %next, "Execution status changed");
        Ok(())
    }

    /// Marks a pending execution as running.
    ///
    /// # Errors
    /// Same as [`ExecutionStore::transition`].
    pub async fn mark_running(&self, id: &str) -> Result<()> {
        self.transition(id, ExecutionStatus::Running).await
    }

    /// Moves an execution to a terminal status.
    ///
    /// # Errors
    /// * `CoreError::Validation` - If `status` is not terminal
    /// * Otherwise same as [`ExecutionStore::transition`]
    pub async fn finish(&self, id: &str, status: ExecutionStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(CoreError::Validation(format!("{} is not a terminal status", status)));
        }
        self.transition(id, status).await?;
        info!(execution_id = %id, status = %status, "Execution finished");
        Ok(())
    }

    /// Writes a named output.
    ///
    /// # Errors
    /// Same as [`ExecutionStore::update`].
    pub async fn record_output(&self, id: &str, name: &str, value: Value) -> Result<()> {
        self.update(id, |execution| {
            execution.results.insert(name.to_string(), value);
        })
        .await
    }

    /// Appends an error entry.
    ///
    /// # Errors
    /// Same as [`ExecutionStore::update`].
    pub async fn record_error(&self, id: &str, entry: ErrorEntry) -> Result<()> {
        self.update(id, |execution| execution.errors.push(entry)).await
    }

    /// Appends a log entry, dropping the oldest beyond the bound.
    ///
    /// # Errors
    /// Same as [`ExecutionStore::update`].
    pub async fn append_log(&self, id: &str, entry: LogEntry) -> Result<()> {
        self.update(id, |execution| execution.logs.push_back(entry)).await
    }

    /// Sets the number of dispatched waves.
    ///
    /// # Errors
    /// Same as [`ExecutionStore::update`].
    pub async fn set_waves(&self, id: &str, waves: u32) -> Result<()> {
        self.update(id, |execution| execution.waves = waves).await
    }

    /// Cancels a running execution.
    ///
    /// Cancellation is cooperative: the engine notices at its next wave
    /// boundary and discards any results still in flight. Cancelling an
    /// execution in any other status changes nothing.
    ///
    /// Returns the status after the call.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no execution has this id
    pub async fn cancel(&self, id: &str) -> Result<ExecutionStatus> {
        let mut records = self.records.write().await;
        let execution =
            records.get_mut(id).ok_or_else(|| CoreError::NotFound(format!("execution '{}'", id)))?;

        if execution.status != ExecutionStatus::Running {
            debug!(execution_id = %id, status = %execution.status, "Cancel ignored for execution that is not running");
            return Ok(execution.status);
        }

        transition_record(execution, ExecutionStatus::Cancelled)?;
        info!(execution_id = %id, "Execution cancelled");
        Ok(execution.status)
    }
}
