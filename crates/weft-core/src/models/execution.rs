//! Execution records.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::workflow::Variables;
use crate::storage::Entity;

/// Status of a workflow execution.
///
/// Transitions only move forward: `Pending → Running → {Completed, Failed,
/// Cancelled}`. A pending execution may also fail before it starts running.
/// Only a running execution can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, not yet running.
    #[default]
    Pending,
    /// The engine is driving waves.
    Running,
    /// Every step completed.
    Completed,
    /// A step failed under `stop` semantics or the engine deadlocked.
    Failed,
    /// Cancelled by a caller.
    Cancelled,
}

impl ExecutionStatus {
    /// Returns `true` for `Completed`, `Failed` and `Cancelled`.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` if moving to `next` is a forward transition.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Failed)
                | (Self::Running, Self::Completed | Self::Failed | Self::Cancelled)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Category of a recorded execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A step handler raised.
    Execution,
    /// A step exceeded its time bound.
    Timeout,
    /// No step was ready while the workflow was incomplete.
    Deadlock,
    /// An agent, workflow or execution id was unknown.
    NotFound,
    /// An external collaborator failed.
    ExternalService,
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Failing step; `None` for execution-level errors such as deadlocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ErrorEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(step_id: Option<&str>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            step_id: step_id.map(str::to_string),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Severity of an execution log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failure.
    Error,
}

/// One execution log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Step the entry concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

impl LogEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(level: LogLevel, message: impl Into<String>, step_id: Option<&str>) -> Self {
        Self { level, message: message.into(), timestamp: Utc::now(), step_id: step_id.map(str::to_string) }
    }
}

/// Live and historical state of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Unique identifier of the run.
    pub id: String,
    /// Workflow being run.
    pub workflow_id: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// When the run started driving waves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Variables and step outputs by name.
    #[serde(default)]
    pub results: Variables,
    /// Failures in the order they were recorded.
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    /// Most recent log entries, oldest first.
    #[serde(default)]
    pub logs: VecDeque<LogEntry>,
    /// Number of waves dispatched.
    #[serde(default)]
    pub waves: u32,
}

impl WorkflowExecution {
    /// Creates a pending execution for `workflow_id` with a fresh id.
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            results: Variables::new(),
            errors: Vec::new(),
            logs: VecDeque::new(),
            waves: 0,
        }
    }

    /// Returns the elapsed run time in milliseconds, if the run finished.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        Some(completed.signed_duration_since(started).num_milliseconds().max(0) as u64)
    }
}

impl Entity for WorkflowExecution {
    fn kind() -> &'static str {
        "execution"
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_monotonic() {
        use ExecutionStatus::*;

        assert!(Pending.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Cancelled));

        assert!(!Running.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Running, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_new_execution_is_pending() {
        let a = WorkflowExecution::new("wf");
        let b = WorkflowExecution::new("wf");
        assert_eq!(a.status, ExecutionStatus::Pending);
        assert_ne!(a.id, b.id);
        assert!(a.duration_ms().is_none());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let entry = ErrorEntry::new(Some("s1"), ErrorKind::ExternalService, "boom");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["kind"], "external_service");
        assert_eq!(value["step_id"], "s1");
    }
}
