//! Data structures for Weft Core.
//!
//! Agents, workflow definitions and execution records. All of them are plain
//! serde types; behavior lives in the registries and the engine.

pub mod agent;
pub mod execution;
pub mod workflow;

pub use agent::{Agent, BehaviorProfile, Capability, GenerationParameters, Proactivity, Tone, Verbosity};
pub use execution::{ErrorEntry, ErrorKind, ExecutionStatus, LogEntry, LogLevel, WorkflowExecution};
pub use workflow::{
    DataOperation, ErrorPolicy, Predicate, Step, StepKind, Transform, Trigger, TriggerKind,
    Variables, Workflow,
};
