//! Weft Core - workflow DAG orchestration.
//!
//! This crate provides the core functionality for Weft, including:
//! - Agent, workflow and execution data model
//! - Agent registry and workflow definition store
//! - Dependency graph validation and wave planning
//! - Step executor and wave-parallel execution engine
//! - Configuration management
//! - Error handling
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use weft_core::{
//!     AgentRegistry, EngineConfig, ExecutionEngine, ExecutionStore, StepExecutor, Variables,
//!     WorkflowStore,
//! };
//! # use weft_abstraction::{ApiCaller, TextGenerator};
//!
//! # async fn run(generator: Arc<dyn TextGenerator>, api: Arc<dyn ApiCaller>) -> weft_core::Result<()> {
//! let engine = ExecutionEngine::new(
//!     Arc::new(WorkflowStore::new()),
//!     Arc::new(AgentRegistry::new(generator.clone())),
//!     Arc::new(ExecutionStore::default()),
//!     Arc::new(StepExecutor::new(generator, api)),
//!     EngineConfig::default(),
//! );
//! let execution = engine.run_execution("content-pipeline", Variables::new()).await?;
//! println!("{}", execution.status);
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod models;
pub mod planning;
pub mod storage;
pub mod workflow;

pub use agents::{AgentRegistry, AgentSnapshot};
pub use config::{ConfigError, EngineConfig, GeneratorSettings, RetryExhaustion, WeftConfig};
pub use error::{CoreError, Result, StepError};
pub use models::{
    Agent, BehaviorProfile, Capability, DataOperation, ErrorEntry, ErrorKind, ErrorPolicy,
    ExecutionStatus, GenerationParameters, LogEntry, LogLevel, Predicate, Step, StepKind,
    Transform, Trigger, TriggerKind, Variables, Workflow, WorkflowExecution,
};
pub use planning::{DagError, DependencyGraph};
pub use storage::{Entity, InMemoryRepository, Repository, StorageError};
pub use workflow::{ExecutionEngine, ExecutionStore, StepExecutor, WorkflowStore};
