//! Workflow execution engine for Weft Core.
//!
//! This module provides the definition store, template rendering, predicate
//! evaluation, per-kind step dispatch, the wave-parallel execution engine
//! and the store of execution records.

pub mod engine;
pub mod execution_store;
pub mod executor;
pub mod predicate;
pub mod store;
pub mod template;

pub use engine::ExecutionEngine;
pub use execution_store::ExecutionStore;
pub use executor::StepExecutor;
pub use predicate::is_truthy;
pub use store::WorkflowStore;
pub use template::{Scope, lookup, lookup_in, placeholders, render, render_value, to_text};
