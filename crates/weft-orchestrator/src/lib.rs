//! Multi-agent orchestration for Weft.
//!
//! An orchestration is a named list of agents run under a coordination
//! strategy. The coordinator resolves the agents from the registry, lets the
//! strategy invoke them and merges their contributions by agent id.

pub mod coordinator;
pub mod error;
pub mod models;
pub mod store;
pub mod strategy;

pub use coordinator::Coordinator;
pub use error::{OrchestrationError, Result};
pub use models::{
    ConflictResolution, Contribution, Orchestration, OrchestrationOutcome, StrategyKind,
    merge_contributions,
};
pub use store::OrchestrationStore;
pub use strategy::{
    AdaptiveStrategy, CoordinationContext, CoordinationStrategy, ParallelStrategy,
    SequentialStrategy, strategy_for,
};
