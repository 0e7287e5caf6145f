//! Coordination strategies.
//!
//! A strategy decides the order in which agents are invoked and what each of
//! them sees. Strategies only produce contributions; merging them by agent id
//! is left to the coordinator.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::debug;
use weft_abstraction::TextGenerator;
use weft_core::Agent;
use weft_core::workflow::to_text;

use crate::error::{OrchestrationError, Result};
use crate::models::{ConflictResolution, Contribution, StrategyKind, merge_contributions};

/// What a strategy runs against.
pub struct CoordinationContext<'a> {
    /// Orchestration being run
    pub orchestration_id: &'a str,
    /// Agents in coordination order
    pub agents: &'a [Arc<Agent>],
    /// Text generator serving every agent
    pub generator: &'a dyn TextGenerator,
    /// Merge policy for repeated agents
    pub resolution: ConflictResolution,
}

impl CoordinationContext<'_> {
    /// Invokes one agent with `prompt`.
    ///
    /// # Errors
    /// * `OrchestrationError::AgentFailed` - If the generator fails
    pub async fn invoke(&self, agent: &Agent, prompt: &str) -> Result<Contribution> {
        debug!(orchestration_id = %self.orchestration_id, agent_id = %agent.id, "Invoking agent");
        let text = self
            .generator
            .generate(&agent.model, prompt, &agent.generation_options())
            .await
            .map_err(|source| OrchestrationError::AgentFailed { agent_id: agent.id.clone(), source })?;
        Ok(Contribution { agent_id: agent.id.clone(), output: Value::String(text) })
    }
}

/// A way of coordinating a set of agents.
#[async_trait]
pub trait CoordinationStrategy: Send + Sync {
    /// Returns the kind this strategy implements.
    fn kind(&self) -> StrategyKind;

    /// Returns the kind that will actually run for `ctx`.
    fn executed_kind(&self, _ctx: &CoordinationContext<'_>) -> StrategyKind {
        self.kind()
    }

    /// Runs the agents on `input` and returns their contributions in the
    /// order they were produced.
    ///
    /// # Errors
    /// Returns an error if any agent fails.
    async fn coordinate(&self, ctx: &CoordinationContext<'_>, input: &str) -> Result<Vec<Contribution>>;
}

/// Agents run one at a time; each sees the input plus the merged results so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

impl SequentialStrategy {
    /// Builds the instruction for the next agent.
    pub fn instruction(input: &str, ctx: &CoordinationContext<'_>, so_far: &[Contribution]) -> String {
        let merged = merge_contributions(so_far, ctx.resolution);
        if merged.is_empty() {
            return input.to_string();
        }

        let mut prompt = format!("{}\n\nResults so far:", input);
        for (agent_id, value) in &merged {
            prompt.push_str(&format!("\n\n[{}]\n{}", agent_id, to_text(value)));
        }
        prompt
    }
}

#[async_trait]
impl CoordinationStrategy for SequentialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    async fn coordinate(&self, ctx: &CoordinationContext<'_>, input: &str) -> Result<Vec<Contribution>> {
        let mut contributions = Vec::with_capacity(ctx.agents.len());
        for agent in ctx.agents {
            let prompt = Self::instruction(input, ctx, &contributions);
            contributions.push(ctx.invoke(agent, &prompt).await?);
        }
        Ok(contributions)
    }
}

/// Agents run concurrently on the same input.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelStrategy;

#[async_trait]
impl CoordinationStrategy for ParallelStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Parallel
    }

    async fn coordinate(&self, ctx: &CoordinationContext<'_>, input: &str) -> Result<Vec<Contribution>> {
        try_join_all(ctx.agents.iter().map(|agent| ctx.invoke(agent, input))).await
    }
}

/// Chooses a strategy per run.
///
/// Every run currently goes to the sequential strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveStrategy {
    sequential: SequentialStrategy,
}

impl AdaptiveStrategy {
    fn select(&self, _ctx: &CoordinationContext<'_>) -> &dyn CoordinationStrategy {
        &self.sequential
    }
}

#[async_trait]
impl CoordinationStrategy for AdaptiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Adaptive
    }

    fn executed_kind(&self, ctx: &CoordinationContext<'_>) -> StrategyKind {
        self.select(ctx).kind()
    }

    async fn coordinate(&self, ctx: &CoordinationContext<'_>, input: &str) -> Result<Vec<Contribution>> {
        self.select(ctx).coordinate(ctx, input).await
    }
}

/// Returns the strategy implementing `kind`.
pub fn strategy_for(kind: StrategyKind) -> Box<dyn CoordinationStrategy> {
    match kind {
        StrategyKind::Sequential => Box::new(SequentialStrategy),
        StrategyKind::Parallel => Box::new(ParallelStrategy),
        StrategyKind::Adaptive => Box::new(AdaptiveStrategy::default()),
    }
}
