//! Runs orchestrations against the agent registry.

use std::sync::Arc;

use tracing::{info, warn};
use weft_abstraction::TextGenerator;
use weft_core::{Agent, AgentRegistry, CoreError};

use crate::error::{OrchestrationError, Result};
use crate::models::{OrchestrationOutcome, merge_contributions};
use crate::store::OrchestrationStore;
use crate::strategy::{CoordinationContext, strategy_for};

/// Runs stored orchestrations.
pub struct Coordinator {
    store: Arc<OrchestrationStore>,
    agents: Arc<AgentRegistry>,
    generator: Arc<dyn TextGenerator>,
}

impl Coordinator {
    /// Creates a coordinator.
    pub fn new(
        store: Arc<OrchestrationStore>,
        agents: Arc<AgentRegistry>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self { store, agents, generator }
    }

    /// Returns the orchestration store.
    pub fn store(&self) -> &Arc<OrchestrationStore> {
        &self.store
    }

    /// Runs orchestration `orchestration_id` on `input`.
    ///
    /// Every listed agent is resolved before any of them is invoked, so a
    /// missing or inactive agent fails the run without side effects.
    ///
    /// # Errors
    /// * `OrchestrationError::NotFound` - If the orchestration or an agent is unknown
    /// * `OrchestrationError::InactiveAgent` - If an agent is switched off
    /// * `OrchestrationError::AgentFailed` - If an agent's generation call fails
    pub async fn run(&self, orchestration_id: &str, input: &str) -> Result<OrchestrationOutcome> {
        let orchestration = self.store.get(orchestration_id).await?;
        let agents = self.resolve_agents(&orchestration.agents).await?;

        let strategy = strategy_for(orchestration.strategy);
        let ctx = CoordinationContext {
            orchestration_id: &orchestration.id,
            agents: &agents,
            generator: self.generator.as_ref(),
            resolution: orchestration.conflict_resolution,
        };
        let executed_strategy = strategy.executed_kind(&ctx);

        info!(
            orchestration_id = %orchestration.id,
            strategy = %orchestration.strategy,
            executed = %executed_strategy,
            agents = agents.len(),
            "Running orchestration"
        );

        let contributions = strategy.coordinate(&ctx, input).await.inspect_err(|e| {
            warn!(orchestration_id = %orchestration.id, error = %e, "Orchestration failed");
        })?;
        let outputs = merge_contributions(&contributions, orchestration.conflict_resolution);

        Ok(OrchestrationOutcome {
            orchestration_id: orchestration.id.clone(),
            strategy: orchestration.strategy,
            executed_strategy,
            contributions,
            outputs,
        })
    }

    async fn resolve_agents(&self, ids: &[String]) -> Result<Vec<Arc<Agent>>> {
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            let agent = match self.agents.get(id).await {
                Ok(agent) => agent,
                Err(CoreError::NotFound(_)) => {
                    return Err(OrchestrationError::NotFound(format!("agent '{}'", id)));
                }
                Err(e) => return Err(e.into()),
            };
            if !agent.active {
                return Err(OrchestrationError::InactiveAgent(id.clone()));
            }
            resolved.push(Arc::new(agent));
        }
        Ok(resolved)
    }
}
