//! Orchestration command.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use weft_core::workflow::to_text;
use weft_core::{AgentRegistry, WeftConfig};
use weft_orchestrator::{
    ConflictResolution, Coordinator, Orchestration, OrchestrationOutcome, OrchestrationStore,
    StrategyKind,
};

use super::files::load_agents;
use crate::config::build_generator;

/// Execute the orchestrate command.
///
/// Every agent in the file takes part, in file order.
pub async fn execute(
    config: &WeftConfig,
    agents_file: &Path,
    strategy: &str,
    conflict_resolution: Option<&str>,
    input: &str,
    json: bool,
) -> anyhow::Result<()> {
    let strategy: StrategyKind = strategy.parse()?;
    let resolution = conflict_resolution
        .map(str::parse::<ConflictResolution>)
        .transpose()?
        .unwrap_or_default();

    let generator = build_generator(config)?;
    let registry = Arc::new(AgentRegistry::new(generator.clone()));
    let mut ids = Vec::new();
    for agent in load_agents(agents_file)? {
        ids.push(agent.id.clone());
        registry.create(agent).await.context("Failed to register agent")?;
    }

    let coordinator = Coordinator::new(Arc::new(OrchestrationStore::new()), registry, generator);
    let orchestration = Orchestration::new("cli", "Command line orchestration", ids)
        .with_strategy(strategy)
        .with_conflict_resolution(resolution);
    coordinator.store().create(orchestration).await?;

    let outcome = coordinator.run("cli", input).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        output_human(&outcome);
    }
    Ok(())
}

fn output_human(outcome: &OrchestrationOutcome) {
    println!("{}", "weft orchestrate".bold().cyan());
    println!();
    if outcome.strategy == outcome.executed_strategy {
        println!("  Strategy: {}", outcome.strategy);
    } else {
        println!("  Strategy: {} (ran {})", outcome.strategy, outcome.executed_strategy);
    }
    println!();
    for (agent_id, output) in &outcome.outputs {
        println!("{}", format!("[{}]", agent_id).bold());
        println!("{}", to_text(output));
        println!();
    }
}
