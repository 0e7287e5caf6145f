//! Workflow run command.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tracing::info;
use weft_core::{
    Agent, AgentRegistry, ExecutionEngine, ExecutionStatus, ExecutionStore, StepExecutor, WeftConfig,
    WorkflowExecution, WorkflowStore,
};
use weft_core::workflow::to_text;
use weft_models::HttpApiCaller;

use super::files::{load_agents, load_workflow, parse_vars};
use crate::config::{build_generator, fallback_model};

/// Execute the run command.
///
/// Agents referenced by the workflow but missing from the agents file are
/// registered with the configured fallback model. Exits with status 1 when
/// the execution does not complete.
pub async fn execute(
    config: &WeftConfig,
    file: &Path,
    vars: &[String],
    agents_file: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let workflow = load_workflow(file)?;
    let variables = parse_vars(vars)?;
    let generator = build_generator(config)?;

    let registry = Arc::new(AgentRegistry::new(generator.clone()));
    let mut known = HashSet::new();
    if let Some(path) = agents_file {
        for agent in load_agents(path)? {
            known.insert(agent.id.clone());
            registry.create(agent).await.context("Failed to register agent")?;
        }
    }
    for id in workflow.referenced_agents() {
        if !known.contains(&id) {
            info!(agent_id = %id, "Registering agent with the fallback model");
            registry.create(Agent::new(id.clone(), id, fallback_model(config))).await?;
        }
    }

    let workflows = Arc::new(WorkflowStore::new());
    let workflow = workflows.create(workflow).await.context("Workflow rejected")?;

    let executor = Arc::new(StepExecutor::new(generator, Arc::new(HttpApiCaller::new())));
    let engine = ExecutionEngine::new(
        workflows,
        registry,
        Arc::new(ExecutionStore::new(config.engine.max_log_entries)),
        executor,
        config.engine.clone(),
    );

    let execution = engine.run_execution(&workflow.id, variables).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    } else {
        output_human(&execution);
    }

    if execution.status != ExecutionStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

fn output_human(execution: &WorkflowExecution) {
    let status = match execution.status {
        ExecutionStatus::Completed => execution.status.to_string().green().bold(),
        ExecutionStatus::Failed => execution.status.to_string().red().bold(),
        _ => execution.status.to_string().yellow().bold(),
    };

    println!("{}", format!("weft run: {}", execution.workflow_id).bold().cyan());
    println!();
    println!("  Execution: {}", execution.id.dimmed());
    println!("  Status:    {}", status);
    println!("  Waves:     {}", execution.waves);
    if let Some(ms) = execution.duration_ms() {
        println!("  Duration:  {}ms", ms);
    }
    println!();

    println!("{}", "Results:".bold());
    for (name, value) in &execution.results {
        println!("  {} {}", format!("{}:", name).cyan(), to_text(value));
    }

    if !execution.errors.is_empty() {
        println!();
        println!("{}", "Errors:".bold());
        for error in &execution.errors {
            let step = error.step_id.as_deref().unwrap_or("-");
            println!("  {} [{}] {:?}: {}", "✗".red().bold(), step, error.kind, error.message);
        }
    }
}
