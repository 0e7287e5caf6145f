//! Workflow validation command.

use std::path::Path;

use anyhow::Context;
use colored::Colorize;

use super::files::load_workflow;

/// Execute the validate command.
///
/// Loads the workflow and checks its steps, dependency references and
/// acyclicity.
pub fn execute(file: &Path) -> anyhow::Result<()> {
    let workflow = load_workflow(file)?;
    workflow.validate().with_context(|| format!("Workflow '{}' is invalid", workflow.id))?;

    let agents = workflow.referenced_agents();
    println!("  {} Workflow '{}' is valid", "✓".green().bold(), workflow.id);
    println!("    Steps:  {}", workflow.steps.len());
    if !agents.is_empty() {
        let names: Vec<&str> = agents.iter().map(String::as_str).collect();
        println!("    Agents: {}", names.join(", ").dimmed());
    }
    Ok(())
}
