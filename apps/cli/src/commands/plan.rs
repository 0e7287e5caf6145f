//! Execution plan command.

use std::path::Path;

use anyhow::Context;
use colored::Colorize;

use super::files::load_workflow;

/// Execute the plan command.
///
/// Prints the steps grouped by execution level. Steps on one level run in
/// the same wave when nothing fails.
pub fn execute(file: &Path) -> anyhow::Result<()> {
    let workflow = load_workflow(file)?;
    workflow.validate().with_context(|| format!("Workflow '{}' is invalid", workflow.id))?;
    let graph = workflow.dependency_graph()?;

    println!("{}", format!("weft plan: {}", workflow.name).bold().cyan());
    println!();
    for (index, level) in graph.execution_levels().iter().enumerate() {
        println!("  Level {}: {}", index + 1, level.join(", "));
    }
    println!();
    println!("  {} steps, {} dependencies", graph.node_count(), graph.edge_count());
    Ok(())
}
