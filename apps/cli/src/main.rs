//! Weft CLI - Command-line interface for the Weft workflow engine
//!
//! This CLI provides a `weft` command for validating, planning and running
//! workflow definitions and for running multi-agent orchestrations.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{orchestrate, plan, run, validate};

/// Weft CLI - Multi-agent workflow orchestration
#[derive(Parser, Debug)]
#[command(
    name = "weft",
    author,
    version,
    about = "Weft - Multi-agent workflow orchestration",
    long_about = "Weft runs DAGs of AI agent calls, data processing, API calls and control flow.\n\
                  Workflows are read from JSON or TOML files."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Config file (defaults to ./weft.toml layered over ~/.weft/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a workflow definition
    ///
    /// Checks step configuration, dependency references and acyclicity.
    Validate {
        /// Workflow file (.json or .toml)
        file: PathBuf,
    },

    /// Print the execution levels of a workflow
    ///
    /// Steps on the same level have no dependencies on each other and run
    /// in the same wave.
    Plan {
        /// Workflow file (.json or .toml)
        file: PathBuf,
    },

    /// Run a workflow to completion
    Run {
        /// Workflow file (.json or .toml)
        file: PathBuf,

        /// Variable overriding a workflow default (key=value, value parsed as JSON when possible)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Agent definitions (.json or .toml)
        #[arg(long)]
        agents: Option<PathBuf>,

        /// Output the execution record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run agents under a coordination strategy
    Orchestrate {
        /// Agent definitions (.json or .toml); agents run in file order
        #[arg(long)]
        agents: PathBuf,

        /// Coordination strategy (sequential, parallel, adaptive)
        #[arg(long, default_value = "sequential")]
        strategy: String,

        /// Merge policy for repeated agents (keep_first, keep_last, concatenate)
        #[arg(long)]
        conflict_resolution: Option<String>,

        /// Output the outcome as JSON
        #[arg(long)]
        json: bool,

        /// Input handed to the agents
        input: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let weft_config = config::load_config(args.config.as_deref())?;

    // Initialize tracing
    let level = args
        .log_level
        .clone()
        .or_else(|| weft_config.log_level.clone())
        .unwrap_or_else(|| "warn".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Validate { file } => {
            validate::execute(&file)?;
        }
        Command::Plan { file } => {
            plan::execute(&file)?;
        }
        Command::Run { file, vars, agents, json } => {
            run::execute(&weft_config, &file, &vars, agents.as_deref(), json).await?;
        }
        Command::Orchestrate { agents, strategy, conflict_resolution, json, input } => {
            orchestrate::execute(
                &weft_config,
                &agents,
                &strategy,
                conflict_resolution.as_deref(),
                &input,
                json,
            )
            .await?;
        }
    }

    Ok(())
}
