//! CLI configuration loading and collaborator wiring.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use weft_abstraction::TextGenerator;
use weft_core::WeftConfig;
use weft_models::{GeneratorConfig, GeneratorFactory, GeneratorKind};

/// Model assigned to agents the CLI creates on the fly.
pub const FALLBACK_MODEL: &str = "mock-model";

/// Load configuration.
///
/// Configuration precedence:
/// 1. CLI arguments (handled by clap)
/// 2. The file passed with `--config`, if any
/// 3. Local config file (./weft.toml)
/// 4. Global config file (~/.weft/config.toml)
/// 5. Defaults
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<WeftConfig> {
    match explicit {
        Some(path) => WeftConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => WeftConfig::discover_and_load().context("Failed to load configuration"),
    }
}

/// Builds the text generator named by the `[generator]` table.
pub fn build_generator(config: &WeftConfig) -> anyhow::Result<Arc<dyn TextGenerator>> {
    let kind = GeneratorKind::from_str(&config.generator.kind)
        .with_context(|| format!("Unknown generator kind '{}'", config.generator.kind))?;

    let mut generator_config = GeneratorConfig::new(kind);
    if let Some(base_url) = &config.generator.base_url {
        generator_config = generator_config.with_base_url(base_url.clone());
    }
    GeneratorFactory::create(generator_config).context("Failed to create text generator")
}

/// Returns the model used for agents missing from the agents file.
pub fn fallback_model(config: &WeftConfig) -> String {
    config.generator.model.clone().unwrap_or_else(|| FALLBACK_MODEL.to_string())
}
