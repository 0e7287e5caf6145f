//! Configuration for Weft.
//!
//! Settings come from TOML files. Discovery loads the global file
//! (`~/.weft/config.toml`) and then the local one (`./weft.toml`); tables are
//! merged key by key so local values override global ones, and anything left
//! unset falls back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration file.
    #[error("Failed to parse configuration file {path}: {message}")]
    Parse {
        /// File that could not be parsed.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// What the engine does when a `retry` step runs out of budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryExhaustion {
    /// Fail the execution, as the `stop` policy would.
    #[default]
    Fail,
    /// Mark the step completed without output, as the `continue` policy would.
    Continue,
}

fn default_step_timeout_secs() -> f64 {
    300.0
}

fn default_max_log_entries() -> usize {
    1000
}

/// Execution engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Time bound for steps that do not declare one.
    #[serde(default = "default_step_timeout_secs")]
    pub default_step_timeout_secs: f64,
    /// Log entries kept per execution; older entries are dropped.
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
    /// Executions allowed to run at once; unlimited when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_executions: Option<usize>,
    /// Behavior when a retry budget is exhausted.
    #[serde(default)]
    pub on_retry_exhausted: RetryExhaustion,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_secs: default_step_timeout_secs(),
            max_log_entries: default_max_log_entries(),
            max_concurrent_executions: None,
            on_retry_exhausted: RetryExhaustion::default(),
        }
    }
}

impl EngineConfig {
    /// Returns the default step timeout as a `Duration`.
    pub fn default_step_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.default_step_timeout_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_step_timeout_secs()))
    }

    /// Validates the engine settings.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` describing the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.default_step_timeout_secs.is_finite() || self.default_step_timeout_secs <= 0.0 {
            return Err(ConfigError::Invalid(
                "engine.default_step_timeout_secs must be a positive number".to_string(),
            ));
        }
        if self.max_log_entries == 0 {
            return Err(ConfigError::Invalid("engine.max_log_entries must be at least 1".to_string()));
        }
        if self.max_concurrent_executions == Some(0) {
            return Err(ConfigError::Invalid(
                "engine.max_concurrent_executions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_generator_kind() -> String {
    "mock".to_string()
}

/// Text generator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Generator kind (`mock`, `openai`).
    #[serde(default = "default_generator_kind")]
    pub kind: String,
    /// Model used for agents that do not name one explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Base URL for OpenAI-compatible servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self { kind: default_generator_kind(), model: None, base_url: None }
    }
}

/// Root configuration for Weft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeftConfig {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Text generator settings.
    #[serde(default)]
    pub generator: GeneratorSettings,
    /// Log level filter (e.g. `info`, `weft_core=debug`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl WeftConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` or `ConfigError::Invalid`.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::Parse { path: PathBuf::from("<inline>"), message: e.to_string() })?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Loads configuration from a single TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        Self::load_layers(&[path.to_path_buf()], false)
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".weft")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from("weft.toml")
    }

    /// Discovers and loads the global and local configuration files.
    ///
    /// Missing files are skipped; files that exist but do not parse are
    /// reported.
    ///
    /// # Errors
    /// Returns an error if a present file cannot be read, parsed or validated.
    pub fn discover_and_load() -> ConfigResult<Self> {
        Self::load_layers(&[Self::default_global_path(), Self::default_local_path()], true)
    }

    /// Loads and merges files in order; later files override earlier ones.
    ///
    /// # Errors
    /// Returns an error if a file cannot be read, parsed or validated. With
    /// `skip_missing`, absent files are ignored.
    pub fn load_layers(paths: &[PathBuf], skip_missing: bool) -> ConfigResult<Self> {
        let mut merged = toml::Table::new();

        for path in paths {
            if skip_missing && !path.exists() {
                debug!(path = %path.display(), "Configuration file not present, skipping");
                continue;
            }
            let content = std::fs::read_to_string(path)
                .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
            let table: toml::Table = toml::from_str(&content)
                .map_err(|e| ConfigError::Parse { path: path.clone(), message: e.to_string() })?;
            debug!(path = %path.display(), "Loaded configuration file");
            merge_tables(&mut merged, table);
        }

        let config: Self = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: paths.last().cloned().unwrap_or_default(),
                message: e.to_string(),
            })?;
        config.engine.validate()?;
        Ok(config)
    }
}

/// Deep-merges `overlay` into `base`; nested tables merge, other values replace.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = WeftConfig::default();
        assert_eq!(config.engine.default_step_timeout(), Duration::from_secs(300));
        assert_eq!(config.engine.max_log_entries, 1000);
        assert_eq!(config.engine.max_concurrent_executions, None);
        assert_eq!(config.engine.on_retry_exhausted, RetryExhaustion::Fail);
        assert_eq!(config.generator.kind, "mock");
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn test_config_from_toml() {
        let config = WeftConfig::from_toml_str(
            r#"
log_level = "debug"

[engine]
default_step_timeout_secs = 2.5
max_concurrent_executions = 4
on_retry_exhausted = "continue"

[generator]
kind = "openai"
model = "gpt-4o-mini"
"#,
        )
        .unwrap();

        assert_eq!(config.engine.default_step_timeout(), Duration::from_millis(2500));
        assert_eq!(config.engine.max_log_entries, 1000);
        assert_eq!(config.engine.max_concurrent_executions, Some(4));
        assert_eq!(config.engine.on_retry_exhausted, RetryExhaustion::Continue);
        assert_eq!(config.generator.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        let err = WeftConfig::from_toml_str("[engine]\nmax_log_entries = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = WeftConfig::from_toml_str("[engine]\ndefault_step_timeout_secs = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = WeftConfig::from_toml_str("[engine]\non_retry_exhausted = \"explode\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_local_overrides_global() {
        let temp_dir = TempDir::new().unwrap();
        let global = temp_dir.path().join("global.toml");
        let local = temp_dir.path().join("weft.toml");

        std::fs::write(
            &global,
            "log_level = \"warn\"\n[engine]\nmax_log_entries = 50\nmax_concurrent_executions = 2\n",
        )
        .unwrap();
        std::fs::write(&local, "[engine]\nmax_log_entries = 10\n").unwrap();

        let config = WeftConfig::load_layers(&[global, local], false).unwrap();
        assert_eq!(config.engine.max_log_entries, 10);
        assert_eq!(config.engine.max_concurrent_executions, Some(2));
        assert_eq!(config.log_level.as_deref(), Some("warn"));
    }

    #[test]
    fn test_missing_files() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent.toml");

        let config = WeftConfig::load_layers(&[missing.clone()], true).unwrap();
        assert_eq!(config, WeftConfig::default());

        let err = WeftConfig::load_from_file(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
