//! Generator factory for creating text generators from configuration.
//!
//! Handles API key loading from environment variables for hosted providers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, error};
use weft_abstraction::{ServiceError, TextGenerator};

use crate::{MockGenerator, OpenAiGenerator};

/// Generator type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneratorKind {
    /// Deterministic echo generator.
    #[default]
    Mock,
    /// OpenAI or an OpenAI-compatible server.
    OpenAi,
}

impl FromStr for GeneratorKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            other => Err(ServiceError::UnsupportedModel(format!("unknown generator kind: {}", other))),
        }
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mock => f.write_str("mock"),
            Self::OpenAi => f.write_str("openai"),
        }
    }
}

/// Generator configuration.
#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    /// The type of generator to create.
    pub kind: GeneratorKind,
    /// Optional API key (if not provided, loaded from the environment).
    pub api_key: Option<String>,
    /// Optional base URL for OpenAI-compatible servers.
    pub base_url: Option<String>,
}

impl GeneratorConfig {
    /// Creates a new `GeneratorConfig` of the given kind.
    #[must_use]
    pub fn new(kind: GeneratorKind) -> Self {
        Self { kind, api_key: None, base_url: None }
    }

    /// Sets the API key for this configuration.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the base URL for this configuration.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// Factory for creating text generators.
pub struct GeneratorFactory;

impl GeneratorFactory {
    /// Creates a generator from the given configuration.
    ///
    /// # Errors
    /// Returns a `ServiceError` if creation fails (e.g., missing API key).
    pub fn create(config: GeneratorConfig) -> Result<Arc<dyn TextGenerator>, ServiceError> {
        debug!(kind = %config.kind, "Creating text generator");

        match config.kind {
            GeneratorKind::Mock => Ok(Arc::new(MockGenerator::new())),
            GeneratorKind::OpenAi => {
                let generator = match config.api_key {
                    Some(api_key) => OpenAiGenerator::with_api_key(api_key),
                    None => OpenAiGenerator::from_env().map_err(|e| {
                        error!(error = %e, "Failed to create OpenAI generator");
                        e
                    })?,
                };
                let generator = match config.base_url {
                    Some(base_url) => generator.with_base_url(base_url),
                    None => generator,
                };
                Ok(Arc::new(generator))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_abstraction::GenerationOptions;

    #[test]
    fn test_generator_kind_from_str() {
        assert_eq!("mock".parse::<GeneratorKind>().unwrap(), GeneratorKind::Mock);
        assert_eq!("OpenAI".parse::<GeneratorKind>().unwrap(), GeneratorKind::OpenAi);
        assert!("gemini".parse::<GeneratorKind>().is_err());
    }

    #[tokio::test]
    async fn test_create_mock_generator() {
        let generator = GeneratorFactory::create(GeneratorConfig::new(GeneratorKind::Mock)).unwrap();
        let text = generator.generate("m", "hi", &GenerationOptions::default()).await.unwrap();
        assert_eq!(text, "[m] hi");
    }

    #[test]
    fn test_create_openai_with_explicit_key() {
        let config = GeneratorConfig::new(GeneratorKind::OpenAi)
            .with_api_key("test-key")
            .with_base_url("http://localhost:8000/v1");
        assert!(GeneratorFactory::create(config).is_ok());
    }
}
