//! Collaborator implementations for Weft.
//!
//! This crate provides concrete implementations of the `TextGenerator` and
//! `ApiCaller` traits.
//!
//! # Provided collaborators
//!
//! - **Mock**: deterministic echo generator for development
//! - **Scripted**: programmable generator with per-model replies, delays and failures
//! - **OpenAI**: OpenAI-compatible chat completions endpoint (API key required)
//! - **HTTP**: reqwest-backed external API caller

pub mod factory;
pub mod http;
pub mod openai;
pub mod scripted;

use async_trait::async_trait;
use tracing::debug;
use weft_abstraction::{GenerationOptions, ServiceError, TextGenerator};

pub use factory::{GeneratorConfig, GeneratorFactory, GeneratorKind};
pub use http::HttpApiCaller;
pub use openai::OpenAiGenerator;
pub use scripted::{RecordedCall, ScriptedGenerator};

/// A mock implementation of `TextGenerator` for development and demos.
///
/// The generated text echoes the model and the prompt, so runs are
/// reproducible without any provider.
#[derive(Debug, Default, Clone)]
pub struct MockGenerator;

impl MockGenerator {
    /// Creates a new `MockGenerator`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ServiceError> {
        debug!(
            model_id = %model_id,
            prompt_len = prompt.len(),
            options = ?options,
            "MockGenerator generating text"
        );

        Ok(format!("[{model_id}] {prompt}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_generator_echoes_prompt() {
        let generator = MockGenerator::new();
        let text =
            generator.generate("mock-1", "Hello", &GenerationOptions::default()).await.unwrap();
        assert_eq!(text, "[mock-1] Hello");
    }

    #[test]
    fn test_mock_generator_uses_default_bounds() {
        let generator = MockGenerator::new();
        let options = GenerationOptions { temperature: Some(3.0), ..Default::default() };
        assert!(generator.validate_options("mock-1", &options).is_err());
    }
}
