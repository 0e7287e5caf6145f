//! OpenAI-compatible text generator.
//!
//! Sends prompts to a `/chat/completions` endpoint. Works against the OpenAI
//! API and any server that speaks the same protocol.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, error};
use weft_abstraction::{GenerationOptions, ServiceError, TextGenerator};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Text generator backed by an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    /// The API key for authentication.
    api_key: String,
    /// The base URL of the API, without the trailing `/chat/completions`.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl OpenAiGenerator {
    /// Creates a generator using the `OPENAI_API_KEY` environment variable.
    ///
    /// # Errors
    /// Returns `ServiceError::Other` if the API key is not set.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn from_env() -> Result<Self, ServiceError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            ServiceError::Other("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        Ok(Self::with_api_key(api_key))
    }

    /// Creates a generator with an explicit API key.
    ///
    /// # Arguments
    /// * `api_key` - The API key for authentication
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), base_url: DEFAULT_BASE_URL.to_string(), client: Client::new() }
    }

    /// Overrides the base URL (for self-hosted compatible servers and tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request(model_id: &str, prompt: &str, options: &GenerationOptions) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system_instructions.as_ref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage { role: "system".to_string(), content: system.clone() });
        }
        messages.push(ChatMessage { role: "user".to_string(), content: prompt.to_string() });

        ChatRequest {
            model: model_id.to_string(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_output_length,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
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
            "OpenAiGenerator generating text"
        );

        self.validate_options(model_id, options)?;

        let url = format!("{}/chat/completions", self.base_url);
        let request_body = Self::build_request(model_id, prompt, options);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to chat completions API");
                ServiceError::Request(format!("Network error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %body, "Chat completions API returned error status");
            return Err(ServiceError::Response { status: status.as_u16(), body });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse chat completions response");
            ServiceError::Serialization(format!("Failed to parse response: {}", e))
        })?;

        parsed.choices.into_iter().next().map(|c| c.message.content).ok_or_else(|| {
            error!("No content in chat completions response");
            ServiceError::Other("No content in API response".to_string())
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
