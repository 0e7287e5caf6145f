//! Collaborator abstraction layer for Weft.
//!
//! This module defines the narrow contracts the orchestration core consumes
//! from the outside world: text generation and external API calls. The core
//! is agnostic to which provider backs either call.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Represents a failure reported by an external collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceError {
    /// The request could not be sent (network issues, invalid URL).
    #[error("Request error: {0}")]
    Request(String),

    /// The remote side answered with a non-success status.
    #[error("Service responded with status {status}: {body}")]
    Response {
        /// HTTP-like status code returned by the service.
        status: u16,
        /// Raw response body, possibly truncated.
        body: String,
    },

    /// The payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generation options fall outside what the provider accepts.
    #[error("Invalid generation options: {0}")]
    InvalidOptions(String),

    /// The requested model is not served by this collaborator.
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// Other unexpected errors.
    #[error("Service error: {0}")]
    Other(String),
}

/// Options controlling a single generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum number of output tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_length: Option<u32>,

    /// System instructions sent alongside the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instructions: Option<String>,
}

impl GenerationOptions {
    /// Sets the system instructions.
    #[must_use]
    pub fn with_system_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.system_instructions = Some(instructions.into());
        self
    }
}

/// Parameter bounds accepted by a text-generation provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationBounds {
    /// Lowest accepted temperature (inclusive).
    pub min_temperature: f32,
    /// Highest accepted temperature (inclusive).
    pub max_temperature: f32,
    /// Largest accepted output length in tokens.
    pub max_output_length: u32,
}

impl Default for GenerationBounds {
    fn default() -> Self {
        Self { min_temperature: 0.0, max_temperature: 2.0, max_output_length: 32_768 }
    }
}

impl GenerationBounds {
    /// Checks that the options fall within these bounds.
    ///
    /// # Errors
    /// Returns `ServiceError::InvalidOptions` describing the first violation.
    pub fn check(&self, options: &GenerationOptions) -> Result<(), ServiceError> {
        if let Some(temperature) = options.temperature {
            if !temperature.is_finite()
                || temperature < self.min_temperature
                || temperature > self.max_temperature
            {
                return Err(ServiceError::InvalidOptions(format!(
                    "temperature {} outside [{}, {}]",
                    temperature, self.min_temperature, self.max_temperature
                )));
            }
        }

        if let Some(max_output_length) = options.max_output_length {
            if max_output_length == 0 || max_output_length > self.max_output_length {
                return Err(ServiceError::InvalidOptions(format!(
                    "max_output_length {} outside [1, {}]",
                    max_output_length, self.max_output_length
                )));
            }
        }

        Ok(())
    }
}

/// A provider of text generation.
///
/// Implementations must be `Send + Sync` so a single instance can serve
/// every concurrently running step.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for `prompt` using the model identified by `model_id`.
    ///
    /// # Errors
    /// Returns a `ServiceError` if the provider fails.
    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ServiceError>;

    /// Returns the parameter bounds this provider accepts for `model_id`.
    fn bounds(&self, _model_id: &str) -> GenerationBounds {
        GenerationBounds::default()
    }

    /// Validates generation options against the provider's bounds.
    ///
    /// # Errors
    /// Returns `ServiceError::InvalidOptions` when a parameter is out of range.
    fn validate_options(
        &self,
        model_id: &str,
        options: &GenerationOptions,
    ) -> Result<(), ServiceError> {
        self.bounds(model_id).check(options)
    }
}

/// HTTP method of an external API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET request.
    #[default]
    Get,
    /// POST request.
    Post,
    /// PUT request.
    Put,
    /// PATCH request.
    Patch,
    /// DELETE request.
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// A fully resolved external API request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Target URL.
    pub url: String,
    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Optional JSON body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Creates a request without headers or body.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: BTreeMap::new(), body: None }
    }
}

/// A performer of external API calls.
#[async_trait]
pub trait ApiCaller: Send + Sync {
    /// Performs the request and returns the decoded response body.
    ///
    /// Bodies that are not valid JSON are returned as `Value::String`.
    ///
    /// # Errors
    /// Returns `ServiceError::Response` for non-2xx responses and
    /// `ServiceError::Request` when the call cannot be made.
    async fn call(&self, request: &ApiRequest) -> Result<Value, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn generate(
            &self,
            _model_id: &str,
            prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, ServiceError> {
            Ok(prompt.to_uppercase())
        }
    }

    #[test]
    fn test_bounds_accept_defaults() {
        let bounds = GenerationBounds::default();
        assert!(bounds.check(&GenerationOptions::default()).is_ok());

        let options = GenerationOptions {
            temperature: Some(0.7),
            max_output_length: Some(1024),
            system_instructions: None,
        };
        assert!(bounds.check(&options).is_ok());
    }

    #[test]
    fn test_bounds_reject_temperature() {
        let bounds = GenerationBounds::default();
        let options = GenerationOptions { temperature: Some(2.5), ..Default::default() };
        let err = bounds.check(&options).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOptions(_)));
        assert!(err.to_string().contains("temperature"));

        let options = GenerationOptions { temperature: Some(f32::NAN), ..Default::default() };
        assert!(bounds.check(&options).is_err());
    }

    #[test]
    fn test_bounds_reject_output_length() {
        let bounds = GenerationBounds { max_output_length: 100, ..Default::default() };
        let zero = GenerationOptions { max_output_length: Some(0), ..Default::default() };
        assert!(bounds.check(&zero).is_err());

        let too_long = GenerationOptions { max_output_length: Some(101), ..Default::default() };
        assert!(bounds.check(&too_long).is_err());
    }

    #[tokio::test]
    async fn test_default_validate_options_uses_bounds() {
        let generator = Fixed;
        let options = GenerationOptions { temperature: Some(-0.1), ..Default::default() };
        assert!(generator.validate_options("any", &options).is_err());

        let text = generator.generate("any", "hi", &GenerationOptions::default()).await.unwrap();
        assert_eq!(text, "HI");
    }

    #[test]
    fn test_http_method_serde() {
        let method: HttpMethod = serde_json::from_str("\"POST\"").unwrap();
        assert_eq!(method, HttpMethod::Post);
        assert_eq!(method.to_string(), "POST");
    }

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::Response { status: 503, body: "down".to_string() };
        assert_eq!(err.to_string(), "Service responded with status 503: down");
    }
}
