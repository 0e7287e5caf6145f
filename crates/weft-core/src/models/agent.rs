//! Agent configuration records.
//!
//! An agent is a configured persona around a text-generation model: the model
//! reference, fixed generation parameters, a behavior profile and a flat set
//! of named capabilities.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_abstraction::GenerationOptions;

use crate::error::{CoreError, Result};
use crate::storage::Entity;

/// A named tool an agent may use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// What the tool does.
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool parameters.
    #[serde(default)]
    pub parameters: Value,
    /// Reference to the handler that implements the tool.
    pub handler: String,
}

/// Tone of an agent's replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// No particular tone.
    #[default]
    Neutral,
    /// Formal register.
    Formal,
    /// Casual register.
    Casual,
    /// Warm and encouraging.
    Friendly,
}

/// How much an agent writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Short answers.
    Concise,
    /// Default length.
    #[default]
    Balanced,
    /// Long, thorough answers.
    Detailed,
}

/// How much an agent volunteers beyond the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proactivity {
    /// Answers only what is asked.
    Reactive,
    /// Occasionally suggests follow-ups.
    #[default]
    Balanced,
    /// Suggests next steps and alternatives.
    Proactive,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Neutral => "neutral",
            Self::Formal => "formal",
            Self::Casual => "casual",
            Self::Friendly => "friendly",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Concise => "concise",
            Self::Balanced => "balanced",
            Self::Detailed => "detailed",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Proactivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reactive => "reactive",
            Self::Balanced => "balanced",
            Self::Proactive => "proactive",
        };
        f.write_str(s)
    }
}

/// Behavior profile of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BehaviorProfile {
    /// Reply tone.
    #[serde(default)]
    pub tone: Tone,
    /// Reply length.
    #[serde(default)]
    pub verbosity: Verbosity,
    /// Initiative level.
    #[serde(default)]
    pub proactivity: Proactivity,
}

/// Fixed generation parameters of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationParameters {
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum output length in tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_length: Option<u32>,
}

fn default_active() -> bool {
    true
}

/// A configured AI agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier for the agent.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Role the agent plays (e.g. "researcher").
    #[serde(default)]
    pub role: String,
    /// Model identifier passed to the text generator.
    pub model: String,
    /// Generation parameters applied to every call.
    #[serde(default)]
    pub parameters: GenerationParameters,
    /// Behavior profile.
    #[serde(default)]
    pub behavior: BehaviorProfile,
    /// Free-form system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instructions: Option<String>,
    /// Tools keyed by name.
    #[serde(default)]
    pub capabilities: BTreeMap<String, Capability>,
    /// Inactive agents cannot be invoked.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Timestamp when the agent was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Timestamp when the agent was last updated.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Creates an active agent with default parameters.
    ///
    /// # Arguments
    /// * `id` - Unique identifier for the agent
    /// * `name` - Human-readable name
    /// * `model` - Model identifier used for generation
    pub fn new(id: impl Into<String>, name: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            role: String::new(),
            model: model.into(),
            parameters: GenerationParameters::default(),
            behavior: BehaviorProfile::default(),
            system_instructions: None,
            capabilities: BTreeMap::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Sets the system instructions.
    #[must_use]
    pub fn with_system_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.system_instructions = Some(instructions.into());
        self
    }

    /// Sets the generation parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: GenerationParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Adds a capability under `name`, replacing any previous one.
    #[must_use]
    pub fn with_capability(mut self, name: impl Into<String>, capability: Capability) -> Self {
        self.capabilities.insert(name.into(), capability);
        self
    }

    /// Looks up a capability by tool name.
    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    /// Validates the fields the registry owns.
    ///
    /// Generation bounds are checked by the registry against the text
    /// generator, not here.
    ///
    /// # Errors
    /// * `CoreError::Validation` - If a required field is empty
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(CoreError::Validation("agent id cannot be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation(format!("agent '{}' has an empty name", self.id)));
        }
        if self.model.trim().is_empty() {
            return Err(CoreError::Validation(format!("agent '{}' has no model", self.id)));
        }
        if let Some((name, _)) = self.capabilities.iter().find(|(_, c)| c.handler.is_empty()) {
            return Err(CoreError::Validation(format!(
                "capability '{}' of agent '{}' has no handler",
                name, self.id
            )));
        }
        Ok(())
    }

    /// Builds the options sent with every generation request.
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.parameters.temperature,
            max_output_length: self.parameters.max_output_length,
            system_instructions: Some(self.compose_system_instructions()),
        }
    }

    /// Composes system instructions from the free-form text, role, behavior
    /// profile and capability names.
    pub fn compose_system_instructions(&self) -> String {
        let mut parts = Vec::new();
        if let Some(text) = self.system_instructions.as_deref().filter(|s| !s.trim().is_empty()) {
            parts.push(text.trim().to_string());
        }
        if !self.role.trim().is_empty() {
            parts.push(format!("Role: {}", self.role.trim()));
        }
        parts.push(format!(
            "Tone: {}. Verbosity: {}. Proactivity: {}.",
            self.behavior.tone, self.behavior.verbosity, self.behavior.proactivity
        ));
        if !self.capabilities.is_empty() {
            let names: Vec<&str> = self.capabilities.keys().map(String::as_str).collect();
            parts.push(format!("Available tools: {}", names.join(", ")));
        }
        parts.join("\n\n")
    }
}

impl Entity for Agent {
    fn kind() -> &'static str {
        "agent"
    }

    fn id(&self) -> &str {
        &self.id
    }
}
