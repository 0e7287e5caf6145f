//! Orchestration records and results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use weft_core::Entity;

use crate::error::OrchestrationError;

/// How the agents of an orchestration are coordinated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One agent at a time, each seeing the results so far.
    #[default]
    Sequential,
    /// Every agent at once with the same input.
    Parallel,
    /// Picks a strategy per run.
    Adaptive,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(OrchestrationError::Validation(format!("unknown strategy '{}'", other))),
        }
    }
}

/// Decides the merged value when one agent contributes more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Keep the earliest contribution.
    KeepFirst,
    /// Keep the latest contribution.
    #[default]
    KeepLast,
    /// Join all contributions.
    Concatenate,
}

impl ConflictResolution {
    /// Merges `incoming` into `existing`.
    ///
    /// Concatenation joins two strings with a blank line; anything else is
    /// collected into an array.
    pub fn merge(self, existing: Value, incoming: Value) -> Value {
        match self {
            Self::KeepFirst => existing,
            Self::KeepLast => incoming,
            Self::Concatenate => match (existing, incoming) {
                (Value::String(a), Value::String(b)) => Value::String(format!("{}\n\n{}", a, b)),
                (Value::Array(mut items), incoming) => {
                    items.push(incoming);
                    Value::Array(items)
                }
                (existing, incoming) => Value::Array(vec![existing, incoming]),
            },
        }
    }
}

impl FromStr for ConflictResolution {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "keep_first" => Ok(Self::KeepFirst),
            "keep_last" => Ok(Self::KeepLast),
            "concatenate" => Ok(Self::Concatenate),
            other => Err(OrchestrationError::Validation(format!("unknown conflict resolution '{}'", other))),
        }
    }
}

/// A named set of agents under a coordination strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orchestration {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Agent ids in coordination order; an id may repeat.
    pub agents: Vec<String>,
    /// Coordination strategy.
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Merge policy for repeated agents.
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Orchestration {
    /// Creates a sequential orchestration with the `keep_last` policy.
    pub fn new<I, S>(id: impl Into<String>, name: impl Into<String>, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            agents: agents.into_iter().map(Into::into).collect(),
            strategy: StrategyKind::default(),
            conflict_resolution: ConflictResolution::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the coordination strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the conflict resolution policy.
    #[must_use]
    pub fn with_conflict_resolution(mut self, resolution: ConflictResolution) -> Self {
        self.conflict_resolution = resolution;
        self
    }

    /// Validates the record.
    ///
    /// # Errors
    /// * `OrchestrationError::Validation` - On an empty id, name or agent list
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        if self.id.trim().is_empty() {
            return Err(OrchestrationError::Validation("orchestration id cannot be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(OrchestrationError::Validation(format!("orchestration '{}' has an empty name", self.id)));
        }
        if self.agents.is_empty() {
            return Err(OrchestrationError::Validation(format!("orchestration '{}' has no agents", self.id)));
        }
        if self.agents.iter().any(|a| a.trim().is_empty()) {
            return Err(OrchestrationError::Validation(format!(
                "orchestration '{}' lists an empty agent id",
                self.id
            )));
        }
        Ok(())
    }
}

impl Entity for Orchestration {
    fn kind() -> &'static str {
        "orchestration"
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// One agent's output within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Agent that produced the output.
    pub agent_id: String,
    /// Generated output.
    pub output: Value,
}

/// Merges contributions in order, keyed by agent id.
pub fn merge_contributions(contributions: &[Contribution], resolution: ConflictResolution) -> Map<String, Value> {
    let mut merged = Map::new();
    for contribution in contributions {
        let value = match merged.remove(&contribution.agent_id) {
            Some(existing) => resolution.merge(existing, contribution.output.clone()),
            None => contribution.output.clone(),
        };
        merged.insert(contribution.agent_id.clone(), value);
    }
    merged
}

/// Outcome of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationOutcome {
    /// Orchestration that ran.
    pub orchestration_id: String,
    /// Strategy the orchestration is configured with.
    pub strategy: StrategyKind,
    /// Strategy that actually ran.
    pub executed_strategy: StrategyKind,
    /// Contributions in the order they were produced.
    pub contributions: Vec<Contribution>,
    /// Contributions merged by agent id.
    pub outputs: Map<String, Value>,
}
