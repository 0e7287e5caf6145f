//! Workflow definition data structures.
//!
//! A workflow is a reusable DAG template: an ordered list of steps, each
//! naming the steps it depends on, plus trigger descriptors and default
//! variables. Step kinds form a closed enum; nested kinds (condition, loop,
//! parallel) carry their sub-steps inline.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_abstraction::HttpMethod;

use crate::error::{CoreError, Result};
use crate::planning::DependencyGraph;
use crate::storage::Entity;

/// Name → value bag used for workflow variables and execution results.
pub type Variables = serde_json::Map<String, Value>;

/// How a workflow run is started. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Started by a user action.
    #[default]
    Manual,
    /// Started on a schedule.
    Scheduled,
    /// Started by an inbound webhook.
    Webhook,
    /// Started by an application event.
    Event,
}

/// A trigger descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger kind.
    pub kind: TriggerKind,
    /// Kind-specific settings (cron expression, event name, ...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

/// What happens when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Fail the whole execution.
    #[default]
    Stop,
    /// Treat the step as completed without output.
    Continue,
    /// Re-attempt the step in the next wave while its budget lasts.
    Retry,
}

/// Boolean test over results (or over a single element when filtering).
///
/// Paths are dotted (`step.field.0`); the empty path names the scope itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// The path resolves to a non-null value.
    Exists {
        /// Path to test.
        path: String,
    },
    /// The value at the path is truthy.
    Truthy {
        /// Path to test.
        path: String,
    },
    /// The value at the path equals `value`.
    Equals {
        /// Path to test.
        path: String,
        /// Expected value.
        value: Value,
    },
    /// The value at the path differs from `value`.
    NotEquals {
        /// Path to test.
        path: String,
        /// Value to differ from.
        value: Value,
    },
    /// The number at the path is greater than `value`.
    GreaterThan {
        /// Path to test.
        path: String,
        /// Threshold.
        value: f64,
    },
    /// The number at the path is less than `value`.
    LessThan {
        /// Path to test.
        path: String,
        /// Threshold.
        value: f64,
    },
    /// The string, array or object at the path contains `value`.
    Contains {
        /// Path to test.
        path: String,
        /// Substring, element or key.
        value: Value,
    },
    /// Every nested predicate holds.
    All {
        /// Nested predicates.
        predicates: Vec<Predicate>,
    },
    /// At least one nested predicate holds.
    Any {
        /// Nested predicates.
        predicates: Vec<Predicate>,
    },
    /// The nested predicate does not hold.
    Not {
        /// Nested predicate.
        predicate: Box<Predicate>,
    },
}

/// A value transform applied by a `data_processing` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transform {
    /// Uppercase a string.
    Uppercase,
    /// Lowercase a string.
    Lowercase,
    /// Trim surrounding whitespace.
    Trim,
    /// Multiply a number (or each number of an array).
    Scale {
        /// Multiplier.
        factor: f64,
    },
    /// Parse a JSON string.
    ParseJson,
    /// Serialize the input to a JSON string.
    Stringify,
    /// Render a `{{name}}` template against the results.
    Template {
        /// Template text.
        template: String,
    },
    /// Extract a dotted path from the input.
    Pick {
        /// Path inside the input.
        field: String,
    },
}

/// Operation of a `data_processing` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataOperation {
    /// Fail unless the input is present (and has the listed fields).
    Validate {
        /// Fields that must be present and non-null on an object input.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required: Vec<String>,
    },
    /// Transform the input.
    Transform {
        /// The transform to apply.
        transform: Transform,
    },
    /// Keep the array elements matching the predicate.
    Filter {
        /// Element predicate.
        predicate: Predicate,
    },
}

fn default_item_var() -> String {
    "item".to_string()
}

/// Kind-specific configuration of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Call an agent with a rendered prompt.
    AiAgent {
        /// Agent id.
        agent: String,
        /// Prompt template.
        prompt: String,
    },
    /// Validate, transform or filter a value from the results.
    DataProcessing {
        /// Dotted path of the input in the results.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
        /// Operation to apply.
        operation: DataOperation,
    },
    /// Call an external API.
    ApiCall {
        /// HTTP method.
        #[serde(default)]
        method: HttpMethod,
        /// URL template.
        url: String,
        /// Header templates.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
        /// Body; string leaves are templates.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    /// Run one of two nested sub-steps.
    Condition {
        /// Predicate over the results.
        predicate: Predicate,
        /// Sub-step run when the predicate holds.
        then: Box<StepKind>,
        /// Sub-step run otherwise; without one the output is null.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<StepKind>>,
    },
    /// Run a sub-step once per element of an array variable.
    Loop {
        /// Dotted path of the array in the results.
        over: String,
        /// Name the current element is bound to.
        #[serde(default = "default_item_var")]
        item_var: String,
        /// Sub-step run per element.
        body: Box<StepKind>,
    },
    /// Run sub-steps concurrently.
    Parallel {
        /// Sub-steps in declaration order.
        branches: Vec<StepKind>,
    },
}

impl StepKind {
    /// Returns the wire name of the kind.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AiAgent { .. } => "ai_agent",
            Self::DataProcessing { .. } => "data_processing",
            Self::ApiCall { .. } => "api_call",
            Self::Condition { .. } => "condition",
            Self::Loop { .. } => "loop",
            Self::Parallel { .. } => "parallel",
        }
    }

    /// Collects the ids of every agent referenced by this kind and its
    /// nested sub-steps.
    pub fn collect_agents(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::AiAgent { agent, .. } => {
                out.insert(agent.clone());
            }
            Self::DataProcessing { .. } | Self::ApiCall { .. } => {}
            Self::Condition { then, otherwise, .. } => {
                then.collect_agents(out);
                if let Some(otherwise) = otherwise {
                    otherwise.collect_agents(out);
                }
            }
            Self::Loop { body, .. } => body.collect_agents(out),
            Self::Parallel { branches } => {
                for branch in branches {
                    branch.collect_agents(out);
                }
            }
        }
    }

    /// Validates the kind-specific configuration.
    ///
    /// # Errors
    /// * `CoreError::Validation` - If a required field is empty or invalid
    pub fn validate(&self, step_id: &str) -> Result<()> {
        let invalid = |what: &str| Err(CoreError::Validation(format!("step '{}': {}", step_id, what)));
        match self {
            Self::AiAgent { agent, prompt } => {
                if agent.trim().is_empty() {
                    return invalid("ai_agent step has no agent");
                }
                if prompt.trim().is_empty() {
                    return invalid("ai_agent step has an empty prompt");
                }
            }
            Self::DataProcessing { operation, .. } => {
                if let DataOperation::Transform { transform: Transform::Scale { factor } } = operation {
                    if !factor.is_finite() {
                        return invalid("scale factor must be finite");
                    }
                }
            }
            Self::ApiCall { url, .. } => {
                if url.trim().is_empty() {
                    return invalid("api_call step has an empty url");
                }
            }
            Self::Condition { then, otherwise, .. } => {
                then.validate(step_id)?;
                if let Some(otherwise) = otherwise {
                    otherwise.validate(step_id)?;
                }
            }
            Self::Loop { over, item_var, body } => {
                if over.trim().is_empty() {
                    return invalid("loop step has no `over` variable");
                }
                if item_var.trim().is_empty() {
                    return invalid("loop step has an empty item variable");
                }
                body.validate(step_id)?;
            }
            Self::Parallel { branches } => {
                for branch in branches {
                    branch.validate(step_id)?;
                }
            }
        }
        Ok(())
    }
}

/// A node of the workflow DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier within the workflow.
    pub id: String,
    /// Kind and kind-specific configuration.
    #[serde(flatten)]
    pub kind: StepKind,
    /// Ids of steps that must complete first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Name the output is stored under; defaults to the step id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Time bound in seconds; defaults to the engine setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
    /// Retry budget, used by the `retry` policy.
    #[serde(default)]
    pub retries: u32,
    /// Failure policy.
    #[serde(default)]
    pub on_error: ErrorPolicy,
}

impl Step {
    /// Creates a step with no dependencies and the `stop` policy.
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            dependencies: Vec::new(),
            output: None,
            timeout_secs: None,
            retries: 0,
            on_error: ErrorPolicy::Stop,
        }
    }

    /// Adds dependencies.
    #[must_use]
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Sets the output name.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output = Some(name.into());
        self
    }

    /// Sets the time bound in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// Sets the `retry` policy with the given budget.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self.on_error = ErrorPolicy::Retry;
        self
    }

    /// Returns the name the output is stored under.
    pub fn output_name(&self) -> &str {
        self.output.as_deref().unwrap_or(&self.id)
    }

    /// Returns the step's time bound, falling back to `default`.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok()).unwrap_or(default)
    }

    /// Validates the step in isolation.
    ///
    /// # Errors
    /// * `CoreError::Validation` - If the step is malformed
    pub fn validate(&self) -> Result<()> {
        if let Some(secs) = self.timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(CoreError::Validation(format!(
                    "step '{}': timeout must be a positive number of seconds",
                    self.id
                )));
            }
        }
        if self.output.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(CoreError::Validation(format!("step '{}': empty output name", self.id)));
        }
        self.kind.validate(&self.id)
    }
}

/// Core workflow data structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier for the workflow.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description of the workflow's purpose.
    #[serde(default)]
    pub description: String,
    /// Trigger descriptors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
    /// Default variables; caller variables override them.
    #[serde(default)]
    pub variables: Variables,
    /// Steps in declaration order.
    pub steps: Vec<Step>,
    /// Timestamp when the workflow was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Timestamp when the workflow was last updated.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates a workflow with no steps.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            triggers: Vec::new(),
            variables: Variables::new(),
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets a default variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Looks up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Returns the ids of every agent referenced anywhere in the workflow.
    pub fn referenced_agents(&self) -> BTreeSet<String> {
        let mut agents = BTreeSet::new();
        for step in &self.steps {
            step.kind.collect_agents(&mut agents);
        }
        agents
    }

    /// Builds the dependency graph, validating step ids and edges.
    ///
    /// # Errors
    /// * `CoreError::Validation` - On empty, duplicate or dangling ids and cycles
    pub fn dependency_graph(&self) -> Result<DependencyGraph> {
        Ok(DependencyGraph::from_steps(&self.steps)?)
    }

    /// Validates the whole definition.
    ///
    /// # Errors
    /// * `CoreError::Validation` - If any field, step or edge is invalid
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(CoreError::Validation("workflow id cannot be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation(format!("workflow '{}' has an empty name", self.id)));
        }
        for step in &self.steps {
            step.validate()?;
        }
        self.dependency_graph()?;

        let mut outputs = BTreeSet::new();
        for step in &self.steps {
            if !outputs.insert(step.output_name()) {
                return Err(CoreError::Validation(format!(
                    "duplicate output name '{}' at step '{}'",
                    step.output_name(),
                    step.id
                )));
            }
        }
        Ok(())
    }
}

impl Entity for Workflow {
    fn kind() -> &'static str {
        "workflow"
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent_step(id: &str, agent: &str) -> Step {
        Step::new(id, StepKind::AiAgent { agent: agent.to_string(), prompt: "go".to_string() })
    }

    #[test]
    fn test_step_deserializes_flattened_kind() {
        let step: Step = serde_json::from_value(json!({
            "id": "double",
            "kind": "data_processing",
            "input": "n",
            "operation": {"type": "transform", "transform": {"op": "scale", "factor": 2}},
            "dependencies": ["seed"],
            "on_error": "retry",
            "retries": 2
        }))
        .unwrap();

        assert_eq!(step.dependencies, vec!["seed"]);
        assert_eq!(step.on_error, ErrorPolicy::Retry);
        assert_eq!(step.retries, 2);
        assert_eq!(step.output_name(), "double");
        match step.kind {
            StepKind::DataProcessing { input, operation } => {
                assert_eq!(input.as_deref(), Some("n"));
                assert_eq!(
                    operation,
                    DataOperation::Transform { transform: Transform::Scale { factor: 2.0 } }
                );
            }
            other => panic!("Expected data_processing, got {}", other.name()),
        }
    }

    #[test]
    fn test_nested_kinds_deserialize() {
        let kind: StepKind = serde_json::from_value(json!({
            "kind": "condition",
            "predicate": {"op": "greater_than", "path": "score", "value": 5},
            "then": {"kind": "loop", "over": "items", "body": {"kind": "ai_agent", "agent": "a", "prompt": "{{item}}"}},
            "otherwise": {"kind": "parallel", "branches": [{"kind": "ai_agent", "agent": "b", "prompt": "x"}]}
        }))
        .unwrap();

        let mut agents = BTreeSet::new();
        kind.collect_agents(&mut agents);
        assert_eq!(agents.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);

        if let StepKind::Condition { then, .. } = kind {
            assert!(matches!(*then, StepKind::Loop { ref item_var, .. } if item_var == "item"));
        } else {
            panic!("Expected condition");
        }
    }

    #[test]
    fn test_output_name_and_timeout() {
        let step = agent_step("s", "a").with_output("summary").with_timeout_secs(0.5);
        assert_eq!(step.output_name(), "summary");
        assert_eq!(step.timeout(Duration::from_secs(30)), Duration::from_millis(500));
        assert_eq!(agent_step("t", "a").timeout(Duration::from_secs(30)), Duration::from_secs(30));
    }

    #[test]
    fn test_step_validation() {
        assert!(agent_step("s", "").validate().is_err());
        assert!(agent_step("s", "a").with_timeout_secs(0.0).validate().is_err());
        assert!(agent_step("s", "a").with_timeout_secs(f64::NAN).validate().is_err());

        let nested = Step::new(
            "p",
            StepKind::Parallel {
                branches: vec![StepKind::ApiCall {
                    method: HttpMethod::Get,
                    url: " ".to_string(),
                    headers: BTreeMap::new(),
                    body: None,
                }],
            },
        );
        assert!(nested.validate().is_err());
    }

    #[test]
    fn test_workflow_validation_rejects_cycles() {
        let workflow = Workflow::new("wf", "Cyclic")
            .with_step(agent_step("x", "a").depends_on(["y"]))
            .with_step(agent_step("y", "a").depends_on(["x"]));

        let err = workflow.validate().unwrap_err();
        assert!(matches!(err, CoreError::Validation(ref msg) if msg.contains("cyclic dependency")));
    }

    #[test]
    fn test_workflow_parses_from_toml() {
        let text = r#"
id = "wf"
name = "Pipeline"

[variables]
topic = "rust"

[[steps]]
id = "research"
kind = "ai_agent"
agent = "researcher"
prompt = "Research {{topic}}"

[[steps]]
id = "write"
kind = "ai_agent"
agent = "writer"
prompt = "Write about {{research}}"
dependencies = ["research"]
on_error = "retry"
retries = 2
timeout_secs = 1.5
"#;

        let workflow: Workflow = toml::from_str(text).unwrap();
        assert_eq!(workflow.variables.get("topic"), Some(&json!("rust")));
        assert_eq!(workflow.steps.len(), 2);

        let write = workflow.step("write").unwrap();
        assert_eq!(write.dependencies, vec!["research"]);
        assert_eq!(write.on_error, ErrorPolicy::Retry);
        assert_eq!(write.retries, 2);
        assert_eq!(write.timeout_secs, Some(1.5));
        assert!(workflow.validate().is_ok());
    }
}
