//! Step dispatch by kind.
//!
//! Every kind runs through one entry point, [`StepExecutor::execute`], which
//! reads the results produced so far and returns the step's output value.
//! Handlers never write results themselves.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use serde_json::{Number, Value};
use tracing::debug;
use weft_abstraction::{ApiCaller, ApiRequest, TextGenerator};

use crate::agents::AgentSnapshot;
use crate::error::StepError;
use crate::models::{DataOperation, StepKind, Transform, Variables};
use crate::workflow::template::{lookup, lookup_in, render, render_value};

/// Executes single steps against the external collaborators.
pub struct StepExecutor {
    generator: Arc<dyn TextGenerator>,
    api_caller: Arc<dyn ApiCaller>,
}

impl StepExecutor {
    /// Creates an executor.
    ///
    /// # Arguments
    /// * `generator` - Serves `ai_agent` steps
    /// * `api_caller` - Serves `api_call` steps
    pub fn new(generator: Arc<dyn TextGenerator>, api_caller: Arc<dyn ApiCaller>) -> Self {
        Self { generator, api_caller }
    }

    /// Executes one step kind and returns its output.
    ///
    /// Nested kinds (`condition`, `loop`, `parallel`) recurse through this
    /// method, which is why the future is boxed.
    ///
    /// # Arguments
    /// * `kind` - The step configuration
    /// * `results` - Variables and outputs visible to the step
    /// * `agents` - Agents captured when the run started
    ///
    /// # Errors
    /// Returns a `StepError` when the handler or a collaborator fails.
    pub fn execute<'a>(
        &'a self,
        kind: &'a StepKind,
        results: &'a Variables,
        agents: &'a AgentSnapshot,
    ) -> BoxFuture<'a, Result<Value, StepError>> {
        async move {
            match kind {
                StepKind::AiAgent { agent, prompt } => {
                    self.run_agent(agent, prompt, results, agents).await
                }
                StepKind::DataProcessing { input, operation } => {
                    process_data(input.as_deref(), operation, results)
                }
                StepKind::ApiCall { method, url, headers, body } => {
                    let request = ApiRequest {
                        method: *method,
                        url: render(url, results),
                        headers: headers
                            .iter()
                            .map(|(name, value)| (name.clone(), render(value, results)))
                            .collect(),
                        body: body.as_ref().map(|b| render_value(b, results)),
                    };
                    debug!(method = %request.method, url = %request.url, "Calling external API");
                    Ok(self.api_caller.call(&request).await?)
                }
                StepKind::Condition { predicate, then, otherwise } => {
                    if predicate.evaluate(results) {
                        self.execute(then, results, agents).await
                    } else if let Some(otherwise) = otherwise {
                        self.execute(otherwise, results, agents).await
                    } else {
                        Ok(Value::Null)
                    }
                }
                StepKind::Loop { over, item_var, body } => {
                    let items = match lookup(results, over) {
                        Some(Value::Array(items)) => items,
                        Some(_) => {
                            return Err(StepError::Execution(format!(
                                "loop variable '{}' is not an array",
                                over
                            )));
                        }
                        None => {
                            return Err(StepError::Execution(format!(
                                "loop variable '{}' is not defined",
                                over
                            )));
                        }
                    };

                    let index_var = format!("{}_index", item_var);
                    let scopes: Vec<Variables> = items
                        .iter()
                        .enumerate()
                        .map(|(index, item)| {
                            let mut scope = results.clone();
                            scope.insert(item_var.clone(), item.clone());
                            scope.insert(index_var.clone(), Value::from(index));
                            scope
                        })
                        .collect();

                    debug!(over = %over, iterations = scopes.len(), "Running loop iterations");
                    let outputs =
                        try_join_all(scopes.iter().map(|scope| self.execute(body, scope, agents)))
                            .await?;
                    Ok(Value::Array(outputs))
                }
                StepKind::Parallel { branches } => {
                    let outputs = try_join_all(
                        branches.iter().map(|branch| self.execute(branch, results, agents)),
                    )
                    .await?;
                    Ok(Value::Array(outputs))
                }
            }
        }
        .boxed()
    }

    async fn run_agent(
        &self,
        agent_id: &str,
        prompt: &str,
        results: &Variables,
        agents: &AgentSnapshot,
    ) -> Result<Value, StepError> {
        let agent =
            agents.get(agent_id).ok_or_else(|| StepError::NotFound(format!("agent '{}'", agent_id)))?;
        if !agent.active {
            return Err(StepError::Execution(format!("agent '{}' is inactive", agent_id)));
        }

        let prompt = render(prompt, results);
        let options = agent.generation_options();
        debug!(agent_id = %agent_id, model = %agent.model, prompt_len = prompt.len(), "Invoking agent");

        let text = self.generator.generate(&agent.model, &prompt, &options).await?;
        Ok(Value::String(text))
    }
}

/// Resolves the input of a `data_processing` step. Without a path the whole
/// results map is the input.
fn resolve_input(path: Option<&str>, results: &Variables) -> Option<Value> {
    match path {
        Some(path) => lookup(results, path).cloned(),
        None => Some(Value::Object(results.clone())),
    }
}

fn process_data(
    path: Option<&str>,
    operation: &DataOperation,
    results: &Variables,
) -> Result<Value, StepError> {
    let input = resolve_input(path, results);
    let describe = || path.map_or_else(|| "results".to_string(), |p| format!("'{}'", p));

    match operation {
        DataOperation::Validate { required } => {
            let value = input
                .filter(|v| !v.is_null())
                .ok_or_else(|| StepError::Execution(format!("validation failed: input {} is absent", describe())))?;

            let missing: Vec<&str> = required
                .iter()
                .filter(|field| lookup_in(&value, field).is_none_or(Value::is_null))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(StepError::Execution(format!(
                    "validation failed: input {} is missing {}",
                    describe(),
                    missing.join(", ")
                )));
            }
            Ok(value)
        }
        DataOperation::Transform { transform } => {
            let value = input
                .ok_or_else(|| StepError::Execution(format!("input {} is not defined", describe())))?;
            apply_transform(transform, value, results)
        }
        DataOperation::Filter { predicate } => match input {
            Some(Value::Array(items)) => {
                Ok(Value::Array(items.into_iter().filter(|item| predicate.evaluate(item)).collect()))
            }
            Some(_) => Err(StepError::Execution(format!("filter input {} is not an array", describe()))),
            None => Err(StepError::Execution(format!("input {} is not defined", describe()))),
        },
    }
}

fn expect_str<'v>(value: &'v Value, op: &str) -> Result<&'v str, StepError> {
    value
        .as_str()
        .ok_or_else(|| StepError::Execution(format!("{} expects a string input", op)))
}

fn apply_transform(transform: &Transform, input: Value, results: &Variables) -> Result<Value, StepError> {
    match transform {
        Transform::Uppercase => Ok(Value::String(expect_str(&input, "uppercase")?.to_uppercase())),
        Transform::Lowercase => Ok(Value::String(expect_str(&input, "lowercase")?.to_lowercase())),
        Transform::Trim => Ok(Value::String(expect_str(&input, "trim")?.trim().to_string())),
        Transform::Scale { factor } => scale(&input, *factor),
        Transform::ParseJson => serde_json::from_str(expect_str(&input, "parse_json")?)
            .map_err(|e| StepError::Execution(format!("parse_json failed: {}", e))),
        Transform::Stringify => serde_json::to_string(&input)
            .map(Value::String)
            .map_err(|e| StepError::Execution(format!("stringify failed: {}", e))),
        Transform::Template { template } => {
            let mut scope = results.clone();
            scope.insert("input".to_string(), input);
            Ok(Value::String(render(template, &scope)))
        }
        Transform::Pick { field } => lookup_in(&input, field)
            .cloned()
            .ok_or_else(|| StepError::Execution(format!("field '{}' not found in input", field))),
    }
}

/// Multiplies a number, or every number of an array. Whole results stay
/// integers so `[1, 2, 3]` scaled by 2 is `[2, 4, 6]`.
fn scale(input: &Value, factor: f64) -> Result<Value, StepError> {
    match input {
        Value::Number(n) => {
            let x = n
                .as_f64()
                .ok_or_else(|| StepError::Execution("scale input is not representable".to_string()))?;
            number(x * factor)
        }
        Value::Array(items) => {
            items.iter().map(|item| scale(item, factor)).collect::<Result<Vec<_>, _>>().map(Value::Array)
        }
        _ => Err(StepError::Execution("scale expects a number or an array of numbers".to_string())),
    }
}

fn number(x: f64) -> Result<Value, StepError> {
    if x.fract() == 0.0 && x.abs() < 9.0e15 {
        return Ok(Value::from(x as i64));
    }
    Number::from_f64(x)
        .map(Value::Number)
        .ok_or_else(|| StepError::Execution(format!("scale produced a non-finite number: {}", x)))
}
