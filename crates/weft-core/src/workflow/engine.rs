//! Wave-parallel workflow execution.
//!
//! One coordinating task drives each execution. Every iteration it collects
//! the steps whose dependencies have all completed, runs that wave
//! concurrently, waits for all of it, and then applies the outcomes in
//! declaration order. The coordinating task is the only writer of the run's
//! completed set, results and errors; step handlers just return values.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::agents::{AgentRegistry, AgentSnapshot};
use crate::config::{EngineConfig, RetryExhaustion};
use crate::error::{CoreError, Result, StepError, TimeoutBound};
use crate::models::{
    ErrorEntry, ErrorKind, ErrorPolicy, ExecutionStatus, LogEntry, LogLevel, Step, Variables,
    Workflow, WorkflowExecution,
};
use crate::workflow::execution_store::{ExecutionStore, transition_record};
use crate::workflow::executor::StepExecutor;
use crate::workflow::store::WorkflowStore;

/// Interval at which [`ExecutionEngine::wait`] polls the execution store.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

type StepOutcome = std::result::Result<Value, StepError>;

/// What the engine does with a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Stop,
    Continue,
    Retry { remaining: u32 },
}

/// Whether the loop keeps going after a wave is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Proceed,
    Halt,
}

/// Per-run bookkeeping owned by the coordinating task.
struct RunState {
    completed: HashSet<String>,
    retries_left: HashMap<String, u32>,
    results: Variables,
    waves: u32,
}

impl RunState {
    fn new(workflow: &Workflow, results: Variables) -> Self {
        let retries_left = workflow.steps.iter().map(|s| (s.id.clone(), s.retries)).collect();
        Self { completed: HashSet::new(), retries_left, results, waves: 0 }
    }

    fn ready<'w>(&self, workflow: &'w Workflow) -> Vec<&'w Step> {
        workflow
            .steps
            .iter()
            .filter(|step| {
                !self.completed.contains(&step.id)
                    && step.dependencies.iter().all(|dep| self.completed.contains(dep))
            })
            .collect()
    }

    fn resolve(&mut self, step: &Step, on_exhausted: RetryExhaustion) -> Resolution {
        match step.on_error {
            ErrorPolicy::Stop => Resolution::Stop,
            ErrorPolicy::Continue => Resolution::Continue,
            ErrorPolicy::Retry => {
                let left = self.retries_left.entry(step.id.clone()).or_insert(step.retries);
                if *left > 0 {
                    *left -= 1;
                    Resolution::Retry { remaining: *left }
                } else {
                    match on_exhausted {
                        RetryExhaustion::Fail => Resolution::Stop,
                        RetryExhaustion::Continue => Resolution::Continue,
                    }
                }
            }
        }
    }

    /// Applies one wave of outcomes to the record, in declaration order.
    fn apply_wave(
        &mut self,
        execution: &mut WorkflowExecution,
        wave: &[&Step],
        outcomes: Vec<StepOutcome>,
        on_exhausted: RetryExhaustion,
    ) -> Flow {
        execution.waves = self.waves;
        let mut flow = Flow::Proceed;

        for (step, outcome) in wave.iter().zip(outcomes) {
            let step_id = step.id.as_str();

            if flow == Flow::Halt {
                // Outputs after a stop are discarded; failures are still recorded.
                if let Err(err) = outcome {
                    execution.errors.push(ErrorEntry::new(Some(step_id), err.kind(), err.to_string()));
                }
                continue;
            }

            match outcome {
                Ok(value) => {
                    let output = step.output_name().to_string();
                    self.completed.insert(step.id.clone());
                    self.results.insert(output.clone(), value.clone());
                    execution.results.insert(output, value);
                    execution.logs.push_back(LogEntry::new(
                        LogLevel::Info,
                        format!("Step '{}' completed", step_id),
                        Some(step_id),
                    ));
                }
                Err(err) => {
                    execution.errors.push(ErrorEntry::new(Some(step_id), err.kind(), err.to_string()));
                    match self.resolve(step, on_exhausted) {
                        Resolution::Stop => {
                            error!(
                                execution_id = %execution.id,
                                step_id = %step_id,
                                error = %err,
                                "Step failed; stopping execution"
                            );
                            execution.logs.push_back(LogEntry::new(
                                LogLevel::Error,
                                format!("Step '{}' failed: {}", step_id, err),
                                Some(step_id),
                            ));
                            if let Err(e) = transition_record(execution, ExecutionStatus::Failed) {
                                warn!(execution_id = %execution.id, error = %e, "Could not mark execution failed");
                            }
                            flow = Flow::Halt;
                        }
                        Resolution::Continue => {
                            warn!(
                                execution_id = %execution.id,
                                step_id = %step_id,
                                error = %err,
                                "Step failed; continuing without output"
                            );
                            self.completed.insert(step.id.clone());
                            execution.logs.push_back(LogEntry::new(
                                LogLevel::Warn,
                                format!("Step '{}' failed, continuing: {}", step_id, err),
                                Some(step_id),
                            ));
                        }
                        Resolution::Retry { remaining } => {
                            warn!(
                                execution_id = %execution.id,
                                step_id = %step_id,
                                remaining,
                                error = %err,
                                "Step failed; retrying next wave"
                            );
                            execution.logs.push_back(LogEntry::new(
                                LogLevel::Warn,
                                format!("Step '{}' failed, {} retries left: {}", step_id, remaining, err),
                                Some(step_id),
                            ));
                        }
                    }
                }
            }
        }

        flow
    }
}

/// Drives workflow executions.
///
/// Cheap to clone; clones share the stores, the executor and the admission
/// limiter.
#[derive(Clone)]
pub struct ExecutionEngine {
    workflows: Arc<WorkflowStore>,
    agents: Arc<AgentRegistry>,
    executions: Arc<ExecutionStore>,
    executor: Arc<StepExecutor>,
    config: EngineConfig,
    admission: Option<Arc<Semaphore>>,
}

impl ExecutionEngine {
    /// Creates an engine.
    ///
    /// # Arguments
    /// * `workflows` - Source of workflow definitions
    /// * `agents` - Registry the run snapshots its agents from
    /// * `executions` - Where execution records live
    /// * `executor` - Runs individual steps
    /// * `config` - Timeouts, retry exhaustion and admission settings
    pub fn new(
        workflows: Arc<WorkflowStore>,
        agents: Arc<AgentRegistry>,
        executions: Arc<ExecutionStore>,
        executor: Arc<StepExecutor>,
        config: EngineConfig,
    ) -> Self {
        let admission = config.max_concurrent_executions.map(|n| Arc::new(Semaphore::new(n.max(1))));
        Self { workflows, agents, executions, executor, config, admission }
    }

    /// Returns the execution store.
    pub fn executions(&self) -> &Arc<ExecutionStore> {
        &self.executions
    }

    /// Returns the workflow store.
    pub fn workflows(&self) -> &Arc<WorkflowStore> {
        &self.workflows
    }

    /// Returns the agent registry.
    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts an execution in the background and returns its id.
    ///
    /// # Arguments
    /// * `workflow_id` - Workflow to run
    /// * `variables` - Initial variables; they override the workflow defaults
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If the workflow does not exist
    pub async fn start_execution(&self, workflow_id: &str, variables: Variables) -> Result<String> {
        let workflow = self.workflows.get(workflow_id).await?;
        let execution_id = self.executions.create(&workflow.id).await.id;

        let engine = self.clone();
        let id = execution_id.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.drive(&workflow, &id, variables).await {
                error!(execution_id = %id, error = %e, "Execution aborted");
            }
        });

        info!(workflow_id = %workflow_id, execution_id = %execution_id, "Execution started");
        Ok(execution_id)
    }

    /// Runs an execution to completion in the caller's task.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If the workflow does not exist
    /// * `CoreError::Storage` - If the agent snapshot cannot be taken
    pub async fn run_execution(&self, workflow_id: &str, variables: Variables) -> Result<WorkflowExecution> {
        let workflow = self.workflows.get(workflow_id).await?;
        let execution_id = self.executions.create(&workflow.id).await.id;
        info!(workflow_id = %workflow_id, execution_id = %execution_id, "Execution started");

        self.drive(&workflow, &execution_id, variables).await?;
        self.executions.get(&execution_id).await
    }

    /// Cancels an execution. See [`ExecutionStore::cancel`].
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no execution has this id
    pub async fn cancel(&self, execution_id: &str) -> Result<ExecutionStatus> {
        self.executions.cancel(execution_id).await
    }

    /// Waits until an execution reaches a terminal status.
    ///
    /// # Errors
    /// * `CoreError::NotFound` - If no execution has this id
    pub async fn wait(&self, execution_id: &str) -> Result<WorkflowExecution> {
        loop {
            let execution = self.executions.get(execution_id).await?;
            if execution.status.is_terminal() {
                return Ok(execution);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Drives one execution until it completes, fails or is cancelled.
    async fn drive(&self, workflow: &Workflow, execution_id: &str, variables: Variables) -> Result<()> {
        let _permit = match &self.admission {
            Some(limiter) => Some(
                Arc::clone(limiter)
                    .acquire_owned()
                    .await
                    .map_err(|e| CoreError::Conflict(format!("admission limiter closed: {}", e)))?,
            ),
            None => None,
        };

        if let Err(e) = self.executions.mark_running(execution_id).await {
            return self.stop_if_cancelled(execution_id, e).await;
        }

        let agents: Arc<AgentSnapshot> =
            match self.agents.snapshot(&workflow.referenced_agents()).await {
                Ok(snapshot) => Arc::new(snapshot),
                Err(e) => {
                    self.abort(execution_id, ErrorKind::Execution, format!("agent snapshot failed: {}", e)).await;
                    return Err(e);
                }
            };

        let mut results = workflow.variables.clone();
        results.extend(variables);
        let initial = results.clone();
        let started = self
            .executions
            .update(execution_id, move |execution| {
                execution.results = initial;
                execution.logs.push_back(LogEntry::new(LogLevel::Info, "Execution started", None));
            })
            .await;
        if let Err(e) = started {
            return self.stop_if_cancelled(execution_id, e).await;
        }

        let mut state = RunState::new(workflow, results);
        let on_exhausted = self.config.on_retry_exhausted;

        loop {
            if state.completed.len() == workflow.steps.len() {
                if let Err(e) = self.executions.finish(execution_id, ExecutionStatus::Completed).await {
                    return self.stop_if_cancelled(execution_id, e).await;
                }
                info!(
                    workflow_id = %workflow.id,
                    execution_id = %execution_id,
                    waves = state.waves,
                    "Execution completed"
                );
                return Ok(());
            }

            if self.executions.is_cancelled(execution_id).await? {
                info!(execution_id = %execution_id, waves = state.waves, "Execution cancelled; stopping");
                return Ok(());
            }

            let wave = state.ready(workflow);
            if wave.is_empty() {
                let blocked: Vec<&str> = workflow
                    .steps
                    .iter()
                    .filter(|s| !state.completed.contains(&s.id))
                    .map(|s| s.id.as_str())
                    .collect();
                let message = format!("no runnable steps; blocked: {}", blocked.join(", "));
                error!(execution_id = %execution_id, blocked = ?blocked, "Execution deadlocked");
                self.abort(execution_id, ErrorKind::Deadlock, message).await;
                return Ok(());
            }

            state.waves += 1;
            let step_ids: Vec<&str> = wave.iter().map(|s| s.id.as_str()).collect();
            debug!(execution_id = %execution_id, wave = state.waves, steps = ?step_ids, "Dispatching wave");

            let shared = Arc::new(state.results.clone());
            let handles: Vec<JoinHandle<StepOutcome>> = wave
                .iter()
                .map(|step| self.dispatch(step, Arc::clone(&shared), Arc::clone(&agents)))
                .collect();

            let mut outcomes = Vec::with_capacity(handles.len());
            for handle in handles {
                outcomes.push(
                    handle
                        .await
                        .unwrap_or_else(|e| Err(StepError::Execution(format!("step task aborted: {}", e)))),
                );
            }

            let wave_label = format!("Wave {}: {}", state.waves, step_ids.join(", "));
            let applied = self
                .executions
                .update(execution_id, |execution| {
                    execution.logs.push_back(LogEntry::new(LogLevel::Debug, wave_label, None));
                    state.apply_wave(execution, &wave, outcomes, on_exhausted)
                })
                .await;

            match applied {
                Ok(Flow::Proceed) => {}
                Ok(Flow::Halt) => {
                    info!(execution_id = %execution_id, waves = state.waves, "Execution failed");
                    return Ok(());
                }
                Err(e) => return self.stop_if_cancelled(execution_id, e).await,
            }
        }
    }

    /// Spawns one step bounded by its timeout.
    fn dispatch(
        &self,
        step: &Step,
        results: Arc<Variables>,
        agents: Arc<AgentSnapshot>,
    ) -> JoinHandle<StepOutcome> {
        let executor = Arc::clone(&self.executor);
        let kind = step.kind.clone();
        let step_id = step.id.clone();
        let bound = step.timeout(self.config.default_step_timeout());

        tokio::spawn(async move {
            debug!(step_id = %step_id, kind = kind.name(), timeout_ms = bound.as_millis() as u64, "Running step");
            match tokio::time::timeout(bound, executor.execute(&kind, &results, &agents)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StepError::Timeout(TimeoutBound(bound))),
            }
        })
    }

    /// Records a run-level error and fails the execution.
    async fn abort(&self, execution_id: &str, kind: ErrorKind, message: String) {
        let outcome = self
            .executions
            .update(execution_id, |execution| {
                execution.errors.push(ErrorEntry::new(None, kind, message.clone()));
                execution.logs.push_back(LogEntry::new(LogLevel::Error, message, None));
                transition_record(execution, ExecutionStatus::Failed)
            })
            .await;
        if let Err(e) = outcome.and_then(|inner| inner) {
            warn!(execution_id = %execution_id, error = %e, "Could not fail execution");
        }
    }

    /// A write rejected because the run was cancelled ends the loop quietly;
    /// any other failure is returned.
    async fn stop_if_cancelled(&self, execution_id: &str, err: CoreError) -> Result<()> {
        if matches!(err, CoreError::Conflict(_)) && self.executions.is_cancelled(execution_id).await? {
            info!(execution_id = %execution_id, "Execution cancelled; discarding in-flight results");
            return Ok(());
        }
        Err(err)
    }
}
