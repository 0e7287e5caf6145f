//! Shared test utilities for Weft Core integration tests.
//!
//! Builds an engine wired to a `ScriptedGenerator` and a stub API caller so
//! tests control every reply, delay and failure.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use weft_abstraction::{ApiCaller, ApiRequest, ServiceError, TextGenerator};
use weft_core::{
    Agent, AgentRegistry, EngineConfig, ExecutionEngine, ExecutionStore, Step, StepExecutor, StepKind,
    Variables, Workflow, WorkflowStore,
};
use weft_models::ScriptedGenerator;

/// Answers every request with its method and URL; URLs containing `fail`
/// get a 502.
pub struct StubApi;

#[async_trait]
impl ApiCaller for StubApi {
    async fn call(&self, request: &ApiRequest) -> Result<Value, ServiceError> {
        if request.url.contains("fail") {
            return Err(ServiceError::Response { status: 502, body: "bad gateway".to_string() });
        }
        Ok(json!({"method": request.method.to_string(), "url": request.url}))
    }
}

/// An engine plus handles to its collaborators.
pub struct Harness {
    pub engine: ExecutionEngine,
    pub generator: Arc<ScriptedGenerator>,
}

impl Harness {
    /// Creates a harness with the default engine configuration.
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self::with_config(generator, EngineConfig::default())
    }

    /// Creates a harness with a custom engine configuration.
    pub fn with_config(generator: ScriptedGenerator, config: EngineConfig) -> Self {
        Self::with_store(generator, config, Arc::new(WorkflowStore::new()))
    }

    /// Creates a harness over a caller-supplied workflow store.
    pub fn with_store(generator: ScriptedGenerator, config: EngineConfig, workflows: Arc<WorkflowStore>) -> Self {
        let generator = Arc::new(generator);
        let text: Arc<dyn TextGenerator> = generator.clone();
        let engine = ExecutionEngine::new(
            workflows,
            Arc::new(AgentRegistry::new(Arc::clone(&text))),
            Arc::new(ExecutionStore::new(config.max_log_entries)),
            Arc::new(StepExecutor::new(text, Arc::new(StubApi))),
            config,
        );
        Self { engine, generator }
    }

    /// Registers an agent whose name equals its id.
    pub async fn agent(&self, id: &str, model: &str) {
        self.engine.agents().create(Agent::new(id, id, model)).await.unwrap();
    }

    /// Stores a workflow definition.
    pub async fn workflow(&self, workflow: Workflow) {
        self.engine.workflows().create(workflow).await.unwrap();
    }
}

/// Builds an `ai_agent` step.
pub fn agent_step(id: &str, agent: &str, prompt: &str) -> Step {
    Step::new(id, StepKind::AiAgent { agent: agent.to_string(), prompt: prompt.to_string() })
}

/// Converts a JSON object literal into a variable bag.
pub fn vars(value: Value) -> Variables {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
