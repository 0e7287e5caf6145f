//! Integration tests for the coordinator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use weft_core::{Agent, AgentRegistry};
use weft_models::ScriptedGenerator;
use weft_orchestrator::{
    ConflictResolution, Coordinator, Orchestration, OrchestrationError, OrchestrationStore,
    StrategyKind,
};

struct Fixture {
    coordinator: Coordinator,
    registry: Arc<AgentRegistry>,
    generator: Arc<ScriptedGenerator>,
}

impl Fixture {
    fn new(generator: ScriptedGenerator) -> Self {
        let generator = Arc::new(generator);
        let registry = Arc::new(AgentRegistry::new(generator.clone()));
        let coordinator =
            Coordinator::new(Arc::new(OrchestrationStore::new()), registry.clone(), generator.clone());
        Self { coordinator, registry, generator }
    }

    async fn agent(&self, id: &str, model: &str) {
        self.registry.create(Agent::new(id, id, model)).await.unwrap();
    }

    async fn orchestration(&self, orchestration: Orchestration) {
        self.coordinator.store().create(orchestration).await.unwrap();
    }
}

#[tokio::test]
async fn test_sequential_passes_results_forward() {
    let fx = Fixture::new(
        ScriptedGenerator::new().reply("m-research", "facts").reply("m-write", "essay"),
    );
    fx.agent("researcher", "m-research").await;
    fx.agent("writer", "m-write").await;
    fx.orchestration(Orchestration::new("essay", "Essay", ["researcher", "writer"])).await;

    let outcome = fx.coordinator.run("essay", "Topic: tides").await.unwrap();

    assert_eq!(outcome.executed_strategy, StrategyKind::Sequential);
    assert_eq!(outcome.outputs["researcher"], json!("facts"));
    assert_eq!(outcome.outputs["writer"], json!("essay"));

    let calls = fx.generator.calls();
    assert_eq!(calls[0].prompt, "Topic: tides");
    assert!(calls[1].prompt.starts_with("Topic: tides"));
    assert!(calls[1].prompt.contains("[researcher]\nfacts"));
}

#[tokio::test]
async fn test_parallel_runs_agents_concurrently() {
    let delay = Duration::from_millis(200);
    let fx = Fixture::new(
        ScriptedGenerator::new()
            .reply_after("m-a", "alpha", delay)
            .reply_after("m-b", "beta", delay)
            .reply_after("m-c", "gamma", delay),
    );
    fx.agent("a", "m-a").await;
    fx.agent("b", "m-b").await;
    fx.agent("c", "m-c").await;
    fx.orchestration(
        Orchestration::new("fan", "Fan out", ["a", "b", "c"]).with_strategy(StrategyKind::Parallel),
    )
    .await;

    let started = Instant::now();
    let outcome = fx.coordinator.run("fan", "same question").await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < delay * 2, "parallel run took {:?}", elapsed);
    assert_eq!(outcome.outputs.len(), 3);
    assert_eq!(outcome.outputs["b"], json!("beta"));
    assert!(fx.generator.calls().iter().all(|c| c.prompt == "same question"));
}

#[tokio::test]
async fn test_adaptive_reports_executed_strategy() {
    let fx = Fixture::new(ScriptedGenerator::new().echo_unscripted());
    fx.agent("a", "m-a").await;
    fx.orchestration(
        Orchestration::new("auto", "Auto", ["a"]).with_strategy(StrategyKind::Adaptive),
    )
    .await;

    let outcome = fx.coordinator.run("auto", "hello").await.unwrap();
    assert_eq!(outcome.strategy, StrategyKind::Adaptive);
    assert_eq!(outcome.executed_strategy, StrategyKind::Sequential);
    assert_eq!(outcome.outputs["a"], json!("hello"));
}

#[tokio::test]
async fn test_repeated_agent_is_merged_by_policy() {
    let fx = Fixture::new(ScriptedGenerator::new().reply("m-w", "pass").reply("m-c", "notes"));
    fx.agent("writer", "m-w").await;
    fx.agent("critic", "m-c").await;
    fx.orchestration(
        Orchestration::new("loop", "Revise", ["writer", "critic", "writer"])
            .with_conflict_resolution(ConflictResolution::Concatenate),
    )
    .await;

    let outcome = fx.coordinator.run("loop", "draft it").await.unwrap();
    assert_eq!(outcome.contributions.len(), 3);
    assert_eq!(outcome.outputs.len(), 2);
    assert_eq!(outcome.outputs["writer"], json!("pass\n\npass"));
}

#[tokio::test]
async fn test_unknown_agent_fails_before_any_call() {
    let fx = Fixture::new(ScriptedGenerator::new().echo_unscripted());
    fx.agent("a", "m-a").await;
    fx.orchestration(Orchestration::new("broken", "Broken", ["a", "ghost"])).await;

    let err = fx.coordinator.run("broken", "hi").await.unwrap_err();
    assert!(matches!(err, OrchestrationError::NotFound(msg) if msg.contains("ghost")));
    assert!(fx.generator.calls().is_empty());
}

#[tokio::test]
async fn test_inactive_agent_is_rejected() {
    let fx = Fixture::new(ScriptedGenerator::new().echo_unscripted());
    let mut sleeper = Agent::new("sleeper", "Sleeper", "m-s");
    sleeper.active = false;
    fx.registry.create(sleeper).await.unwrap();
    fx.orchestration(Orchestration::new("nap", "Nap", ["sleeper"])).await;

    let err = fx.coordinator.run("nap", "hi").await.unwrap_err();
    assert!(matches!(err, OrchestrationError::InactiveAgent(id) if id == "sleeper"));
}

#[tokio::test]
async fn test_unknown_orchestration() {
    let fx = Fixture::new(ScriptedGenerator::new());
    let err = fx.coordinator.run("nope", "hi").await.unwrap_err();
    assert!(matches!(err, OrchestrationError::NotFound(_)));
}
