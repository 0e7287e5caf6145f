//! Programmable text generator.
//!
//! `ScriptedGenerator` answers from a table of canned replies keyed by model
//! id or by a prompt substring. Replies can be delayed or preceded by a
//! number of failures, which makes it the workhorse for exercising retry,
//! timeout and concurrency behavior without a real provider.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use weft_abstraction::{GenerationOptions, ServiceError, TextGenerator};

/// A single recorded `generate` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Model the call was addressed to.
    pub model_id: String,
    /// Prompt text after rendering.
    pub prompt: String,
    /// Options passed along with the prompt.
    pub options: GenerationOptions,
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(ServiceError),
}

#[derive(Debug, Clone)]
struct Script {
    reply: Reply,
    delay: Option<Duration>,
    fail_first: usize,
}

impl Script {
    fn text(text: impl Into<String>) -> Self {
        Self { reply: Reply::Text(text.into()), delay: None, fail_first: 0 }
    }
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<RecordedCall>,
    attempts: HashMap<String, usize>,
}

/// Text generator with canned, programmable replies.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    by_model: HashMap<String, Script>,
    by_prompt: Vec<(String, Script)>,
    echo_unscripted: bool,
    state: Mutex<State>,
}

impl ScriptedGenerator {
    /// Creates an empty generator. Unscripted models fail with
    /// `ServiceError::UnsupportedModel`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies with `text` for every call to `model_id`.
    #[must_use]
    pub fn reply(mut self, model_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.by_model.insert(model_id.into(), Script::text(text));
        self
    }

    /// Replies with `text` for `model_id` after sleeping for `delay`.
    #[must_use]
    pub fn reply_after(
        mut self,
        model_id: impl Into<String>,
        text: impl Into<String>,
        delay: Duration,
    ) -> Self {
        let mut script = Script::text(text);
        script.delay = Some(delay);
        self.by_model.insert(model_id.into(), script);
        self
    }

    /// Always fails calls to `model_id` with `error`.
    #[must_use]
    pub fn fail(mut self, model_id: impl Into<String>, error: ServiceError) -> Self {
        self.by_model
            .insert(model_id.into(), Script { reply: Reply::Fail(error), delay: None, fail_first: 0 });
        self
    }

    /// Makes the first `count` calls to `model_id` fail before its scripted
    /// reply is returned.
    #[must_use]
    pub fn fail_first(mut self, model_id: impl Into<String>, count: usize) -> Self {
        self.by_model.entry(model_id.into()).or_insert_with(|| Script::text("")).fail_first = count;
        self
    }

    /// Replies with `text` when the prompt contains `needle` and the model has
    /// no script of its own. Rules are checked in insertion order.
    #[must_use]
    pub fn reply_to_prompt(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.by_prompt.push((needle.into(), Script::text(text)));
        self
    }

    /// Echoes the prompt for calls that match no script.
    #[must_use]
    pub fn echo_unscripted(mut self) -> Self {
        self.echo_unscripted = true;
        self
    }

    /// Returns every call made so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Returns how many calls were addressed to `model_id`.
    pub fn call_count(&self, model_id: &str) -> usize {
        self.state.lock().map(|s| s.attempts.get(model_id).copied().unwrap_or(0)).unwrap_or(0)
    }

    fn lookup(&self, model_id: &str, prompt: &str) -> Option<&Script> {
        self.by_model.get(model_id).or_else(|| {
            self.by_prompt
                .iter()
                .find(|(needle, _)| prompt.contains(needle.as_str()))
                .map(|(_, script)| script)
        })
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ServiceError> {
        let attempt = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| ServiceError::Other("scripted generator state poisoned".to_string()))?;
            state.calls.push(RecordedCall {
                model_id: model_id.to_string(),
                prompt: prompt.to_string(),
                options: options.clone(),
            });
            let attempts = state.attempts.entry(model_id.to_string()).or_insert(0);
            *attempts += 1;
            *attempts
        };

        debug!(model_id = %model_id, attempt, "ScriptedGenerator generating text");

        let Some(script) = self.lookup(model_id, prompt) else {
            if self.echo_unscripted {
                return Ok(prompt.to_string());
            }
            return Err(ServiceError::UnsupportedModel(model_id.to_string()));
        };

        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }

        if attempt <= script.fail_first {
            return Err(ServiceError::Other(format!(
                "scripted failure {} of {} for {}",
                attempt, script.fail_first, model_id
            )));
        }

        match &script.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail(error) => Err(error.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_by_model() {
        let generator = ScriptedGenerator::new().reply("m1", "one");
        let text = generator.generate("m1", "anything", &GenerationOptions::default()).await.unwrap();
        assert_eq!(text, "one");
        assert_eq!(generator.call_count("m1"), 1);
    }

    #[tokio::test]
    async fn test_reply_by_prompt() {
        let generator = ScriptedGenerator::new().reply_to_prompt("summarize", "short");
        let text = generator
            .generate("any", "please summarize this", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "short");
    }

    #[tokio::test]
    async fn test_unscripted_model_fails() {
        let generator = ScriptedGenerator::new();
        let err = generator.generate("m1", "hi", &GenerationOptions::default()).await.unwrap_err();
        assert_eq!(err, ServiceError::UnsupportedModel("m1".to_string()));

        let echo = ScriptedGenerator::new().echo_unscripted();
        assert_eq!(echo.generate("m1", "hi", &GenerationOptions::default()).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_fail_first_then_succeed() {
        let generator = ScriptedGenerator::new().reply("m1", "ok").fail_first("m1", 2);
        let options = GenerationOptions::default();
        assert!(generator.generate("m1", "p", &options).await.is_err());
        assert!(generator.generate("m1", "p", &options).await.is_err());
        assert_eq!(generator.generate("m1", "p", &options).await.unwrap(), "ok");
        assert_eq!(generator.call_count("m1"), 3);
    }

    #[tokio::test]
    async fn test_records_calls() {
        let generator = ScriptedGenerator::new().reply("m1", "ok");
        let options = GenerationOptions::default().with_system_instructions("sys");
        generator.generate("m1", "prompt", &options).await.unwrap();

        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt, "prompt");
        assert_eq!(calls[0].options.system_instructions.as_deref(), Some("sys"));
    }
}
