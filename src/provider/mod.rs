//! Capability provider - the engine's only window onto text generation.
//!
//! The core asks a provider three things: is this task atomic, how should it
//! be split, and what narrative belongs with an atomic result. Every call may
//! fail; callers always have a local fallback.
//!
//! # Implementations
//! - **LlmCapabilityProvider**: prompts an `LlmClient` and parses JSON replies
//! - **OfflineProvider**: fails every call, so only local logic runs

mod llm;

#[cfg(test)]
pub(crate) mod testing;

pub use llm::LlmCapabilityProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::task::{DataShape, RawPlan, Task};

/// Errors from a capability provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Capability provider unavailable: {0}")]
    Unavailable(String),

    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Provider call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Provider call cancelled")]
    Cancelled,
}

/// Answer to "can this task run on a single executor?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicityJudgment {
    pub is_atomic: bool,
    #[serde(default = "default_reasoning")]
    pub reasoning: String,
}

fn default_reasoning() -> String {
    "No reasoning provided".to_string()
}

/// One atomic-execution call, built by an executor.
///
/// `instructions` describes the executor's role; `context` is the locally
/// computed data the provider should narrate; `response_schema` shows the
/// JSON object the executor knows how to read back.
#[derive(Debug, Clone, Copy)]
pub struct AtomicRequest<'a> {
    pub kind: &'a str,
    pub task: &'a Task,
    pub instructions: &'a str,
    pub context: &'a Value,
    pub response_schema: &'a str,
}

/// Narrow interface the engine consumes.
///
/// # Postconditions
/// - Implementations never panic on malformed upstream output; they return
///   `ProviderError::Malformed` instead.
/// - Timeouts and cancellation are enforced by the caller.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Judge whether a task should run atomically.
    async fn judge_atomicity(
        &self,
        description: &str,
        shape: &DataShape,
    ) -> Result<AtomicityJudgment, ProviderError>;

    /// Produce a raw, unnormalized decomposition plan.
    async fn generate_plan(&self, description: &str, data: &Value)
        -> Result<RawPlan, ProviderError>;

    /// Produce the narrative payload for an atomic task.
    async fn execute_atomic(&self, request: AtomicRequest<'_>) -> Result<Value, ProviderError>;

    /// Short name for logs and system info.
    fn name(&self) -> &str;
}

/// Provider used when no LLM is configured. Every call fails closed.
#[derive(Debug, Default, Clone)]
pub struct OfflineProvider;

#[async_trait]
impl CapabilityProvider for OfflineProvider {
    async fn judge_atomicity(
        &self,
        _description: &str,
        _shape: &DataShape,
    ) -> Result<AtomicityJudgment, ProviderError> {
        Err(ProviderError::Unavailable("offline".to_string()))
    }

    async fn generate_plan(
        &self,
        _description: &str,
        _data: &Value,
    ) -> Result<RawPlan, ProviderError> {
        Err(ProviderError::Unavailable("offline".to_string()))
    }

    async fn execute_atomic(&self, _request: AtomicRequest<'_>) -> Result<Value, ProviderError> {
        Err(ProviderError::Unavailable("offline".to_string()))
    }

    fn name(&self) -> &str {
        "offline"
    }
}

/// Pull the first JSON object out of a model reply.
///
/// Models often wrap JSON in ```json fences or add a sentence around it.
pub(crate) fn extract_json_object(text: &str) -> Result<Value, ProviderError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return object_or_malformed(value, trimmed);
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.rsplit_once("```").map(|(body, _)| body))
        .map(str::trim);
    if let Some(body) = unfenced {
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            return object_or_malformed(value, body);
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            let candidate = &trimmed[start..=end];
            serde_json::from_str::<Value>(candidate)
                .map_err(|e| ProviderError::Malformed(format!("{}: {}", e, preview(candidate))))
                .and_then(|value| object_or_malformed(value, candidate))
        }
        _ => Err(ProviderError::Malformed(format!(
            "no JSON object in reply: {}",
            preview(trimmed)
        ))),
    }
}

fn object_or_malformed(value: Value, raw: &str) -> Result<Value, ProviderError> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(ProviderError::Malformed(format!(
            "expected a JSON object, got: {}",
            preview(raw)
        )))
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskRequest};
    use serde_json::json;

    #[test]
    fn test_extract_plain_and_fenced_json() {
        assert_eq!(extract_json_object(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        let fenced = "```json\n{\"is_atomic\": true}\n```";
        assert_eq!(
            extract_json_object(fenced).unwrap(),
            json!({"is_atomic": true})
        );
        let chatty = "Sure! Here it is: {\"x\": [1, 2]} Hope that helps.";
        assert_eq!(extract_json_object(chatty).unwrap(), json!({"x": [1, 2]}));
    }

    #[test]
    fn test_extract_rejects_non_objects() {
        assert!(matches!(
            extract_json_object("[1, 2, 3]"),
            Err(ProviderError::Malformed(_))
        ));
        assert!(matches!(
            extract_json_object("no json here"),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_judgment_reasoning_defaults() {
        let judgment: AtomicityJudgment =
            serde_json::from_value(json!({"is_atomic": false})).unwrap();
        assert!(!judgment.is_atomic);
        assert_eq!(judgment.reasoning, "No reasoning provided");
    }

    #[tokio::test]
    async fn test_offline_provider_fails_closed() {
        let provider = OfflineProvider;
        let task = Task::root(TaskRequest::new("ingest", "anything", json!({})));
        let request = AtomicRequest {
            kind: "ingest",
            task: &task,
            instructions: "",
            context: &json!({}),
            response_schema: "{}",
        };
        assert!(provider.execute_atomic(request).await.is_err());
        assert!(provider.generate_plan("x", &json!({})).await.is_err());
        assert!(provider
            .judge_atomicity("x", &task.data_shape())
            .await
            .is_err());
    }
}
