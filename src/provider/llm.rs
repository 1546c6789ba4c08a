//! LLM-backed capability provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    extract_json_object, AtomicRequest, AtomicityJudgment, CapabilityProvider, ProviderError,
};
use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use crate::task::{DataShape, RawPlan};

const ATOMIZER_SYSTEM_PROMPT: &str = r#"You are the Atomizer in a hierarchical task-decomposition engine.

Determine if a task is ATOMIC (one executor can handle it) or COMPLEX (it needs decomposition).

ATOMIC tasks:
- Simple data validation
- Basic metric calculation
- Single-domain analysis
- Direct coaching questions

COMPLEX tasks:
- Multi-domain analysis
- Cross-metric correlations
- Comprehensive reporting
- Multi-step reasoning

Respond with JSON only: {"is_atomic": boolean, "reasoning": "explanation"}"#;

const PLANNER_SYSTEM_PROMPT: &str = r#"You are the Planner in a hierarchical task-decomposition engine.

Break complex tasks into executable subtasks with proper dependencies.

Available executors:
- ingest: validates and normalizes input data
- metrics: computes scores and adherence
- coach: provides personalized recommendations
- report: creates comprehensive reports

Respond with JSON only: {"subtasks": [{"id": "unique_id", "kind": "executor", "description": "what to do", "depends_on": ["ids"], "priority": 1-5}], "reasoning": "explanation"}"#;

/// Capability provider that prompts an `LlmClient`.
pub struct LlmCapabilityProvider {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl LlmCapabilityProvider {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one system+user exchange and parse the reply as a JSON object.
    async fn ask_json(
        &self,
        system: &str,
        user: String,
        temperature: f64,
    ) -> Result<Value, ProviderError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let options = ChatOptions {
            temperature: Some(temperature),
            max_tokens: Some(2_000),
        };

        let response = self
            .llm
            .chat_completion_with_options(&self.model, &messages, options)
            .await
            .map_err(|e| ProviderError::Llm(e.to_string()))?;

        let content = response
            .content
            .ok_or_else(|| ProviderError::Malformed("empty reply".to_string()))?;
        extract_json_object(&content)
    }
}

#[async_trait]
impl CapabilityProvider for LlmCapabilityProvider {
    async fn judge_atomicity(
        &self,
        description: &str,
        shape: &DataShape,
    ) -> Result<AtomicityJudgment, ProviderError> {
        let keys = match &shape.keys {
            Some(keys) => format!("{:?}", keys),
            None => "non-object".to_string(),
        };
        let prompt = format!(
            "Analyze this task for atomicity:\n\nTask: {}\nData size: {} chars\nData keys: {}\n\nIs this atomic (single executor) or complex (needs decomposition)?",
            description, shape.size_chars, keys
        );

        let value = self.ask_json(ATOMIZER_SYSTEM_PROMPT, prompt, 0.0).await?;
        serde_json::from_value(value).map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn generate_plan(
        &self,
        description: &str,
        data: &Value,
    ) -> Result<RawPlan, ProviderError> {
        let data_text = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        let prompt = format!(
            "Create an execution plan for this complex task:\n\nTask: {}\nData: {}\n\nBreak this into subtasks that specialized executors can handle.\nConsider dependencies: data before metrics, metrics before coaching.",
            description, data_text
        );

        let value = self.ask_json(PLANNER_SYSTEM_PROMPT, prompt, 0.2).await?;
        if !value.get("subtasks").map(Value::is_array).unwrap_or(false) {
            return Err(ProviderError::Malformed(
                "plan has no subtasks array".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn execute_atomic(&self, request: AtomicRequest<'_>) -> Result<Value, ProviderError> {
        let context = serde_json::to_string_pretty(request.context)
            .unwrap_or_else(|_| request.context.to_string());
        let prompt = format!(
            "Task: {}\n\nInput:\n{}\n\nRespond with JSON only, shaped like:\n{}",
            request.task.label(),
            context,
            request.response_schema
        );

        tracing::debug!(
            component = "provider",
            kind = request.kind,
            depth = request.task.depth(),
            "Requesting atomic narrative"
        );
        self.ask_json(request.instructions, prompt, 0.7).await
    }

    fn name(&self) -> &str {
        "llm"
    }
}
