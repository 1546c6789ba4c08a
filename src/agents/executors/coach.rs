//! Coaching - personalized recommendations for a user message.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{narrate, HealthInputs};
use crate::agents::{AtomicExecutor, ExecutorError, ExecutorPayload, SolveContext};
use crate::provider::{AtomicRequest, CapabilityProvider};
use crate::task::Task;

const DEFAULT_MESSAGE: &str = "Weekly health coaching";

const INSTRUCTIONS: &str = "You are an expert health and wellness coach. Provide:
1. Personalized, actionable advice
2. Motivational and supportive guidance
3. Specific behavioral recommendations
4. Weekly focus areas and goals
5. Encouraging but realistic expectations

Be warm, professional, and evidence-based. Avoid medical diagnosis.";

const RESPONSE_SCHEMA: &str = r#"{
  "coaching_response": "main response to user",
  "key_recommendations": ["recommendation"],
  "weekly_focus": ["focus"],
  "motivation_message": "encouraging message",
  "specific_actions": ["action"],
  "success_tips": ["tip"],
  "check_in_questions": ["question"]
}"#;

pub struct CoachingExecutor;

impl CoachingExecutor {
    fn default_coaching(message: &str) -> Value {
        json!({
            "coaching_response": format!("Great job tracking your health data! {}", message),
            "key_recommendations": [
                "Stay consistent with tracking",
                "Focus on gradual improvements",
                "Celebrate small wins"
            ],
            "weekly_focus": ["Consistency", "Balance"],
            "motivation_message": "Every step towards better health counts. You're building great habits!",
            "specific_actions": [
                "Track daily metrics",
                "Set realistic weekly goals",
                "Review progress regularly"
            ],
            "success_tips": [
                "Start small and build up",
                "Focus on consistency over perfection"
            ],
            "check_in_questions": [
                "How are you feeling about your progress?",
                "What's working well for you?"
            ],
        })
    }
}

#[async_trait]
impl AtomicExecutor for CoachingExecutor {
    fn kind(&self) -> &'static str {
        "coach"
    }

    fn agent_name(&self) -> &'static str {
        "CoachingAgent"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["CoachingAgent"]
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["coach", "recommend", "advice"]
    }

    async fn execute(
        &self,
        task: &Task,
        provider: &dyn CapabilityProvider,
        scope: &SolveContext,
    ) -> Result<ExecutorPayload, ExecutorError> {
        let message = task
            .data()
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MESSAGE)
            .to_string();

        let context = json!({
            "request": message,
            "health_context": HealthInputs::from_data(task.data()).to_value(),
        });
        let request = AtomicRequest {
            kind: self.kind(),
            task,
            instructions: INSTRUCTIONS,
            context: &context,
            response_schema: RESPONSE_SCHEMA,
        };
        let (coaching, source) =
            narrate(provider, scope, request, || Self::default_coaching(&message)).await;

        let mut payload = ExecutorPayload::new();
        payload.insert("user_request".into(), json!(message));
        payload.insert("coaching_result".into(), coaching);
        payload.insert("narrative_source".into(), json!(source.as_str()));
        Ok(payload)
    }
}
