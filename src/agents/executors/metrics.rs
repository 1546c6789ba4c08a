//! Metrics analysis - weekly scores from the raw inputs.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::{narrate, round1, HealthInputs};
use crate::agents::{AtomicExecutor, ExecutorError, ExecutorPayload, SolveContext};
use crate::provider::{AtomicRequest, CapabilityProvider};
use crate::task::Task;

const INSTRUCTIONS: &str = "You are a health metrics analyst. Provide data-driven insights about:
1. Performance against health targets
2. Patterns and trends in the data
3. Areas of strength and improvement
4. Risk factors or concerning patterns
5. Actionable metrics-based recommendations

Focus on objective analysis, avoid medical advice.";

const RESPONSE_SCHEMA: &str = r#"{
  "performance_analysis": "detailed assessment",
  "key_insights": ["insight"],
  "strengths": ["strength"],
  "improvement_areas": ["area"],
  "trend_analysis": "patterns observed",
  "risk_factors": ["risk"],
  "next_week_targets": {"metric": 0}
}"#;

const WEEKLY_STEP_TARGET: f64 = 10_000.0;
const WEEKLY_WATER_TARGET: f64 = 14.0;
const WEEKLY_SLEEP_TARGET: f64 = 56.0;
const WORKOUT_POINTS: f64 = 15.0;

/// Weekly scores, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    pub activity: f64,
    pub hydration: f64,
    pub sleep: f64,
    pub overall: f64,
}

impl Scores {
    fn rounded(self) -> Self {
        Self {
            activity: round1(self.activity),
            hydration: round1(self.hydration),
            sleep: round1(self.sleep),
            overall: round1(self.overall),
        }
    }
}

/// Unrounded scores for a week of inputs.
pub fn compute_scores(inputs: HealthInputs) -> Scores {
    let activity = (inputs.steps as f64 / WEEKLY_STEP_TARGET * 100.0
        + inputs.workouts as f64 * WORKOUT_POINTS)
        .clamp(0.0, 100.0);
    let hydration = (inputs.water_liters / WEEKLY_WATER_TARGET * 100.0).clamp(0.0, 100.0);
    let sleep = (inputs.sleep_hours / WEEKLY_SLEEP_TARGET * 100.0).clamp(0.0, 100.0);

    Scores {
        activity,
        hydration,
        sleep,
        overall: (activity + hydration + sleep) / 3.0,
    }
}

pub struct MetricsExecutor;

impl MetricsExecutor {
    fn summary(inputs: HealthInputs, scores: Scores) -> Value {
        let mut summary = inputs.to_value();
        summary["scores"] = json!(scores.rounded());
        summary["weekly_averages"] = json!({
            "daily_steps": (inputs.steps as f64 / 7.0).round(),
            "daily_sleep": round1(inputs.sleep_hours / 7.0),
            "daily_water": round1(inputs.water_liters / 7.0),
        });
        summary
    }

    fn default_analysis(overall: f64) -> Value {
        json!({
            "performance_analysis": "Metrics calculated successfully",
            "key_insights": ["Activity and sleep data processed", "Hydration levels tracked"],
            "strengths": ["Consistent data tracking"],
            "improvement_areas": ["Focus on target achievement"],
            "trend_analysis": "Baseline established for future comparison",
            "risk_factors": [],
            "next_week_targets": {"overall_score": round1((overall + 5.0).min(100.0))},
        })
    }
}

#[async_trait]
impl AtomicExecutor for MetricsExecutor {
    fn kind(&self) -> &'static str {
        "metrics"
    }

    fn agent_name(&self) -> &'static str {
        "MetricsAnalysisAgent"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["MetricsAnalysisAgent"]
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["metric", "calculat", "score", "analysis"]
    }

    async fn execute(
        &self,
        task: &Task,
        provider: &dyn CapabilityProvider,
        scope: &SolveContext,
    ) -> Result<ExecutorPayload, ExecutorError> {
        let inputs = HealthInputs::from_data(task.data());
        let scores = compute_scores(inputs);
        let summary = Self::summary(inputs, scores);

        let request = AtomicRequest {
            kind: self.kind(),
            task,
            instructions: INSTRUCTIONS,
            context: &summary,
            response_schema: RESPONSE_SCHEMA,
        };
        let (analysis, source) =
            narrate(provider, scope, request, || Self::default_analysis(scores.overall)).await;

        let mut payload = ExecutorPayload::new();
        payload.insert("metrics_summary".into(), summary);
        payload.insert("ai_analysis".into(), analysis);
        payload.insert("health_score".into(), json!(round1(scores.overall)));
        payload.insert("narrative_source".into(), json!(source.as_str()));
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedProvider;
    use crate::task::TaskRequest;
    use std::time::Duration;

    fn inputs(steps: i64, sleep_hours: f64, workouts: i64, water_liters: f64) -> HealthInputs {
        HealthInputs {
            steps,
            sleep_hours,
            workouts,
            water_liters,
        }
    }

    #[test]
    fn test_scores_for_a_typical_week() {
        let scores = compute_scores(inputs(8000, 7.5, 1, 2.5)).rounded();
        assert_eq!(scores.activity, 95.0);
        assert_eq!(scores.hydration, 17.9);
        assert_eq!(scores.sleep, 13.4);
        assert_eq!(scores.overall, 42.1);
    }

    #[test]
    fn test_scores_are_capped() {
        let scores = compute_scores(inputs(70_000, 80.0, 7, 20.0));
        assert_eq!(scores.activity, 100.0);
        assert_eq!(scores.hydration, 100.0);
        assert_eq!(scores.sleep, 100.0);
        assert_eq!(scores.overall, 100.0);

        let empty = compute_scores(HealthInputs::default());
        assert_eq!(empty.overall, 0.0);
    }

    #[tokio::test]
    async fn test_payload_without_provider() {
        let task = Task::root(TaskRequest::new(
            "metrics",
            "",
            json!({"steps": 70000, "sleep_hours": 49, "workouts": 3, "water_liters": 14}),
        ));
        let payload = MetricsExecutor
            .execute(
                &task,
                &ScriptedProvider::failing(),
                &SolveContext::unbounded(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        assert_eq!(payload["health_score"], 95.8);
        assert_eq!(payload["metrics_summary"]["weekly_averages"]["daily_steps"], 10000.0);
        assert_eq!(payload["metrics_summary"]["scores"]["sleep"], 87.5);
        assert_eq!(payload["ai_analysis"]["next_week_targets"]["overall_score"], 100.0);
    }
}
