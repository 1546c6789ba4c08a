//! Health synthesis for composed envelopes.

use serde_json::{json, Map, Value};

use crate::agents::aggregator::{AgentIndex, Synthesizer};
use crate::task::{ResultEnvelope, Task};

const DEFAULT_HEALTH_SCORE: f64 = 75.0;

/// Surfaces the executors' results as one weekly health view.
pub struct HealthSynthesizer;

fn field<'a>(by_agent: &AgentIndex<'a>, agent: &str, key: &str) -> Option<&'a Value> {
    by_agent.get(agent).copied().and_then(|envelope| envelope.get(key))
}

fn first_n(value: Option<&Value>, n: usize) -> Value {
    let items = value
        .and_then(Value::as_array)
        .map(|items| items.iter().take(n).cloned().collect::<Vec<_>>())
        .unwrap_or_default();
    Value::Array(items)
}

impl Synthesizer for HealthSynthesizer {
    fn agent_name(&self) -> &str {
        "HealthAggregator"
    }

    fn synthesize(
        &self,
        by_agent: &AgentIndex<'_>,
        _results: &[ResultEnvelope],
        _original: &Task,
    ) -> Map<String, Value> {
        let empty = json!({});
        let validation = field(by_agent, "DataIngestionAgent", "ai_validation").unwrap_or(&empty);
        let coaching = field(by_agent, "CoachingAgent", "coaching_result").unwrap_or(&empty);
        let report = field(by_agent, "ReportingAgent", "report_result").unwrap_or(&empty);
        let health_score = field(by_agent, "MetricsAnalysisAgent", "health_score")
            .cloned()
            .unwrap_or_else(|| json!(DEFAULT_HEALTH_SCORE));

        let agent_execution: Map<String, Value> = by_agent
            .iter()
            .map(|(name, envelope)| (name.to_string(), json!(envelope.ok())))
            .collect();

        let mut out = Map::new();
        out.insert(
            "validated_data".into(),
            json!({
                "profile": field(by_agent, "DataIngestionAgent", "normalized_data").cloned().unwrap_or_else(|| json!({})),
                "quality_score": validation.get("data_quality_score").cloned().unwrap_or_else(|| json!(75)),
                "warnings": validation.get("health_flags").cloned().unwrap_or_else(|| json!([])),
            }),
        );
        out.insert(
            "health_metrics".into(),
            field(by_agent, "MetricsAnalysisAgent", "metrics_summary")
                .cloned()
                .unwrap_or_else(|| json!({})),
        );
        out.insert("health_score".into(), health_score.clone());
        out.insert(
            "ai_insights".into(),
            field(by_agent, "MetricsAnalysisAgent", "ai_analysis")
                .cloned()
                .unwrap_or_else(|| json!({})),
        );
        out.insert("coaching_recommendations".into(), coaching.clone());
        out.insert("comprehensive_report".into(), report.clone());
        out.insert(
            "summary".into(),
            json!({
                "health_score": health_score,
                "status": "Analysis completed with multi-agent coordination",
                "top_recommendations": first_n(coaching.get("key_recommendations"), 3),
                "next_actions": first_n(report.pointer("/next_week_plan/daily_actions"), 3),
            }),
        );
        out.insert("agent_execution".into(), Value::Object(agent_execution));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Aggregator;
    use crate::task::TaskRequest;

    fn envelope(agent: &str, payload: Value) -> ResultEnvelope {
        let Value::Object(map) = payload else {
            panic!("payload must be an object");
        };
        ResultEnvelope::success(agent, map)
    }

    #[test]
    fn test_health_view_from_all_agents() {
        let results = vec![
            envelope(
                "DataIngestionAgent",
                json!({"normalized_data": {"steps": 1}, "ai_validation": {"data_quality_score": 90, "health_flags": ["low water"]}}),
            ),
            envelope("MetricsAnalysisAgent", json!({"health_score": 42.1, "metrics_summary": {"steps": 1}})),
            envelope(
                "CoachingAgent",
                json!({"coaching_result": {"key_recommendations": ["a", "b", "c", "d"]}}),
            ),
            ResultEnvelope::failure("ReportingAgent", "boom"),
        ];
        let task = Task::root(TaskRequest::new("comprehensive_health_analysis", "", json!({})));
        let composed =
            Aggregator::with_synthesizer(Box::new(HealthSynthesizer)).combine(&results, &task);

        assert!(composed.ok());
        assert_eq!(composed.agent(), "HealthAggregator");
        assert_eq!(composed.get("health_score").unwrap(), 42.1);
        assert_eq!(composed.get("validated_data").unwrap()["quality_score"], 90);
        assert_eq!(composed.get("validated_data").unwrap()["warnings"][0], "low water");
        let summary = composed.get("summary").unwrap();
        assert_eq!(summary["top_recommendations"], json!(["a", "b", "c"]));
        assert_eq!(summary["next_actions"], json!([]));
        assert_eq!(composed.get("agent_execution").unwrap()["ReportingAgent"], false);
    }

    #[test]
    fn test_defaults_without_metrics() {
        let results = vec![envelope("CoachingAgent", json!({}))];
        let task = Task::root(TaskRequest::new("x", "", json!({})));
        let composed =
            Aggregator::with_synthesizer(Box::new(HealthSynthesizer)).combine(&results, &task);
        assert_eq!(composed.get("health_score").unwrap(), 75.0);
        assert_eq!(composed.get("validated_data").unwrap()["quality_score"], 75);
    }
}
