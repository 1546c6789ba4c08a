//! Reporting - weekly report generation and persistence.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::narrate;
use crate::agents::{AtomicExecutor, ExecutorError, ExecutorPayload, SolveContext};
use crate::provider::{AtomicRequest, CapabilityProvider};
use crate::storage::ReportStore;
use crate::task::Task;

const INSTRUCTIONS: &str = "You are a health report specialist. Create comprehensive reports that:
1. Synthesize all health data into clear insights
2. Provide executive summary of health status
3. Highlight key achievements and areas for improvement
4. Create actionable weekly plans
5. Set realistic goals and milestones

Make reports professional yet accessible.";

const RESPONSE_SCHEMA: &str = r#"{
  "executive_summary": "2-3 sentence overview",
  "week_highlights": ["highlight"],
  "areas_for_improvement": ["area"],
  "health_score_explanation": "why this score",
  "weekly_achievements": ["achievement"],
  "concerns_to_monitor": ["concern"],
  "next_week_plan": {
    "primary_goals": ["goal"],
    "daily_actions": ["action"],
    "success_metrics": ["metric"]
  },
  "long_term_recommendations": ["recommendation"]
}"#;

pub struct ReportExecutor {
    store: Arc<dyn ReportStore>,
    storage_timeout: Duration,
}

impl ReportExecutor {
    pub fn new(store: Arc<dyn ReportStore>, storage_timeout: Duration) -> Self {
        Self {
            store,
            storage_timeout,
        }
    }

    fn default_report() -> Value {
        json!({
            "executive_summary": "Health data tracked successfully for the week with areas for continued focus.",
            "week_highlights": ["Consistent data tracking", "Health awareness maintained"],
            "areas_for_improvement": ["Optimize daily routines", "Focus on consistency"],
            "health_score_explanation": "Score reflects current tracking and baseline establishment",
            "weekly_achievements": ["Data collection completed"],
            "concerns_to_monitor": ["Maintain tracking consistency"],
            "next_week_plan": {
                "primary_goals": ["Continue tracking", "Improve consistency"],
                "daily_actions": ["Log health metrics", "Stay hydrated", "Get adequate sleep"],
                "success_metrics": ["Daily logging", "Target achievement"]
            },
            "long_term_recommendations": [
                "Build sustainable habits",
                "Focus on gradual improvement",
                "Regular progress reviews"
            ],
        })
    }

    /// Best-effort save; a failure or timeout only costs the report id.
    async fn save(&self, record: &Value, scope: &SolveContext) -> Option<i64> {
        let persist = tokio::time::timeout(self.storage_timeout, self.store.persist(record));
        let outcome = tokio::select! {
            biased;
            _ = scope.cancelled() => {
                tracing::warn!(component = "storage", "Report not saved: request cancelled");
                return None;
            }
            outcome = persist => outcome,
        };

        match outcome {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                tracing::warn!(component = "storage", "Failed to save report: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    component = "storage",
                    "Saving report timed out after {:?}",
                    self.storage_timeout
                );
                None
            }
        }
    }
}

#[async_trait]
impl AtomicExecutor for ReportExecutor {
    fn kind(&self) -> &'static str {
        "report"
    }

    fn agent_name(&self) -> &'static str {
        "ReportingAgent"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["ReportingAgent"]
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["report", "summary", "generate"]
    }

    async fn execute(
        &self,
        task: &Task,
        provider: &dyn CapabilityProvider,
        scope: &SolveContext,
    ) -> Result<ExecutorPayload, ExecutorError> {
        let request = AtomicRequest {
            kind: self.kind(),
            task,
            instructions: INSTRUCTIONS,
            context: task.data(),
            response_schema: RESPONSE_SCHEMA,
        };
        let (report, source) = narrate(provider, scope, request, Self::default_report).await;

        let record = json!({
            "input": task.data(),
            "report": report,
        });
        let report_id = self.save(&record, scope).await;

        let mut payload = ExecutorPayload::new();
        payload.insert("report_result".into(), report);
        payload.insert("report_id".into(), json!(report_id));
        payload.insert("generated_at".into(), json!(Utc::now().to_rfc3339()));
        payload.insert("narrative_source".into(), json!(source.as_str()));
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedProvider;
    use crate::storage::{InMemoryReportStore, StorageError, StoredReport};
    use crate::task::TaskRequest;

    struct StuckStore;

    #[async_trait]
    impl ReportStore for StuckStore {
        fn is_persistent(&self) -> bool {
            true
        }

        async fn persist(&self, _payload: &Value) -> Result<Option<i64>, StorageError> {
            std::future::pending().await
        }

        async fn get_report(&self, _id: i64) -> Result<Option<StoredReport>, StorageError> {
            Ok(None)
        }
    }

    fn task() -> Task {
        Task::root(TaskRequest::new("report", "", json!({"steps": 5000})))
    }

    #[tokio::test]
    async fn test_report_is_persisted() {
        let store = Arc::new(InMemoryReportStore::new());
        let executor = ReportExecutor::new(store.clone(), Duration::from_secs(1));
        let payload = executor
            .execute(
                &task(),
                &ScriptedProvider::failing(),
                &SolveContext::unbounded(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        assert_eq!(payload["report_id"], 1);
        let saved = store.get_report(1).await.unwrap().unwrap();
        assert_eq!(saved.payload["input"]["steps"], 5000);
        assert_eq!(
            saved.payload["report"]["next_week_plan"]["daily_actions"][0],
            "Log health metrics"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_storage_does_not_block() {
        let executor = ReportExecutor::new(Arc::new(StuckStore), Duration::from_secs(5));
        let payload = executor
            .execute(
                &task(),
                &ScriptedProvider::failing(),
                &SolveContext::unbounded(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        assert!(payload["report_id"].is_null());
        assert!(payload["generated_at"].is_string());
    }
}
