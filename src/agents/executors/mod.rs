//! Health executors - the four atomic handlers plus the canonical fallback plan.
//!
//! Each executor computes its numbers locally and asks the capability
//! provider only for narrative. When the provider fails, a deterministic
//! default narrative is used, so results never depend on the provider.

mod coach;
mod ingest;
mod metrics;
mod report;
mod synthesis;

pub use coach::CoachingExecutor;
pub use ingest::IngestExecutor;
pub use metrics::{compute_scores, MetricsExecutor, Scores};
pub use report::ReportExecutor;
pub use synthesis::HealthSynthesizer;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::{ExecutorRegistry, SolveContext};
use crate::provider::{AtomicRequest, CapabilityProvider};
use crate::storage::ReportStore;
use crate::task::{RawPlan, RawSubtask, Task};

/// Registry with the four health executors; `ingest` is the default.
pub fn health_registry(store: Arc<dyn ReportStore>, storage_timeout: Duration) -> ExecutorRegistry {
    ExecutorRegistry::new(Arc::new(IngestExecutor))
        .register(Arc::new(MetricsExecutor))
        .register(Arc::new(CoachingExecutor))
        .register(Arc::new(ReportExecutor::new(store, storage_timeout)))
}

/// The standard weekly pipeline: validate, score, coach, report.
pub fn health_fallback_plan(parent: &Task) -> RawPlan {
    let data = parent.data().clone();
    RawPlan::new(
        vec![
            RawSubtask::new("data_validation", "ingest", "Validate and normalize health data", &[])
                .with_priority(1)
                .with_data(data.clone()),
            RawSubtask::new(
                "health_metrics",
                "metrics",
                "Calculate comprehensive health metrics",
                &["data_validation"],
            )
            .with_priority(2)
            .with_data(data.clone()),
            RawSubtask::new(
                "personalized_coaching",
                "coach",
                "Generate personalized health recommendations",
                &["health_metrics"],
            )
            .with_priority(3)
            .with_data(json!({"message": "Provide weekly health coaching based on metrics"})),
            RawSubtask::new(
                "comprehensive_report",
                "report",
                "Create comprehensive health report",
                &["health_metrics", "personalized_coaching"],
            )
            .with_priority(4)
            .with_data(data),
        ],
        "Standard health analysis pipeline",
    )
}

/// Inputs every health executor reads.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthInputs {
    pub steps: i64,
    pub sleep_hours: f64,
    pub workouts: i64,
    pub water_liters: f64,
}

impl HealthInputs {
    /// Read inputs leniently: numbers or numeric strings, falling back to
    /// `dependency_data` and then to zero.
    pub fn from_data(data: &Value) -> Self {
        Self {
            steps: number(data, "steps") as i64,
            sleep_hours: number(data, "sleep_hours"),
            workouts: number(data, "workouts") as i64,
            water_liters: number(data, "water_liters"),
        }
    }

    pub fn to_value(self) -> Value {
        json!({
            "steps": self.steps,
            "sleep_hours": self.sleep_hours,
            "workouts": self.workouts,
            "water_liters": self.water_liters,
        })
    }
}

fn number(data: &Value, key: &str) -> f64 {
    let read = |v: &Value| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    data.get(key)
        .and_then(read)
        .or_else(|| data.get("dependency_data").and_then(|d| d.get(key)).and_then(read))
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Where an executor's narrative came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NarrativeSource {
    Provider,
    Default,
}

impl NarrativeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            NarrativeSource::Provider => "provider",
            NarrativeSource::Default => "default",
        }
    }
}

/// Ask the provider for narrative, falling back to `default` on any failure.
pub(crate) async fn narrate(
    provider: &dyn CapabilityProvider,
    scope: &SolveContext,
    request: AtomicRequest<'_>,
    default: impl FnOnce() -> Value,
) -> (Value, NarrativeSource) {
    match scope.guard(provider.execute_atomic(request)).await {
        Ok(value) if value.is_object() => (value, NarrativeSource::Provider),
        Ok(_) => {
            tracing::debug!(
                component = "executor",
                kind = request.kind,
                "Provider narrative was not an object"
            );
            (default(), NarrativeSource::Default)
        }
        Err(e) => {
            tracing::debug!(
                component = "executor",
                kind = request.kind,
                depth = request.task.depth(),
                "Using default narrative: {}",
                e
            );
            (default(), NarrativeSource::Default)
        }
    }
}
