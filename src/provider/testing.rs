//! Scripted capability provider for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{AtomicRequest, AtomicityJudgment, CapabilityProvider, ProviderError};
use crate::task::{DataShape, RawPlan};

/// Provider whose answers are fixed up front.
///
/// A `None` answer makes the call fail with `Unavailable`. Delays use tokio
/// time, so tests can run with paused time.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    atomicity: Option<bool>,
    plan: Option<RawPlan>,
    narrative: Option<Value>,
    plan_panics: bool,
    plan_delay: Duration,
    kind_delays: HashMap<String, Duration>,
    pub judge_calls: AtomicUsize,
    pub plan_calls: AtomicUsize,
    pub execute_calls: AtomicUsize,
    /// `kind:subtask_id` of every atomic call, in call order
    log: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// Every call fails.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_atomicity(mut self, is_atomic: bool) -> Self {
        self.atomicity = Some(is_atomic);
        self
    }

    pub fn with_plan(mut self, plan: RawPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_narrative(mut self, narrative: Value) -> Self {
        self.narrative = Some(narrative);
        self
    }

    pub fn with_panicking_planner(mut self) -> Self {
        self.plan_panics = true;
        self
    }

    pub fn with_plan_delay(mut self, delay: Duration) -> Self {
        self.plan_delay = delay;
        self
    }

    /// Delay atomic calls whose task description contains `needle`.
    pub fn with_execute_delay(mut self, needle: &str, delay: Duration) -> Self {
        self.kind_delays.insert(needle.to_string(), delay);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn unavailable() -> ProviderError {
        ProviderError::Unavailable("scripted failure".to_string())
    }
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
    async fn judge_atomicity(
        &self,
        _description: &str,
        _shape: &DataShape,
    ) -> Result<AtomicityJudgment, ProviderError> {
        self.judge_calls.fetch_add(1, Ordering::SeqCst);
        self.atomicity
            .map(|is_atomic| AtomicityJudgment {
                is_atomic,
                reasoning: "scripted".to_string(),
            })
            .ok_or_else(Self::unavailable)
    }

    async fn generate_plan(
        &self,
        _description: &str,
        _data: &Value,
    ) -> Result<RawPlan, ProviderError> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        if self.plan_panics {
            panic!("scripted planner panic");
        }
        if !self.plan_delay.is_zero() {
            tokio::time::sleep(self.plan_delay).await;
        }
        self.plan.clone().ok_or_else(Self::unavailable)
    }

    async fn execute_atomic(&self, request: AtomicRequest<'_>) -> Result<Value, ProviderError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!(
            "{}:{}",
            request.kind,
            request.task.subtask_id().unwrap_or("root")
        ));

        let delay = self
            .kind_delays
            .iter()
            .find(|(needle, _)| request.task.description().contains(needle.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.narrative.clone().ok_or_else(Self::unavailable)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
