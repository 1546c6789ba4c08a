//! Planner - turns a complex task into a normalized plan.

use std::sync::Arc;

use super::SolveContext;
use crate::provider::CapabilityProvider;
use crate::task::{Plan, PlanError, PlanSource, RawPlan, Task};

/// Builds the canonical plan used when the provider cannot plan.
pub type FallbackPlan = Arc<dyn Fn(&Task) -> RawPlan + Send + Sync>;

pub struct Planner {
    max_subtasks: usize,
    fallback: Option<FallbackPlan>,
}

impl Planner {
    pub fn new(max_subtasks: usize) -> Self {
        Self {
            max_subtasks,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackPlan) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Plan `task`.
    ///
    /// A provider failure substitutes the canonical plan. A provider plan that
    /// is structurally invalid (empty, oversized, cyclic, duplicate ids) is
    /// rejected so the caller can run the task atomically.
    ///
    /// # Errors
    /// - `PlanError::Provider` if the provider failed and no fallback exists
    /// - any normalization error of the provider plan
    pub async fn plan(
        &self,
        task: &Task,
        provider: &dyn CapabilityProvider,
        scope: &SolveContext,
    ) -> Result<Plan, PlanError> {
        let raw = scope
            .guard(provider.generate_plan(task.description(), task.data()))
            .await;

        match raw {
            Ok(raw) => {
                let plan = Plan::normalize(raw, task, self.max_subtasks, PlanSource::Provider)?;
                tracing::info!(
                    component = "planner",
                    depth = task.depth(),
                    subtasks = plan.len(),
                    "Planned: {}",
                    plan.reasoning()
                );
                Ok(plan)
            }
            Err(e) => {
                let Some(fallback) = &self.fallback else {
                    return Err(PlanError::Provider(e.to_string()));
                };
                tracing::warn!(
                    component = "planner",
                    depth = task.depth(),
                    "Planner failed, using fallback plan: {}",
                    e
                );
                Plan::normalize(fallback(task), task, self.max_subtasks, PlanSource::Fallback)
            }
        }
    }
}
