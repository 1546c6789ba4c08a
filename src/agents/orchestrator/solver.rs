//! Recursive solver - the decomposition state machine.
//!
//! # Flow
//! ```text
//! ENTER(depth) -> CLASSIFY -> EXECUTE_ATOMIC
//!                          -> PLAN_AND_RECURSE -> SCHEDULE -> AGGREGATE
//! ```
//! Every path ends in a `ResultEnvelope`; no error or panic escapes `solve`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_recursion::async_recursion;
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::scheduler::{SubtaskRunner, SubtaskScheduler};
use crate::agents::aggregator::{Aggregator, Synthesizer};
use crate::agents::planner::{FallbackPlan, Planner};
use crate::agents::{Atomizer, ExecutorRegistry, SolveContext};
use crate::config::SolverLimits;
use crate::llm::FallbackStatus;
use crate::provider::CapabilityProvider;
use crate::task::{ResultEnvelope, Task, TaskRequest};

/// Safety features reported by `get_system_info`.
pub const SAFETY_FEATURES: [&str; 6] = [
    "Recursion depth limits",
    "Subtask count limits",
    "Timeout protection",
    "Cancellation propagation",
    "Error fallbacks",
    "Smart atomizer decisions",
];

/// Introspection for status reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SystemInfo {
    pub version: String,
    pub max_depth: usize,
    pub max_subtasks: usize,
    pub max_concurrency: usize,
    pub subtask_timeout_secs: u64,
    pub provider: String,
    pub executors: Vec<String>,
    pub safety_features: Vec<String>,
    /// Failover chain state, when the provider is backed by one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_routes: Option<FallbackStatus>,
}

pub struct RecursiveSolver {
    limits: SolverLimits,
    provider: Arc<dyn CapabilityProvider>,
    registry: ExecutorRegistry,
    atomizer: Atomizer,
    planner: Planner,
    scheduler: SubtaskScheduler,
    aggregator: Aggregator,
}

impl RecursiveSolver {
    /// Create a solver with no fallback plan and the generic aggregator.
    pub fn new(
        limits: SolverLimits,
        provider: Arc<dyn CapabilityProvider>,
        registry: ExecutorRegistry,
    ) -> Self {
        let limits = limits.normalized();
        Self {
            atomizer: Atomizer::new(limits.atomic_depth),
            planner: Planner::new(limits.max_plan_subtasks),
            scheduler: SubtaskScheduler::new(&limits),
            aggregator: Aggregator::new(),
            limits,
            provider,
            registry,
        }
    }

    /// Plan to use when the provider cannot produce one.
    pub fn with_fallback_plan(mut self, fallback: FallbackPlan) -> Self {
        self.planner = self.planner.with_fallback(fallback);
        self
    }

    /// Domain synthesis for composed envelopes.
    pub fn with_synthesizer(mut self, synthesizer: Box<dyn Synthesizer>) -> Self {
        self.aggregator = Aggregator::with_synthesizer(synthesizer);
        self
    }

    pub fn limits(&self) -> &SolverLimits {
        &self.limits
    }

    /// Solve a request. Always returns an envelope.
    pub async fn solve(&self, request: TaskRequest) -> ResultEnvelope {
        self.solve_with_cancel(request, CancellationToken::new()).await
    }

    /// Solve a request that the caller may cancel.
    ///
    /// Cancelling `cancel` sends every in-flight subtask, at any depth, to
    /// atomic execution with its provider calls failing immediately.
    pub async fn solve_with_cancel(
        &self,
        request: TaskRequest,
        cancel: CancellationToken,
    ) -> ResultEnvelope {
        let task = Task::root(request);
        let scope = SolveContext::root(&self.limits, cancel);

        tracing::info!(
            component = "solver",
            depth = 0,
            task_id = %task.id(),
            kind = task.kind(),
            "Solving '{}'",
            task.label()
        );
        let envelope = self.solve_at(&task, &scope).await;
        tracing::info!(
            component = "solver",
            depth = 0,
            task_id = %task.id(),
            ok = envelope.ok(),
            agent = envelope.agent(),
            "Solve finished"
        );
        envelope
    }

    pub fn get_system_info(&self) -> SystemInfo {
        SystemInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_depth: self.limits.max_depth,
            max_subtasks: self.limits.max_subtasks,
            max_concurrency: self.limits.max_concurrency,
            subtask_timeout_secs: self.limits.subtask_timeout.as_secs(),
            provider: self.provider.name().to_string(),
            executors: self.registry.kinds().iter().map(|k| k.to_string()).collect(),
            safety_features: SAFETY_FEATURES.iter().map(|f| f.to_string()).collect(),
            llm_routes: None,
        }
    }

    #[async_recursion]
    async fn solve_at(&self, task: &Task, scope: &SolveContext) -> ResultEnvelope {
        if task.depth() >= self.limits.max_depth {
            tracing::debug!(
                component = "solver",
                depth = task.depth(),
                "Depth limit reached, executing atomically"
            );
            return self.execute_atomic(task, scope).await;
        }
        if scope.is_cancelled() {
            return self.execute_atomic(task, scope).await;
        }

        let decision = self
            .atomizer
            .classify(task, &self.registry, self.provider.as_ref(), scope)
            .await;
        if decision.is_atomic() {
            return self.execute_atomic(task, scope).await;
        }

        match self.plan_and_recurse(task, scope).await {
            Some(envelope) => envelope,
            None => self.execute_atomic(task, scope).await,
        }
    }

    /// Plan, schedule and aggregate. `None` means "degrade to atomic".
    async fn plan_and_recurse(&self, task: &Task, scope: &SolveContext) -> Option<ResultEnvelope> {
        let planned = AssertUnwindSafe(self.planner.plan(task, self.provider.as_ref(), scope))
            .catch_unwind()
            .await;
        let plan = match planned {
            Ok(Ok(plan)) => plan,
            Ok(Err(e)) => {
                tracing::warn!(
                    component = "solver",
                    depth = task.depth(),
                    "Invalid plan, executing atomically: {}",
                    e
                );
                return None;
            }
            Err(_) => {
                tracing::error!(
                    component = "solver",
                    depth = task.depth(),
                    "Planner panicked, executing atomically"
                );
                return None;
            }
        };

        let scheduled = AssertUnwindSafe(self.scheduler.run(&plan, task, self, scope))
            .catch_unwind()
            .await;
        let results = match scheduled {
            Ok(results) => results,
            Err(_) => {
                tracing::error!(
                    component = "solver",
                    depth = task.depth(),
                    "Scheduler panicked, executing atomically"
                );
                return None;
            }
        };

        let ids: Vec<&str> = plan.subtasks().iter().map(|s| s.id.as_str()).collect();
        Some(
            self.aggregator
                .combine(&results, task)
                .with_field(
                    "plan",
                    json!({
                        "source": plan.source(),
                        "reasoning": plan.reasoning(),
                        "subtasks": ids,
                        "executed": results.len(),
                    }),
                )
                .with_field(
                    "subtask_results",
                    results.iter().map(ResultEnvelope::to_value).collect(),
                )
                .with_depth(task.depth()),
        )
    }

    /// Route to an executor and run it; failures become failing envelopes.
    async fn execute_atomic(&self, task: &Task, scope: &SolveContext) -> ResultEnvelope {
        let route = self.registry.resolve(task);
        let executor = route.executor;
        let agent = executor.agent_name();

        tracing::debug!(
            component = "executor",
            depth = task.depth(),
            agent,
            matched_by = ?route.matched_by,
            "Executing '{}'",
            task.label()
        );

        let outcome = AssertUnwindSafe(executor.execute(task, self.provider.as_ref(), scope))
            .catch_unwind()
            .await;

        let envelope = match outcome {
            Ok(Ok(payload)) => ResultEnvelope::success(agent, payload),
            Ok(Err(e)) => {
                tracing::warn!(
                    component = "executor",
                    depth = task.depth(),
                    agent,
                    "Executor failed: {}",
                    e
                );
                ResultEnvelope::failure(agent, e.to_string())
            }
            Err(_) => {
                tracing::error!(
                    component = "executor",
                    depth = task.depth(),
                    agent,
                    "Executor panicked"
                );
                ResultEnvelope::failure(agent, format!("{} panicked", agent))
            }
        };

        let envelope = envelope
            .with_stage(executor.kind())
            .with_field("executor_used", json!(agent))
            .with_depth(task.depth());
        match task.subtask_id() {
            Some(id) => envelope.with_field("subtask_id", json!(id)),
            None => envelope,
        }
    }
}

#[async_trait]
impl SubtaskRunner for RecursiveSolver {
    async fn solve_subtask(&self, task: &Task, scope: &SolveContext) -> ResultEnvelope {
        self.solve_at(task, scope).await
    }

    async fn execute_atomic(&self, task: &Task, scope: &SolveContext) -> ResultEnvelope {
        RecursiveSolver::execute_atomic(self, task, scope).await
    }
}
