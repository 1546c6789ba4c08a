//! Subtask scheduler - runs one plan's subtasks with dependency propagation.
//!
//! # Guarantees
//! - At most `max_subtasks` subtasks run; the rest are dropped
//! - A subtask starts only after its honored dependencies have finished
//! - A subtask that times out, or whose request is cancelled, is executed
//!   atomically instead of being abandoned
//! - A failing or panicking subtask never stops its siblings
//! - Results come back in plan order

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::{json, Map, Value};

use crate::agents::SolveContext;
use crate::config::SolverLimits;
use crate::task::{Plan, ResultEnvelope, SubtaskSpec, Task};

/// What the scheduler calls back into for each subtask.
#[async_trait]
pub trait SubtaskRunner: Send + Sync {
    /// Solve a subtask through the full recursive state machine.
    async fn solve_subtask(&self, task: &Task, scope: &SolveContext) -> ResultEnvelope;

    /// Execute a subtask atomically, bypassing decomposition.
    async fn execute_atomic(&self, task: &Task, scope: &SolveContext) -> ResultEnvelope;
}

enum Attempt {
    Done(ResultEnvelope),
    TimedOut,
    Cancelled,
}

pub struct SubtaskScheduler {
    max_subtasks: usize,
    max_dependencies: usize,
    max_concurrency: usize,
    subtask_timeout: Duration,
}

impl SubtaskScheduler {
    pub fn new(limits: &SolverLimits) -> Self {
        Self {
            max_subtasks: limits.max_subtasks.max(1),
            max_dependencies: limits.max_dependencies,
            max_concurrency: limits.max_concurrency.max(1),
            subtask_timeout: limits.subtask_timeout,
        }
    }

    /// Run `plan` for `parent`. Each subtask runs one level deeper than `parent`.
    pub async fn run(
        &self,
        plan: &Plan,
        parent: &Task,
        runner: &dyn SubtaskRunner,
        scope: &SolveContext,
    ) -> Vec<ResultEnvelope> {
        let specs = &plan.subtasks()[..plan.len().min(self.max_subtasks)];
        if specs.len() < plan.len() {
            tracing::warn!(
                component = "scheduler",
                depth = parent.depth() + 1,
                "Dropping {} subtasks beyond the limit of {}",
                plan.len() - specs.len(),
                self.max_subtasks
            );
        }

        let index: HashMap<&str, usize> = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.id.as_str(), i))
            .collect();
        // The cap counts declared dependencies, including ones normalization dropped
        let honored: Vec<Vec<usize>> = specs
            .iter()
            .map(|spec| {
                let mut deps: Vec<usize> = Vec::new();
                for dep in spec.declared_dependencies.iter().take(self.max_dependencies) {
                    if !spec.depends_on.contains(dep) {
                        continue;
                    }
                    if let Some(&d) = index.get(dep.as_str()) {
                        if !deps.contains(&d) {
                            deps.push(d);
                        }
                    }
                }
                deps
            })
            .collect();

        // Completed-subtask map, keyed by subtask id
        let mut completed: HashMap<&str, ResultEnvelope> = HashMap::new();
        let mut started = vec![false; specs.len()];
        let mut in_flight = FuturesUnordered::new();

        while completed.len() < specs.len() {
            let mut launched = false;
            for i in 0..specs.len() {
                if in_flight.len() >= self.max_concurrency {
                    break;
                }
                let ready = honored[i]
                    .iter()
                    .all(|&d| completed.contains_key(specs[d].id.as_str()));
                if !started[i] && ready {
                    started[i] = true;
                    launched = true;
                    let task = self.child_task(parent, &specs[i], &honored[i], specs, &completed);
                    in_flight.push(self.run_one(i, task, runner, scope));
                }
            }

            if in_flight.is_empty() && !launched {
                // Unreachable for a valid plan; run the next subtask rather than stall.
                let Some(i) = started.iter().position(|s| !s) else {
                    break;
                };
                started[i] = true;
                let task = self.child_task(parent, &specs[i], &[], specs, &completed);
                in_flight.push(self.run_one(i, task, runner, scope));
            }

            if let Some((i, envelope)) = in_flight.next().await {
                completed.insert(specs[i].id.as_str(), envelope);
            }
        }

        specs
            .iter()
            .filter_map(|spec| completed.remove(spec.id.as_str()))
            .collect()
    }

    /// Build the child task, merging the payloads of its honored dependencies.
    fn child_task(
        &self,
        parent: &Task,
        spec: &SubtaskSpec,
        deps: &[usize],
        specs: &[SubtaskSpec],
        completed: &HashMap<&str, ResultEnvelope>,
    ) -> Task {
        let mut data = match &spec.data {
            Value::Object(obj) => obj.clone(),
            Value::Null => Map::new(),
            other => {
                let mut wrapped = Map::new();
                wrapped.insert("value".into(), other.clone());
                wrapped
            }
        };

        if !deps.is_empty() {
            let mut results = Map::new();
            for &d in deps {
                let dep_id = specs[d].id.as_str();
                let Some(envelope) = completed.get(dep_id) else {
                    continue;
                };
                if let Some(normalized) = envelope.get("normalized_data") {
                    data.insert("dependency_data".into(), normalized.clone());
                }
                results.insert(dep_id.to_string(), envelope.to_value());
            }
            data.insert("dependency_results".into(), Value::Object(results));
        }

        parent.subtask(spec, Value::Object(data))
    }

    async fn run_one(
        &self,
        index: usize,
        task: Task,
        runner: &dyn SubtaskRunner,
        scope: &SolveContext,
    ) -> (usize, ResultEnvelope) {
        let subtask_id = task.subtask_id().unwrap_or_default().to_string();
        let child_scope = scope.child(self.subtask_timeout);
        let budget = child_scope.remaining().unwrap_or(self.subtask_timeout);

        tracing::debug!(
            component = "scheduler",
            depth = task.depth(),
            subtask = %subtask_id,
            "Starting subtask"
        );

        let attempt = AssertUnwindSafe(async {
            let solve = tokio::time::timeout(budget, runner.solve_subtask(&task, &child_scope));
            tokio::select! {
                biased;
                _ = scope.cancelled() => Attempt::Cancelled,
                outcome = solve => {
                    match outcome {
                        Ok(envelope) => Attempt::Done(envelope),
                        Err(_) => Attempt::TimedOut,
                    }
                }
            }
        })
        .catch_unwind()
        .await;

        let envelope = match attempt {
            Ok(Attempt::Done(envelope)) => envelope,
            Ok(Attempt::TimedOut) => {
                tracing::warn!(
                    component = "scheduler",
                    depth = task.depth(),
                    subtask = %subtask_id,
                    "Subtask timed out after {:?}, executing atomically",
                    budget
                );
                self.atomic_fallback(&task, runner, scope).await
            }
            Ok(Attempt::Cancelled) => {
                tracing::warn!(
                    component = "scheduler",
                    depth = task.depth(),
                    subtask = %subtask_id,
                    "Request cancelled, executing subtask atomically"
                );
                self.atomic_fallback(&task, runner, scope).await
            }
            Err(panic) => failed_subtask(&task, panic_message(panic.as_ref())),
        };

        (index, envelope)
    }

    async fn atomic_fallback(
        &self,
        task: &Task,
        runner: &dyn SubtaskRunner,
        scope: &SolveContext,
    ) -> ResultEnvelope {
        let fallback_scope = scope.child(self.subtask_timeout);
        match AssertUnwindSafe(runner.execute_atomic(task, &fallback_scope))
            .catch_unwind()
            .await
        {
            Ok(envelope) => envelope.with_field("timeout_fallback", json!(true)),
            Err(panic) => failed_subtask(task, panic_message(panic.as_ref())),
        }
    }
}

/// Failing envelope for a subtask that could not produce one itself.
fn failed_subtask(task: &Task, error: String) -> ResultEnvelope {
    tracing::error!(
        component = "scheduler",
        depth = task.depth(),
        subtask = task.subtask_id().unwrap_or_default(),
        "Subtask failed: {}",
        error
    );

    let mut payload = Map::new();
    payload.insert(
        "subtask_id".into(),
        json!(task.subtask_id().unwrap_or_default()),
    );
    payload.insert("status".into(), json!("failed"));

    ResultEnvelope::failure(task.kind(), error)
        .with_stage(task.kind())
        .with_payload(payload)
        .with_depth(task.depth())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Subtask panicked: {}", detail)
}
