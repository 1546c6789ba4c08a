//! Atomizer - decides whether a task runs atomically or gets decomposed.
//!
//! Cheap structural rules run first; the capability provider is consulted
//! only at the root of a request, so it is asked at most once per solve.

use super::{ExecutorRegistry, SolveContext};
use crate::provider::CapabilityProvider;
use crate::task::Task;

/// Description substrings that mark a task as atomic.
pub const ATOMIC_KEYWORDS: [&str; 5] = ["single", "quick", "simple", "basic", "direct"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Atomic,
    Complex,
}

/// Which rule produced a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReason {
    DepthLimit,
    KnownKind,
    Keyword(&'static str),
    ProviderJudgment(String),
    ProviderFailure(String),
    BelowRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub classification: Classification,
    pub reason: DecisionReason,
}

impl Decision {
    fn atomic(reason: DecisionReason) -> Self {
        Self {
            classification: Classification::Atomic,
            reason,
        }
    }

    pub fn is_atomic(&self) -> bool {
        self.classification == Classification::Atomic
    }
}

pub struct Atomizer {
    atomic_depth: usize,
}

impl Atomizer {
    /// Tasks at `atomic_depth` or deeper are always atomic.
    pub fn new(atomic_depth: usize) -> Self {
        Self { atomic_depth }
    }

    /// Classify a task, cheapest rule first.
    ///
    /// # Postconditions
    /// - The provider is called only when `task.depth() == 0`
    /// - Any provider failure yields `Atomic`
    pub async fn classify(
        &self,
        task: &Task,
        registry: &ExecutorRegistry,
        provider: &dyn CapabilityProvider,
        scope: &SolveContext,
    ) -> Decision {
        let decision = self.decide(task, registry, provider, scope).await;
        tracing::debug!(
            component = "atomizer",
            depth = task.depth(),
            atomic = decision.is_atomic(),
            reason = ?decision.reason,
            "Classified '{}'",
            task.label()
        );
        decision
    }

    async fn decide(
        &self,
        task: &Task,
        registry: &ExecutorRegistry,
        provider: &dyn CapabilityProvider,
        scope: &SolveContext,
    ) -> Decision {
        if task.depth() >= self.atomic_depth {
            return Decision::atomic(DecisionReason::DepthLimit);
        }
        if registry.knows_kind(task.kind()) {
            return Decision::atomic(DecisionReason::KnownKind);
        }

        let description = task.description().to_lowercase();
        if let Some(keyword) = ATOMIC_KEYWORDS.iter().find(|k| description.contains(*k)) {
            return Decision::atomic(DecisionReason::Keyword(*keyword));
        }

        if task.depth() > 0 {
            return Decision::atomic(DecisionReason::BelowRoot);
        }

        let shape = task.data_shape();
        match scope
            .guard(provider.judge_atomicity(task.description(), &shape))
            .await
        {
            Ok(judgment) => Decision {
                classification: if judgment.is_atomic {
                    Classification::Atomic
                } else {
                    Classification::Complex
                },
                reason: DecisionReason::ProviderJudgment(judgment.reasoning),
            },
            Err(e) => {
                tracing::warn!(
                    component = "atomizer",
                    depth = task.depth(),
                    "Atomicity judgment failed, defaulting to atomic: {}",
                    e
                );
                Decision::atomic(DecisionReason::ProviderFailure(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::executors::health_registry;
    use crate::provider::testing::ScriptedProvider;
    use crate::storage::InMemoryReportStore;
    use crate::task::TaskRequest;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    fn registry() -> ExecutorRegistry {
        health_registry(Arc::new(InMemoryReportStore::new()), Duration::from_secs(1))
    }

    fn scope() -> SolveContext {
        SolveContext::unbounded(Duration::from_secs(1))
    }

    fn task(kind: &str, description: &str) -> Task {
        Task::root(TaskRequest::new(kind, description, json!({"steps": 1})))
    }

    #[tokio::test]
    async fn test_depth_limit_skips_provider() {
        let provider = ScriptedProvider::failing().with_atomicity(false);
        let decision = Atomizer::new(2)
            .classify(
                &task("unknown", "plan my month").at_depth(2),
                &registry(),
                &provider,
                &scope(),
            )
            .await;
        assert_eq!(decision.reason, DecisionReason::DepthLimit);
        assert_eq!(provider.judge_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_known_kind_and_keyword() {
        let provider = ScriptedProvider::failing().with_atomicity(false);
        let atomizer = Atomizer::new(2);

        let known = atomizer
            .classify(&task("metrics", "full review"), &registry(), &provider, &scope())
            .await;
        assert_eq!(known.reason, DecisionReason::KnownKind);

        let keyword = atomizer
            .classify(&task("unknown", "A QUICK check"), &registry(), &provider, &scope())
            .await;
        assert_eq!(keyword.reason, DecisionReason::Keyword("quick"));
        assert_eq!(provider.judge_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_consulted_only_at_root() {
        let provider = ScriptedProvider::failing().with_atomicity(false);
        let atomizer = Atomizer::new(2);

        let root = atomizer
            .classify(&task("unknown", "weekly review"), &registry(), &provider, &scope())
            .await;
        assert_eq!(root.classification, Classification::Complex);

        let nested = atomizer
            .classify(
                &task("unknown", "weekly review").at_depth(1),
                &registry(),
                &provider,
                &scope(),
            )
            .await;
        assert_eq!(nested.reason, DecisionReason::BelowRoot);
        assert_eq!(provider.judge_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_defaults_to_atomic() {
        let decision = Atomizer::new(2)
            .classify(
                &task("unknown", "weekly review"),
                &registry(),
                &ScriptedProvider::failing(),
                &scope(),
            )
            .await;
        assert!(decision.is_atomic());
        assert!(matches!(decision.reason, DecisionReason::ProviderFailure(_)));
    }
}
