//! Per-call solve context - cancellation and deadline threaded through the recursion.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SolverLimits;
use crate::provider::ProviderError;

/// Cancellation token plus deadline for one branch of a solve.
///
/// # Invariants
/// - A child's deadline is never later than its parent's
/// - Every context of one request shares the root's cancellation token
#[derive(Debug, Clone)]
pub struct SolveContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    provider_timeout: Duration,
}

impl SolveContext {
    /// Context for a root request.
    pub fn root(limits: &SolverLimits, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: Some(Instant::now() + limits.request_timeout),
            provider_timeout: limits.provider_timeout,
        }
    }

    /// Context with no deadline, bounded only by the provider timeout.
    pub fn unbounded(provider_timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
            provider_timeout,
        }
    }

    /// Child context whose deadline is at most `timeout` from now.
    pub fn child(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(match self.deadline {
                Some(parent) => parent.min(candidate),
                None => candidate,
            }),
            provider_timeout: self.provider_timeout,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the request is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time left before the deadline, or `None` without one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Budget for a single provider call.
    pub fn call_budget(&self) -> Duration {
        match self.remaining() {
            Some(remaining) => remaining.min(self.provider_timeout),
            None => self.provider_timeout,
        }
    }

    /// Run a provider call under the call budget and the cancellation token.
    pub async fn guard<F, T>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        if self.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let budget = self.call_budget();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
            outcome = tokio::time::timeout(budget, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(budget)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SolverLimits {
        SolverLimits::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_never_exceeds_parent() {
        let root = SolveContext::root(&limits(), CancellationToken::new());
        let child = root.child(Duration::from_secs(600));
        assert_eq!(child.remaining(), root.remaining());

        let short = root.child(Duration::from_secs(5));
        assert_eq!(short.remaining(), Some(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_times_out_slow_calls() {
        let scope = SolveContext::unbounded(Duration::from_secs(2));
        let result: Result<(), _> = scope
            .guard(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Timeout(d)) if d == Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_uses_remaining_deadline() {
        let root = SolveContext::root(&limits(), CancellationToken::new());
        let nearly_done = root.child(Duration::from_millis(300));
        assert_eq!(nearly_done.call_budget(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_reaches_children() {
        let token = CancellationToken::new();
        let root = SolveContext::root(&limits(), token.clone());
        let child = root.child(Duration::from_secs(30)).child(Duration::from_secs(30));

        let pending = tokio::spawn(async move {
            child
                .guard(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(1)
                })
                .await
        });
        tokio::task::yield_now().await;
        token.cancel();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }

    #[tokio::test]
    async fn test_guard_passes_results_through() {
        let scope = SolveContext::unbounded(Duration::from_secs(1));
        assert_eq!(scope.guard(async { Ok(7) }).await.unwrap(), 7);
        let err: Result<(), _> = scope
            .guard(async { Err(ProviderError::Malformed("x".into())) })
            .await;
        assert!(matches!(err, Err(ProviderError::Malformed(_))));
    }
}
