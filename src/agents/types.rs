//! Core types for atomic executors.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::SolveContext;
use crate::provider::{CapabilityProvider, ProviderError};
use crate::task::Task;

/// Errors an atomic executor can return.
///
/// The solver turns every one of these into a failing envelope tagged with
/// the executor's name; none escape `solve`.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Payload an executor hands back; the solver wraps it in an envelope.
pub type ExecutorPayload = Map<String, Value>;

/// A leaf handler for one task kind.
///
/// # Invariants
/// - `kind()` is unique within a registry
/// - `execute()` never panics on malformed data; bad input is `InvalidInput`
#[async_trait]
pub trait AtomicExecutor: Send + Sync {
    /// Canonical kind tag, also used as the envelope `stage`.
    fn kind(&self) -> &'static str;

    /// Name used as the envelope `agent`.
    fn agent_name(&self) -> &'static str;

    /// Extra kind tags routed to this executor.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Lowercase description substrings routed to this executor.
    fn keywords(&self) -> &'static [&'static str] {
        &[]
    }

    /// Execute a task atomically.
    ///
    /// Provider calls must go through `scope.guard` so they respect the
    /// request deadline and cancellation.
    async fn execute(
        &self,
        task: &Task,
        provider: &dyn CapabilityProvider,
        scope: &SolveContext,
    ) -> Result<ExecutorPayload, ExecutorError>;
}
