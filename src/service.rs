//! Health workflows on top of the recursive solver.
//!
//! `HealthService` wires the health executors, the canonical weekly plan and
//! the health synthesizer into a `RecursiveSolver`, and exposes the three
//! entry points callers use: a weekly review, a single-entry analysis and a
//! coaching chat.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::agents::executors::{health_fallback_plan, health_registry, HealthSynthesizer};
use crate::agents::{RecursiveSolver, SystemInfo};
use crate::config::{Config, SolverLimits};
use crate::llm::{FallbackClient, OpenRouterClient, ProviderRoute};
use crate::provider::{CapabilityProvider, LlmCapabilityProvider, OfflineProvider};
use crate::storage::{InMemoryReportStore, ReportStore, SqliteReportStore, StorageError};
use crate::task::{ResultEnvelope, TaskRequest};

/// Root kind of the weekly review.
pub const WEEKLY_KIND: &str = "comprehensive_health_analysis";

pub struct HealthService {
    solver: RecursiveSolver,
    store: Arc<dyn ReportStore>,
    llm: Option<Arc<FallbackClient>>,
}

impl HealthService {
    pub fn new(
        limits: SolverLimits,
        provider: Arc<dyn CapabilityProvider>,
        store: Arc<dyn ReportStore>,
    ) -> Self {
        let registry = health_registry(Arc::clone(&store), limits.storage_timeout);
        let solver = RecursiveSolver::new(limits, provider, registry)
            .with_fallback_plan(Arc::new(health_fallback_plan))
            .with_synthesizer(Box::new(HealthSynthesizer));
        Self {
            solver,
            store,
            llm: None,
        }
    }

    /// Build the service from configuration.
    ///
    /// Without an API key every provider call fails closed and the executors
    /// fall back to their local defaults. Without `db_path` reports are kept
    /// in memory.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if the SQLite database cannot be opened.
    pub async fn from_config(config: &Config) -> Result<Self, StorageError> {
        let mut llm = None;
        let provider: Arc<dyn CapabilityProvider> = match config.llm.api_key.as_deref() {
            Some(key) if config.llm.is_enabled() => {
                let client = Arc::new(OpenRouterClient::new(key.trim().to_string()));
                let routes = std::iter::once(&config.llm.default_model)
                    .chain(config.llm.fallback_models.iter())
                    .map(|model| {
                        ProviderRoute::new(format!("openrouter:{}", model), client.clone())
                            .with_model(model.as_str())
                    })
                    .collect();
                tracing::info!(
                    component = "provider",
                    "Using OpenRouter with model {} and {} fallbacks",
                    config.llm.default_model,
                    config.llm.fallback_models.len()
                );
                let chain = Arc::new(FallbackClient::new(routes));
                llm = Some(Arc::clone(&chain));
                Arc::new(LlmCapabilityProvider::new(
                    chain,
                    config.llm.default_model.clone(),
                ))
            }
            _ => {
                tracing::warn!(
                    component = "provider",
                    "OPENROUTER_API_KEY not set, running with local defaults only"
                );
                Arc::new(OfflineProvider)
            }
        };

        let store: Arc<dyn ReportStore> = match &config.db_path {
            Some(path) => Arc::new(SqliteReportStore::open(path.clone()).await?),
            None => Arc::new(InMemoryReportStore::new()),
        };

        Ok(Self {
            llm,
            ..Self::new(config.limits.clone(), provider, store)
        })
    }

    pub fn solver(&self) -> &RecursiveSolver {
        &self.solver
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    /// Solve an arbitrary request.
    pub async fn solve(&self, request: TaskRequest, cancel: CancellationToken) -> ResultEnvelope {
        self.solver.solve_with_cancel(request, cancel).await
    }

    /// Comprehensive weekly analysis of `data`.
    ///
    /// The envelope carries `engine_metadata` with the wall-clock time taken.
    pub async fn run_weekly(&self, data: Value) -> ResultEnvelope {
        let request = TaskRequest::new(
            WEEKLY_KIND,
            "Comprehensive weekly health analysis with personalized insights",
            data,
        )
        .with_complexity_hint("high");

        let started = Instant::now();
        let envelope = self.solver.solve(request).await;
        let elapsed = started.elapsed().as_secs_f64();
        tracing::info!(
            component = "solver",
            ok = envelope.ok(),
            "Weekly analysis finished in {:.2}s",
            elapsed
        );

        envelope.with_field(
            "engine_metadata",
            json!({
                "execution_time_seconds": (elapsed * 100.0).round() / 100.0,
                "max_depth_limit": self.solver.limits().max_depth,
                "version": env!("CARGO_PKG_VERSION"),
            }),
        )
    }

    /// Metrics for one entry.
    pub async fn analyze_single(&self, entry: Value) -> ResultEnvelope {
        let request = TaskRequest::new("metrics", "Single entry health metrics analysis", entry)
            .with_complexity_hint("low");
        self.solver.solve(request).await
    }

    /// One coaching exchange.
    pub async fn chat(&self, message: &str) -> ResultEnvelope {
        let request = TaskRequest::new(
            "coach",
            "Health coaching conversation",
            json!({ "message": message }),
        )
        .with_complexity_hint("low");
        self.solver.solve(request).await
    }

    pub fn system_info(&self) -> SystemInfo {
        SystemInfo {
            llm_routes: self.llm.as_ref().map(|chain| chain.status()),
            ..self.solver.get_system_info()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedProvider;

    fn week() -> Value {
        json!({"steps": 8000, "sleep_hours": 7.5, "workouts": 1, "water_liters": 2.5})
    }

    fn service(provider: ScriptedProvider) -> (HealthService, Arc<InMemoryReportStore>) {
        let store = Arc::new(InMemoryReportStore::new());
        let service =
            HealthService::new(SolverLimits::default(), Arc::new(provider), store.clone());
        (service, store)
    }

    #[tokio::test]
    async fn test_weekly_run_decomposes_and_saves_report() {
        let (service, store) = service(ScriptedProvider::failing().with_atomicity(false));
        let envelope = service.run_weekly(week()).await;

        assert!(envelope.ok());
        assert_eq!(envelope.agent(), "HealthAggregator");
        assert_eq!(envelope.get("health_score").unwrap(), 42.1);
        let metadata = envelope.get("engine_metadata").unwrap();
        assert_eq!(metadata["max_depth_limit"], 3);
        assert_eq!(metadata["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_weekly_run_offline_stays_atomic() {
        let (service, store) = service(ScriptedProvider::failing());
        let envelope = service.run_weekly(week()).await;

        // No executor owns the weekly kind; "analysis" in the description routes to metrics
        assert!(envelope.ok());
        assert_eq!(envelope.agent(), "MetricsAnalysisAgent");
        assert_eq!(envelope.stage(), Some("metrics"));
        assert_eq!(envelope.get("executor_used").unwrap(), "MetricsAnalysisAgent");
        assert!(envelope.get("engine_metadata").is_some());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_analyze_single_and_chat() {
        let (service, _) = service(ScriptedProvider::failing());

        let metrics = service.analyze_single(week()).await;
        assert!(metrics.ok());
        assert_eq!(metrics.agent(), "MetricsAnalysisAgent");

        let chat = service.chat("How do I sleep better?").await;
        assert!(chat.ok());
        assert_eq!(chat.agent(), "CoachingAgent");
        assert_eq!(chat.get("user_request").unwrap(), "How do I sleep better?");
    }

    #[tokio::test]
    async fn test_from_config_without_key_or_db() {
        let service = HealthService::from_config(&Config::new(SolverLimits::default()))
            .await
            .unwrap();
        assert_eq!(service.system_info().provider, "offline");
        assert!(!service.store().is_persistent());
    }

    #[tokio::test]
    async fn test_system_info_reports_llm_routes() {
        let mut config = Config::new(SolverLimits::default());
        config.llm.api_key = Some("sk-test".to_string());

        let service = HealthService::from_config(&config).await.unwrap();
        let routes = service.system_info().llm_routes.unwrap();
        assert_eq!(routes.providers_configured, 2);
        assert_eq!(
            routes.provider_names,
            [
                "openrouter:google/gemini-2.0-flash-001",
                "openrouter:anthropic/claude-3.5-sonnet"
            ]
        );
        assert_eq!(routes.last_successful, None);

        let offline = HealthService::from_config(&Config::new(SolverLimits::default()))
            .await
            .unwrap();
        assert!(offline.system_info().llm_routes.is_none());
    }

    #[tokio::test]
    async fn test_from_config_with_db_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(SolverLimits::default());
        config.db_path = Some(dir.path().join("reports").join("reports.db"));

        let service = HealthService::from_config(&config).await.unwrap();
        assert!(service.store().is_persistent());
        assert_eq!(service.system_info().executors.len(), 4);
    }
}
