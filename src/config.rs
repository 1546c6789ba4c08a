//! Configuration management for the decomposition engine.
//!
//! Configuration can be set via environment variables:
//! - `OPENROUTER_API_KEY` - Optional. Without it every provider call fails closed
//!   and the engine runs on local logic only.
//! - `DEFAULT_MODEL` - Optional. Primary model. Defaults to `google/gemini-2.0-flash-001`.
//! - `FALLBACK_MODELS` - Optional. Comma-separated models tried after the primary.
//! - `MAX_DEPTH` - Optional. Global recursion cap. Defaults to `3`.
//! - `ATOMIC_DEPTH` - Optional. Depth at which tasks are forced atomic. Defaults to `2`.
//! - `MAX_PLAN_SUBTASKS` - Optional. Largest plan accepted by the planner. Defaults to `6`.
//! - `MAX_SUBTASKS` - Optional. Subtasks executed per plan. Defaults to `4`.
//! - `MAX_DEPENDENCIES` - Optional. Dependencies honored per subtask. Defaults to `2`.
//! - `MAX_CONCURRENCY` - Optional. Subtasks in flight per plan. Defaults to `1`.
//! - `SUBTASK_TIMEOUT_SECS` - Optional. Defaults to `30`.
//! - `PROVIDER_TIMEOUT_SECS` - Optional. Defaults to `20`.
//! - `REQUEST_TIMEOUT_SECS` - Optional. Defaults to `120`.
//! - `STORAGE_TIMEOUT_SECS` - Optional. Defaults to `5`.
//! - `DB_PATH` - Optional. SQLite file for generated reports.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Safety limits applied by the solver, planner and scheduler.
///
/// # Invariants
/// - `atomic_depth <= max_depth`
/// - `max_subtasks >= 1`, `max_concurrency >= 1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverLimits {
    /// Global recursion cap; tasks at this depth are always executed atomically
    pub max_depth: usize,

    /// Depth from which the atomizer stops considering decomposition
    pub atomic_depth: usize,

    /// Plans proposing more subtasks than this are rejected
    pub max_plan_subtasks: usize,

    /// Subtasks actually executed per plan; extras are dropped
    pub max_subtasks: usize,

    /// Dependencies merged into a subtask's data
    pub max_dependencies: usize,

    /// Subtasks allowed in flight at once within one plan
    pub max_concurrency: usize,

    pub subtask_timeout: Duration,
    pub provider_timeout: Duration,
    pub request_timeout: Duration,
    pub storage_timeout: Duration,
}

impl Default for SolverLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            atomic_depth: 2,
            max_plan_subtasks: 6,
            max_subtasks: 4,
            max_dependencies: 2,
            max_concurrency: 1,
            subtask_timeout: Duration::from_secs(30),
            provider_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(120),
            storage_timeout: Duration::from_secs(5),
        }
    }
}

impl SolverLimits {
    /// Clamp values into a usable range.
    ///
    /// # Postcondition
    /// Invariants documented on the struct hold.
    pub fn normalized(mut self) -> Self {
        self.max_subtasks = self.max_subtasks.max(1);
        self.max_concurrency = self.max_concurrency.max(1);
        self.atomic_depth = self.atomic_depth.min(self.max_depth);
        self
    }

    /// Override the global recursion cap.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self.atomic_depth = self.atomic_depth.min(max_depth);
        self
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenRouter API key
    pub api_key: Option<String>,

    /// Model tried first
    pub default_model: String,

    /// Models tried in order once the default fails
    pub fallback_models: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: "google/gemini-2.0-flash-001".to_string(),
            fallback_models: vec!["anthropic/claude-3.5-sonnet".to_string()],
        }
    }
}

impl LlmConfig {
    /// Check if a remote provider is configured
    pub fn is_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub llm: LlmConfig,

    pub limits: SolverLimits,

    /// SQLite path for generated reports (in-memory store when unset)
    pub db_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = SolverLimits::default();
        let llm_defaults = LlmConfig::default();

        let llm = LlmConfig {
            api_key: std::env::var("OPENROUTER_API_KEY").ok(),
            default_model: std::env::var("DEFAULT_MODEL").unwrap_or(llm_defaults.default_model),
            fallback_models: std::env::var("FALLBACK_MODELS")
                .map(|s| parse_list(&s))
                .unwrap_or(llm_defaults.fallback_models),
        };

        let limits = SolverLimits {
            max_depth: env_parse("MAX_DEPTH", defaults.max_depth)?,
            atomic_depth: env_parse("ATOMIC_DEPTH", defaults.atomic_depth)?,
            max_plan_subtasks: env_parse("MAX_PLAN_SUBTASKS", defaults.max_plan_subtasks)?,
            max_subtasks: env_parse("MAX_SUBTASKS", defaults.max_subtasks)?,
            max_dependencies: env_parse("MAX_DEPENDENCIES", defaults.max_dependencies)?,
            max_concurrency: env_parse("MAX_CONCURRENCY", defaults.max_concurrency)?,
            subtask_timeout: env_secs("SUBTASK_TIMEOUT_SECS", defaults.subtask_timeout)?,
            provider_timeout: env_secs("PROVIDER_TIMEOUT_SECS", defaults.provider_timeout)?,
            request_timeout: env_secs("REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
            storage_timeout: env_secs("STORAGE_TIMEOUT_SECS", defaults.storage_timeout)?,
        }
        .normalized();

        let db_path = std::env::var("DB_PATH").ok().map(PathBuf::from);

        Ok(Self { llm, limits, db_path })
    }

    /// Create a config with custom limits (useful for testing).
    pub fn new(limits: SolverLimits) -> Self {
        Self {
            llm: LlmConfig::default(),
            limits: limits.normalized(),
            db_path: None,
        }
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

fn env_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_parse(name, default.as_secs()).map(Duration::from_secs)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_match_reference_behavior() {
        let limits = SolverLimits::default();
        assert_eq!(limits.max_depth, 3);
        assert_eq!(limits.atomic_depth, 2);
        assert_eq!(limits.max_plan_subtasks, 6);
        assert_eq!(limits.max_subtasks, 4);
        assert_eq!(limits.max_dependencies, 2);
        assert_eq!(limits.subtask_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_normalized_clamps_degenerate_values() {
        let limits = SolverLimits {
            max_depth: 1,
            atomic_depth: 5,
            max_subtasks: 0,
            max_concurrency: 0,
            ..SolverLimits::default()
        }
        .normalized();

        assert_eq!(limits.atomic_depth, 1);
        assert_eq!(limits.max_subtasks, 1);
        assert_eq!(limits.max_concurrency, 1);
    }

    #[test]
    fn test_parse_list_skips_blanks() {
        assert_eq!(
            parse_list(" a/b , ,c/d,"),
            vec!["a/b".to_string(), "c/d".to_string()]
        );
    }

    #[test]
    fn test_llm_enabled_requires_non_blank_key() {
        let mut llm = LlmConfig::default();
        assert!(!llm.is_enabled());
        llm.api_key = Some("  ".to_string());
        assert!(!llm.is_enabled());
        llm.api_key = Some("sk-test".to_string());
        assert!(llm.is_enabled());
    }
}
