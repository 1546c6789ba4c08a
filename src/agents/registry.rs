//! Executor registry - ordered routing from a task to its atomic executor.

use std::sync::Arc;

use super::AtomicExecutor;
use crate::task::Task;

/// Shared handle to an executor.
pub type ExecutorRef = Arc<dyn AtomicExecutor>;

/// Why a task was routed to its executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchedBy {
    /// `task.kind` equals the executor's kind or one of its aliases
    Kind,
    /// `task.description` contains this keyword
    Keyword(&'static str),
    /// Nothing matched
    Default,
}

/// Outcome of `ExecutorRegistry::resolve`.
#[derive(Clone)]
pub struct Route {
    pub executor: ExecutorRef,
    pub matched_by: MatchedBy,
}

enum Rule {
    Kind { tag: String, executor: usize },
    Keyword { needle: &'static str, executor: usize },
}

/// Ordered rule list: every kind rule, then keyword rules in registration
/// order, then the default executor.
///
/// # Invariants
/// - A default executor always exists
/// - Resolution is deterministic for a given registration order
pub struct ExecutorRegistry {
    executors: Vec<ExecutorRef>,
    rules: Vec<Rule>,
    default: usize,
}

impl ExecutorRegistry {
    /// Create a registry whose default executor is `default`.
    pub fn new(default: ExecutorRef) -> Self {
        let mut registry = Self {
            executors: Vec::new(),
            rules: Vec::new(),
            default: 0,
        };
        registry.default = registry.push(default);
        registry
    }

    /// Register another executor. Its rules rank after earlier registrations.
    pub fn register(mut self, executor: ExecutorRef) -> Self {
        self.push(executor);
        self
    }

    fn push(&mut self, executor: ExecutorRef) -> usize {
        let index = self.executors.len();
        let tags = std::iter::once(executor.kind()).chain(executor.aliases().iter().copied());
        for tag in tags {
            self.rules.push(Rule::Kind {
                tag: tag.to_lowercase(),
                executor: index,
            });
        }
        for &needle in executor.keywords() {
            self.rules.push(Rule::Keyword {
                needle,
                executor: index,
            });
        }
        self.executors.push(executor);
        index
    }

    /// Whether `kind` names a registered executor (by kind or alias).
    pub fn knows_kind(&self, kind: &str) -> bool {
        self.match_kind(kind).is_some()
    }

    fn match_kind(&self, kind: &str) -> Option<usize> {
        let kind = kind.trim().to_lowercase();
        self.rules.iter().find_map(|rule| match rule {
            Rule::Kind { tag, executor } if *tag == kind => Some(*executor),
            _ => None,
        })
    }

    /// Pick the executor for a task.
    pub fn resolve(&self, task: &Task) -> Route {
        if let Some(index) = self.match_kind(task.kind()) {
            return self.route(index, MatchedBy::Kind);
        }

        let description = task.description().to_lowercase();
        let keyword = self.rules.iter().find_map(|rule| match rule {
            Rule::Keyword { needle, executor } if description.contains(needle) => {
                Some((*executor, *needle))
            }
            _ => None,
        });
        match keyword {
            Some((index, needle)) => self.route(index, MatchedBy::Keyword(needle)),
            None => self.route(self.default, MatchedBy::Default),
        }
    }

    fn route(&self, index: usize, matched_by: MatchedBy) -> Route {
        Route {
            executor: Arc::clone(&self.executors[index]),
            matched_by,
        }
    }

    /// Canonical kinds in registration order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.executors.iter().map(|e| e.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{ExecutorError, ExecutorPayload, SolveContext};
    use crate::provider::CapabilityProvider;
    use crate::task::TaskRequest;
    use async_trait::async_trait;
    use serde_json::json;

    struct Named {
        kind: &'static str,
        aliases: &'static [&'static str],
        keywords: &'static [&'static str],
    }

    #[async_trait]
    impl AtomicExecutor for Named {
        fn kind(&self) -> &'static str {
            self.kind
        }
        fn agent_name(&self) -> &'static str {
            self.kind
        }
        fn aliases(&self) -> &'static [&'static str] {
            self.aliases
        }
        fn keywords(&self) -> &'static [&'static str] {
            self.keywords
        }
        async fn execute(
            &self,
            _task: &Task,
            _provider: &dyn CapabilityProvider,
            _scope: &SolveContext,
        ) -> Result<ExecutorPayload, ExecutorError> {
            Ok(ExecutorPayload::new())
        }
    }

    fn registry() -> ExecutorRegistry {
        ExecutorRegistry::new(Arc::new(Named {
            kind: "ingest",
            aliases: &["Loader"],
            keywords: &["ingest"],
        }))
        .register(Arc::new(Named {
            kind: "metrics",
            aliases: &[],
            keywords: &["score", "analysis"],
        }))
        .register(Arc::new(Named {
            kind: "report",
            aliases: &[],
            keywords: &["report", "analysis"],
        }))
    }

    fn task(kind: &str, description: &str) -> Task {
        Task::root(TaskRequest::new(kind, description, json!({})))
    }

    #[test]
    fn test_kind_beats_keywords() {
        let route = registry().resolve(&task("report", "compute a score"));
        assert_eq!(route.executor.kind(), "report");
        assert_eq!(route.matched_by, MatchedBy::Kind);
    }

    #[test]
    fn test_alias_is_case_insensitive() {
        let registry = registry();
        assert!(registry.knows_kind("loader"));
        assert_eq!(registry.resolve(&task("LOADER", "")).executor.kind(), "ingest");
    }

    #[test]
    fn test_keyword_order_follows_registration() {
        let route = registry().resolve(&task("unknown", "Weekly ANALYSIS please"));
        assert_eq!(route.executor.kind(), "metrics");
        assert_eq!(route.matched_by, MatchedBy::Keyword("analysis"));
    }

    #[test]
    fn test_default_when_nothing_matches() {
        let route = registry().resolve(&task("mystery", "do a thing"));
        assert_eq!(route.executor.kind(), "ingest");
        assert_eq!(route.matched_by, MatchedBy::Default);
        assert!(!registry().knows_kind("mystery"));
        assert_eq!(registry().kinds(), vec!["ingest", "metrics", "report"]);
    }
}
