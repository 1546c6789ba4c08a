//! Aggregator - merges subtask envelopes into one composed envelope.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::task::{ResultEnvelope, Task};

/// Envelopes indexed by agent identifier, last write wins.
pub type AgentIndex<'a> = BTreeMap<&'a str, &'a ResultEnvelope>;

/// Application-level synthesis of a human-facing summary.
pub trait Synthesizer: Send + Sync {
    /// Agent name of the composed envelope.
    fn agent_name(&self) -> &str;

    /// Extra payload fields for the composed envelope.
    fn synthesize(
        &self,
        by_agent: &AgentIndex<'_>,
        results: &[ResultEnvelope],
        original: &Task,
    ) -> Map<String, Value>;
}

/// Identifier an envelope is indexed under.
pub fn identity(envelope: &ResultEnvelope) -> &str {
    if !envelope.agent().is_empty() {
        envelope.agent()
    } else {
        envelope.stage().unwrap_or("unknown")
    }
}

pub struct Aggregator {
    synthesizer: Option<Box<dyn Synthesizer>>,
}

impl Aggregator {
    pub const AGENT: &'static str = "aggregator";

    pub fn new() -> Self {
        Self { synthesizer: None }
    }

    pub fn with_synthesizer(synthesizer: Box<dyn Synthesizer>) -> Self {
        Self {
            synthesizer: Some(synthesizer),
        }
    }

    fn agent_name(&self) -> &str {
        self.synthesizer
            .as_ref()
            .map_or(Self::AGENT, |s| s.agent_name())
    }

    /// Combine subtask results for `original`.
    ///
    /// # Postconditions
    /// - `ok` iff at least one result succeeded
    /// - an empty `results` yields a failing envelope
    pub fn combine(&self, results: &[ResultEnvelope], original: &Task) -> ResultEnvelope {
        let agent = self.agent_name();
        if results.is_empty() {
            return ResultEnvelope::failure(agent, "No parts to aggregate");
        }

        let mut by_agent: AgentIndex<'_> = BTreeMap::new();
        for envelope in results {
            by_agent.insert(identity(envelope), envelope);
        }

        let total = results.len();
        let successful = results.iter().filter(|r| r.ok()).count();
        let agent_results: Map<String, Value> = by_agent
            .iter()
            .map(|(name, envelope)| (name.to_string(), json!(envelope.ok())))
            .collect();

        let status = match successful {
            0 => "failed",
            n if n == total => "completed_successfully",
            _ => "completed_partially",
        };

        let mut payload = Map::new();
        payload.insert("execution_status".into(), json!(status));
        payload.insert(
            "execution_summary".into(),
            json!({
                "total_agents": total,
                "successful_agents": successful,
                "agent_results": agent_results,
            }),
        );
        if let Some(synthesizer) = &self.synthesizer {
            payload.extend(synthesizer.synthesize(&by_agent, results, original));
        }

        tracing::debug!(
            component = "aggregator",
            depth = original.depth(),
            total,
            successful,
            "Aggregated subtask results"
        );

        if successful == 0 {
            ResultEnvelope::failure(agent, format!("All {} subtasks failed", total))
                .with_payload(payload)
        } else {
            ResultEnvelope::success(agent, payload)
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
