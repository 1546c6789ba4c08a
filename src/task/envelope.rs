//! The uniform result shape returned by every level of the recursion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys owned by the envelope itself; payloads may not shadow them.
const RESERVED_KEYS: [&str; 5] = ["ok", "agent", "stage", "error", "depth"];

/// Result of solving one task, atomic or composed.
///
/// # Invariants
/// - `error.is_some()` iff `ok == false`
/// - the payload never contains a reserved key
/// - immutable once returned by the solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    ok: bool,

    /// Which capability produced this result
    agent: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    stage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    #[serde(default)]
    depth: usize,

    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl ResultEnvelope {
    /// Create a successful envelope.
    pub fn success(agent: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            ok: true,
            agent: agent.into(),
            stage: None,
            error: None,
            depth: 0,
            payload: strip_reserved(payload),
        }
    }

    /// Create a failing envelope.
    pub fn failure(agent: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            agent: agent.into(),
            stage: None,
            error: Some(error.into()),
            depth: 0,
            payload: Map::new(),
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Attach extra payload fields to a failing envelope (e.g. the subtask id).
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload.extend(strip_reserved(payload));
        self
    }

    pub(crate) fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub(crate) fn with_field(mut self, key: &str, value: Value) -> Self {
        if !RESERVED_KEYS.contains(&key) {
            self.payload.insert(key.to_string(), value);
        }
        self
    }

    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Look up a payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Serialize to a flat JSON object.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({"ok": self.ok, "agent": self.agent, "depth": self.depth})
        })
    }
}

fn strip_reserved(mut payload: Map<String, Value>) -> Map<String, Value> {
    payload.retain(|k, _| !RESERVED_KEYS.contains(&k.as_str()));
    payload
}
