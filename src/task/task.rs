//! Core Task type.
//!
//! # Invariants
//! - `depth` is assigned by the solver, never by the producer of a request
//! - a subtask's depth is exactly its parent's depth + 1

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::SubtaskSpec;

/// Kind used when a request names no executor.
pub const UNKNOWN_KIND: &str = "unknown";

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a caller submits. Carries no depth: depth belongs to the solver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub data: Value,

    /// Advisory only; never consulted by the atomizer
    #[serde(default, alias = "complexity")]
    pub complexity_hint: Option<String>,
}

impl TaskRequest {
    /// Create a request for a given kind.
    pub fn new(kind: impl Into<String>, description: impl Into<String>, data: Value) -> Self {
        Self {
            kind: Some(kind.into()),
            description: description.into(),
            data,
            complexity_hint: None,
        }
    }

    /// Set the advisory complexity hint.
    pub fn with_complexity_hint(mut self, hint: impl Into<String>) -> Self {
        self.complexity_hint = Some(hint.into());
        self
    }

    /// Build a request from arbitrary JSON without ever failing.
    ///
    /// Missing or mistyped fields fall back to defaults; a non-object value
    /// becomes the description of an `unknown` task.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            let description = match value {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Self {
                description,
                ..Self::default()
            };
        };

        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            kind: text("kind").filter(|k| !k.trim().is_empty()),
            description: text("description").unwrap_or_default(),
            data: obj.get("data").cloned().unwrap_or(Value::Null),
            complexity_hint: text("complexity_hint").or_else(|| text("complexity")),
        }
    }
}

/// Size and key set of a task's data, sent to the provider instead of the data itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataShape {
    pub size_chars: usize,
    /// Top-level keys, or `None` when the data is not an object
    pub keys: Option<Vec<String>>,
}

/// A task to be solved.
///
/// Tasks are created fresh at each recursion step; the solver never mutates
/// a task it has handed to a child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    kind: String,
    description: String,
    data: Value,
    depth: usize,
    complexity_hint: Option<String>,

    /// Id of the subtask spec this task was built from
    subtask_id: Option<String>,
    parent_id: Option<TaskId>,
}

impl Task {
    /// Create a root task (depth 0) from a request.
    pub fn root(request: TaskRequest) -> Self {
        let data = match request.data {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        Self {
            id: TaskId::new(),
            kind: request
                .kind
                .filter(|k| !k.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_KIND.to_string()),
            description: request.description,
            data,
            depth: 0,
            complexity_hint: request.complexity_hint,
            subtask_id: None,
            parent_id: None,
        }
    }

    /// Create the child task for one subtask of this task's plan.
    ///
    /// # Postcondition
    /// `child.depth() == self.depth() + 1`
    pub(crate) fn subtask(&self, spec: &SubtaskSpec, data: Value) -> Self {
        Self {
            id: TaskId::new(),
            kind: spec.kind.clone(),
            description: spec.description.clone(),
            data,
            depth: self.depth + 1,
            complexity_hint: None,
            subtask_id: Some(spec.id.clone()),
            parent_id: Some(self.id),
        }
    }

    #[cfg(test)]
    pub(crate) fn at_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn complexity_hint(&self) -> Option<&str> {
        self.complexity_hint.as_deref()
    }

    pub fn subtask_id(&self) -> Option<&str> {
        self.subtask_id.as_deref()
    }

    pub fn parent_id(&self) -> Option<TaskId> {
        self.parent_id
    }

    /// Short label for logs.
    pub fn label(&self) -> &str {
        if self.description.is_empty() {
            &self.kind
        } else {
            &self.description
        }
    }

    pub fn data_shape(&self) -> DataShape {
        DataShape {
            size_chars: self.data.to_string().len(),
            keys: self
                .data
                .as_object()
                .map(|obj| obj.keys().cloned().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_from_empty_object() {
        let request = TaskRequest::from_value(&json!({}));
        let task = Task::root(request);

        assert_eq!(task.kind(), UNKNOWN_KIND);
        assert_eq!(task.description(), "");
        assert_eq!(task.depth(), 0);
        assert!(task.data().as_object().unwrap().is_empty());
    }

    #[test]
    fn test_request_from_mistyped_fields() {
        let request = TaskRequest::from_value(&json!({
            "kind": 42,
            "description": ["not", "text"],
            "complexity": "high",
        }));

        assert_eq!(request.kind, None);
        assert_eq!(request.description, "");
        assert_eq!(request.complexity_hint.as_deref(), Some("high"));
    }

    #[test]
    fn test_request_from_non_object() {
        let request = TaskRequest::from_value(&json!("summarize my week"));
        assert_eq!(request.description, "summarize my week");
        assert_eq!(request.kind, None);
    }

    #[test]
    fn test_depth_ignored_in_request() {
        let request: TaskRequest =
            serde_json::from_value(json!({"kind": "metrics", "depth": 7})).unwrap();
        assert_eq!(Task::root(request).depth(), 0);
    }

    #[test]
    fn test_subtask_depth_is_parent_plus_one() {
        let parent = Task::root(TaskRequest::new("analysis", "weekly", json!({"steps": 1})));
        let spec = SubtaskSpec {
            id: "m".to_string(),
            kind: "metrics".to_string(),
            description: "compute".to_string(),
            depends_on: vec![],
            declared_dependencies: vec![],
            priority: 1,
            data: json!({}),
        };

        let child = parent.subtask(&spec, spec.data.clone());
        assert_eq!(child.depth(), parent.depth() + 1);
        assert_eq!(child.subtask_id(), Some("m"));
        assert_eq!(child.parent_id(), Some(parent.id()));
        assert_ne!(child.id(), parent.id());
    }

    #[test]
    fn test_data_shape() {
        let task = Task::root(TaskRequest::new("x", "", json!({"a": 1, "b": 2})));
        let shape = task.data_shape();
        assert_eq!(shape.keys.unwrap().len(), 2);
        assert!(shape.size_chars > 0);

        let task = Task::root(TaskRequest::new("x", "", json!([1, 2])));
        assert!(task.data_shape().keys.is_none());
    }
}
