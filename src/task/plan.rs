//! Plan definitions and normalization.
//!
//! The provider returns a loosely-typed `RawPlan`. `Plan::normalize` repairs
//! what can be repaired (missing ids, data, dependencies, priorities; self and
//! dangling references) and rejects what cannot (empty, oversized, duplicate
//! ids, dependency cycles).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Task, UNKNOWN_KIND};

/// Prefix for ids assigned to subtasks the provider left unnamed.
pub const AUTO_ID_PREFIX: &str = "auto:subtask_";

/// Priority given to subtasks without one.
pub const DEFAULT_PRIORITY: i64 = 3;

/// A subtask as proposed by the provider, every field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSubtask {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// A list of ids, or a single id
    #[serde(default)]
    pub depends_on: Option<Value>,
    #[serde(default)]
    pub priority: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RawSubtask {
    /// Convenience constructor used by fallback plans and tests.
    pub fn new(id: &str, kind: &str, description: &str, depends_on: &[&str]) -> Self {
        Self {
            id: Some(Value::String(id.to_string())),
            kind: Some(kind.to_string()),
            description: Some(description.to_string()),
            depends_on: Some(Value::from(depends_on.to_vec())),
            priority: None,
            data: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(Value::from(priority));
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    fn id_text(&self) -> Option<String> {
        let id = match self.id.as_ref()? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!id.is_empty()).then_some(id)
    }

    fn dependency_ids(&self) -> Vec<String> {
        let as_id = |v: &Value| match v {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };

        match &self.depends_on {
            Some(Value::Array(items)) => items.iter().filter_map(as_id).collect(),
            Some(single) => as_id(single).into_iter().collect(),
            None => Vec::new(),
        }
    }

    fn priority_value(&self) -> i64 {
        match &self.priority {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64))
                .unwrap_or(DEFAULT_PRIORITY),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_PRIORITY),
            _ => DEFAULT_PRIORITY,
        }
    }
}

/// A provider plan before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPlan {
    #[serde(default)]
    pub subtasks: Vec<RawSubtask>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl RawPlan {
    pub fn new(subtasks: Vec<RawSubtask>, reasoning: impl Into<String>) -> Self {
        Self {
            subtasks,
            reasoning: Some(reasoning.into()),
        }
    }
}

/// A normalized subtask specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskSpec {
    /// Unique within the plan
    pub id: String,
    pub kind: String,
    pub description: String,
    /// Ids of other subtasks in the same plan; never self
    pub depends_on: Vec<String>,
    /// Dependencies exactly as the plan listed them, before repair
    #[serde(default)]
    pub declared_dependencies: Vec<String>,
    /// Advisory ordering hint
    pub priority: i64,
    pub data: Value,
}

/// Where a plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Provider,
    Fallback,
}

/// A validated plan for one complex task.
///
/// # Invariants
/// - `subtasks` is non-empty and no longer than the configured maximum
/// - subtask ids are unique
/// - every dependency names another subtask of this plan
/// - the dependency relation is acyclic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    subtasks: Vec<SubtaskSpec>,
    reasoning: String,
    source: PlanSource,
}

impl Plan {
    /// Normalize a raw plan for `parent`.
    ///
    /// # Errors
    /// Returns `Err` if the plan is empty, exceeds `max_subtasks`, reuses an
    /// id, or contains a dependency cycle.
    pub fn normalize(
        raw: RawPlan,
        parent: &Task,
        max_subtasks: usize,
        source: PlanSource,
    ) -> Result<Self, PlanError> {
        if raw.subtasks.is_empty() {
            return Err(PlanError::Empty);
        }
        if raw.subtasks.len() > max_subtasks {
            return Err(PlanError::TooManySubtasks {
                count: raw.subtasks.len(),
                max: max_subtasks,
            });
        }

        let ids = assign_ids(&raw.subtasks)?;
        let known: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let subtasks = raw
            .subtasks
            .iter()
            .zip(ids.iter())
            .map(|(subtask, id)| {
                let declared_dependencies = subtask.dependency_ids();
                let mut depends_on: Vec<String> = Vec::new();
                for dep in declared_dependencies.iter().cloned() {
                    if dep == *id {
                        tracing::warn!(
                            component = "planner",
                            subtask = %id,
                            "Dropping self-dependency"
                        );
                    } else if !known.contains(dep.as_str()) {
                        tracing::warn!(
                            component = "planner",
                            subtask = %id,
                            dependency = %dep,
                            "Dropping dependency on unknown subtask"
                        );
                    } else if !depends_on.contains(&dep) {
                        depends_on.push(dep);
                    }
                }

                SubtaskSpec {
                    id: id.clone(),
                    kind: subtask
                        .kind
                        .clone()
                        .filter(|k| !k.trim().is_empty())
                        .unwrap_or_else(|| UNKNOWN_KIND.to_string()),
                    description: subtask.description.clone().unwrap_or_default(),
                    depends_on,
                    declared_dependencies,
                    priority: subtask.priority_value(),
                    data: subtask
                        .data
                        .clone()
                        .filter(|d| !d.is_null())
                        .unwrap_or_else(|| parent.data().clone()),
                }
            })
            .collect::<Vec<_>>();

        check_acyclic(&subtasks)?;

        Ok(Self {
            subtasks,
            reasoning: raw
                .reasoning
                .unwrap_or_else(|| "No reasoning provided".to_string()),
            source,
        })
    }

    pub fn subtasks(&self) -> &[SubtaskSpec] {
        &self.subtasks
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn source(&self) -> PlanSource {
        self.source
    }

    pub fn len(&self) -> usize {
        self.subtasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }
}

/// Keep provider ids, give unnamed subtasks a namespaced synthetic id.
fn assign_ids(subtasks: &[RawSubtask]) -> Result<Vec<String>, PlanError> {
    let mut taken: HashSet<String> = HashSet::new();
    for id in subtasks.iter().filter_map(RawSubtask::id_text) {
        if !taken.insert(id.clone()) {
            return Err(PlanError::DuplicateId(id));
        }
    }

    let mut ids = Vec::with_capacity(subtasks.len());
    for (i, subtask) in subtasks.iter().enumerate() {
        match subtask.id_text() {
            Some(id) => ids.push(id),
            None => {
                let mut candidate = format!("{}{}", AUTO_ID_PREFIX, i);
                let mut bump = 0;
                while taken.contains(&candidate) {
                    bump += 1;
                    candidate = format!("{}{}_{}", AUTO_ID_PREFIX, i, bump);
                }
                taken.insert(candidate.clone());
                ids.push(candidate);
            }
        }
    }
    Ok(ids)
}

/// Kahn's algorithm over subtask indices; fails if any subtask is never ready.
fn check_acyclic(subtasks: &[SubtaskSpec]) -> Result<(), PlanError> {
    let n = subtasks.len();
    let index: HashMap<&str, usize> = subtasks
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; n];
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, subtask) in subtasks.iter().enumerate() {
        for dep in &subtask.depends_on {
            if let Some(&d) = index.get(dep.as_str()) {
                adj[d].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = 0;

    while let Some(node) = ready.pop() {
        visited += 1;
        for &next in &adj[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(next);
            }
        }
    }

    if visited != n {
        let stuck = (0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| subtasks[i].id.clone())
            .collect();
        Err(PlanError::CircularDependency(stuck))
    } else {
        Ok(())
    }
}

/// Errors in plan creation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("Plan contains no subtasks")]
    Empty,

    #[error("Plan has {count} subtasks, more than the maximum of {max}")]
    TooManySubtasks { count: usize, max: usize },

    #[error("Subtask id '{0}' is used more than once")]
    DuplicateId(String),

    #[error("Circular dependency among subtasks {0:?}")]
    CircularDependency(Vec<String>),

    #[error("Plan generation failed: {0}")]
    Provider(String),
}
