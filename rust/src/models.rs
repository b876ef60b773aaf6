//! Core data types for the resolution pipeline.

use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

/// Agent tag used when a task does not name an owner.
pub const UNASSIGNED_AGENT: &str = "unassigned";

/// Duration assumed when a task does not carry an estimate.
pub const DEFAULT_DURATION_HOURS: f64 = 1.0;

fn default_duration() -> f64 {
    DEFAULT_DURATION_HOURS
}

fn default_agent() -> String {
    UNASSIGNED_AGENT.to_string()
}

/// A task to be resolved into the schedule.
///
/// `dependencies` declare hard edges. `soft_dependencies` and
/// `optional_dependencies` declare weaker edges that cycle breaking may remove.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    #[serde(default)]
    pub title: String,
    #[pyo3(get, set)]
    #[serde(default, alias = "depends_on")]
    pub dependencies: Vec<String>,
    #[pyo3(get, set)]
    #[serde(default, alias = "soft_depends_on")]
    pub soft_dependencies: Vec<String>,
    #[pyo3(get, set)]
    #[serde(default, alias = "optional_depends_on")]
    pub optional_dependencies: Vec<String>,
    /// Estimated effort in hours.
    #[pyo3(get, set)]
    #[serde(
        default = "default_duration",
        alias = "estimated_hours",
        alias = "estimatedHours"
    )]
    pub duration: f64,
    #[pyo3(get, set)]
    #[serde(default)]
    pub priority: i32,
    #[pyo3(get, set)]
    #[serde(default = "default_agent")]
    pub agent: String,
}

impl Task {
    /// Create a hard-dependency task with default priority and no agent.
    pub fn with_deps(id: &str, duration: f64, deps: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            title: id.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            soft_dependencies: Vec::new(),
            optional_dependencies: Vec::new(),
            duration,
            priority: 0,
            agent: default_agent(),
        }
    }

    /// All declared dependency ids with their edge type.
    ///
    /// An id listed more than once keeps its strongest type.
    pub fn typed_dependencies(&self) -> Vec<(&str, EdgeType)> {
        let mut out: Vec<(&str, EdgeType)> = Vec::new();
        let lists = [
            (&self.dependencies, EdgeType::Hard),
            (&self.soft_dependencies, EdgeType::Soft),
            (&self.optional_dependencies, EdgeType::Optional),
        ];
        for (ids, edge_type) in lists {
            for id in ids {
                if !out.iter().any(|(seen, _)| *seen == id.as_str()) {
                    out.push((id.as_str(), edge_type));
                }
            }
        }
        out
    }

    /// Parse a JSON array of task records.
    pub fn list_from_json(input: &str) -> Result<Vec<Task>, serde_json::Error> {
        serde_json::from_str(input)
    }
}

#[pymethods]
impl Task {
    #[new]
    #[pyo3(signature = (
        id,
        title=None,
        dependencies=None,
        duration=DEFAULT_DURATION_HOURS,
        priority=0,
        agent=None,
        soft_dependencies=None,
        optional_dependencies=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: String,
        title: Option<String>,
        dependencies: Option<Vec<String>>,
        duration: f64,
        priority: i32,
        agent: Option<String>,
        soft_dependencies: Option<Vec<String>>,
        optional_dependencies: Option<Vec<String>>,
    ) -> Self {
        Self {
            title: title.unwrap_or_else(|| id.clone()),
            id,
            dependencies: dependencies.unwrap_or_default(),
            soft_dependencies: soft_dependencies.unwrap_or_default(),
            optional_dependencies: optional_dependencies.unwrap_or_default(),
            duration,
            priority,
            agent: agent.unwrap_or_else(default_agent),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Task(id={:?}, duration={}, priority={}, agent={:?}, deps={})",
            self.id,
            self.duration,
            self.priority,
            self.agent,
            self.dependencies.len() + self.soft_dependencies.len() + self.optional_dependencies.len()
        )
    }
}

/// Strength of a dependency edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Execution blocker.
    Hard,
    /// Preferred ordering; may be dropped to break a cycle.
    Soft,
    /// Advisory only.
    Optional,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Hard => "hard",
            EdgeType::Soft => "soft",
            EdgeType::Optional => "optional",
        }
    }

    /// Whether cycle breaking is allowed to remove an edge of this type.
    pub fn is_breakable(&self) -> bool {
        !matches!(self, EdgeType::Hard)
    }
}

/// Informational lifecycle status of a task. Never changed by the analysis passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Ready,
    InProgress,
    Completed,
    Blocked,
    Skipped,
}
