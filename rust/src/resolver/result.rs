//! Resolution envelope returned by the facade.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

use crate::blocker::ExecutionBlock;
use crate::critical_path::CriticalPathResult;
use crate::cycles::Cycle;
use crate::graph::{Edge, GraphStats};
use crate::scheduler::ExecutionSchedule;

use super::events::ResolutionStage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CircularDependency,
    SortFailed,
    UnexpectedError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CircularDependency => "circular_dependency",
            ErrorKind::SortFailed => "sort_failed",
            ErrorKind::UnexpectedError => "unexpected_error",
        }
    }
}

/// A fatal failure at one pipeline stage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolutionError {
    pub kind: ErrorKind,
    pub stage: ResolutionStage,
    pub message: String,
    /// Unresolved cycles, for `CircularDependency`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<Cycle>,
}

impl ResolutionError {
    pub fn new(kind: ErrorKind, stage: ResolutionStage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
            cycles: Vec::new(),
        }
    }

    pub fn unexpected(stage: ResolutionStage, err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::UnexpectedError, stage, err.to_string())
    }

    pub fn circular(cycles: Vec<Cycle>) -> Self {
        let described: Vec<String> = cycles.iter().map(|c| c.describe()).collect();
        Self {
            kind: ErrorKind::CircularDependency,
            stage: ResolutionStage::CycleDetection,
            message: format!(
                "{} circular dependenc{} found: {}",
                cycles.len(),
                if cycles.len() == 1 { "y" } else { "ies" },
                described.join("; ")
            ),
            cycles,
        }
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.as_str(), self.stage, self.message)
    }
}

impl std::error::Error for ResolutionError {}

/// Counters gathered while resolving; filled in up to the failing stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResolutionMetrics {
    pub task_count: usize,
    pub dependency_count: usize,
    pub cycles_detected: usize,
    pub cycles_broken: usize,
    pub block_count: usize,
    /// Tasks on the critical path.
    pub critical_path_length: usize,
    pub total_duration_hours: f64,
    pub max_parallelism: usize,
    pub resolution_time_ms: f64,
}

#[derive(Clone, Debug, Default)]
pub struct ResolutionResult {
    pub success: bool,
    pub sorted_order: Vec<String>,
    pub levels: Vec<Vec<String>>,
    pub parallel_blocks: Vec<ExecutionBlock>,
    pub critical_path: Option<CriticalPathResult>,
    pub schedule: Option<ExecutionSchedule>,
    /// Edges dropped by cycle breaking.
    pub removed_edges: Vec<Edge>,
    pub errors: Vec<ResolutionError>,
    pub warnings: Vec<String>,
    pub metrics: ResolutionMetrics,
}

impl ResolutionResult {
    pub fn first_error(&self) -> Option<&ResolutionError> {
        self.errors.first()
    }

    pub fn has_error(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "success": self.success,
            "sorted_order": self.sorted_order,
            "levels": self.levels,
            "parallel_blocks": self
                .parallel_blocks
                .iter()
                .map(|b| b.to_json())
                .collect::<Vec<_>>(),
            "critical_path": self.critical_path.as_ref().map(|cp| cp.to_json()),
            "schedule": self.schedule.as_ref().map(|s| s.to_json()),
            "removed_edges": self.removed_edges,
            "errors": self.errors,
            "warnings": self.warnings,
            "metrics": self.metrics,
        })
    }
}

/// Output of the validation fast path: graph build plus cycle detection.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub stats: GraphStats,
    pub cycles: Vec<Cycle>,
    pub errors: Vec<ResolutionError>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Running totals across resolutions.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResolverStats {
    pub resolutions_performed: usize,
    pub failed_resolutions: usize,
    pub total_time_ms: f64,
    pub cycles_found: usize,
    pub cycles_broken: usize,
}

impl ResolverStats {
    pub fn average_time_ms(&self) -> f64 {
        if self.resolutions_performed == 0 {
            0.0
        } else {
            self.total_time_ms / self.resolutions_performed as f64
        }
    }
}
