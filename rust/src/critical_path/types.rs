//! Types for critical path analysis.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Slack at or below this is treated as zero.
pub const SLACK_TOLERANCE: f64 = 1e-9;

/// Configuration for the critical path analyzer.
#[derive(Clone, Debug)]
pub struct CriticalPathConfig {
    /// Tasks with slack below this many hours are near-critical.
    pub near_critical_threshold: f64,
    /// Slack at or above this is called out as rescheduling room.
    pub significant_slack_hours: f64,
    pub hours_per_day: f64,
    /// Near-critical paths kept in the result.
    pub max_near_critical_paths: usize,
    /// Near-critical paths with slack below this are high risk.
    pub high_risk_slack: f64,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    pub verbosity: u8,
}

impl Default for CriticalPathConfig {
    fn default() -> Self {
        Self {
            near_critical_threshold: 2.0,
            significant_slack_hours: 8.0,
            hours_per_day: 8.0,
            max_near_critical_paths: 5,
            high_risk_slack: 0.5,
            verbosity: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Critical,
    NearCritical,
    #[default]
    NonCritical,
}

impl Criticality {
    pub fn classify(slack: f64, near_critical_threshold: f64) -> Self {
        if slack.abs() <= SLACK_TOLERANCE {
            Criticality::Critical
        } else if slack < near_critical_threshold {
            Criticality::NearCritical
        } else {
            Criticality::NonCritical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Critical => "critical",
            Criticality::NearCritical => "near_critical",
            Criticality::NonCritical => "non_critical",
        }
    }
}

/// Per-task timing from the forward and backward passes, in hours from project start.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TaskTiming {
    pub earliest_start: f64,
    pub earliest_finish: f64,
    pub latest_start: f64,
    pub latest_finish: f64,
    /// latest_start - earliest_start.
    pub slack: f64,
    pub criticality: Criticality,
}

impl TaskTiming {
    pub fn is_critical(&self) -> bool {
        self.criticality == Criticality::Critical
    }
}

/// A critical task whose delay propagates downstream.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bottleneck {
    pub task_id: String,
    pub dependent_count: usize,
    pub critical_dependents: usize,
    /// Hours of critical work transitively downstream.
    pub impact_hours: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Medium,
}

/// A chain of near-critical tasks that could become critical.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NearCriticalPath {
    pub path: Vec<String>,
    /// Smallest slack along the path.
    pub slack: f64,
    pub risk: RiskLevel,
}

/// Output of `CriticalPathAnalyzer::analyze`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CriticalPathResult {
    /// Zero-slack tasks ordered by earliest start.
    pub critical_path: Vec<String>,
    /// Project makespan in hours.
    pub total_duration: f64,
    pub estimated_days: f64,
    pub bottlenecks: Vec<Bottleneck>,
    pub near_critical_paths: Vec<NearCriticalPath>,
    pub task_timings: BTreeMap<String, TaskTiming>,
    pub recommendations: Vec<String>,
}

impl CriticalPathResult {
    pub fn timing(&self, id: &str) -> Option<&TaskTiming> {
        self.task_timings.get(id)
    }

    pub fn is_on_critical_path(&self, id: &str) -> bool {
        self.timing(id).map(|t| t.is_critical()).unwrap_or(false)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "path": self.critical_path,
            "total_hours": self.total_duration,
            "estimated_days": self.estimated_days,
            "bottlenecks": self.bottlenecks,
            "near_critical_paths": self.near_critical_paths,
            "task_timings": self.task_timings,
            "recommendations": self.recommendations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CriticalPathConfig::default();
        assert!((config.near_critical_threshold - 2.0).abs() < 1e-9);
        assert!((config.high_risk_slack - 0.5).abs() < 1e-9);
        assert_eq!(config.max_near_critical_paths, 5);
    }

    #[test]
    fn test_classify_slack() {
        assert_eq!(Criticality::classify(0.0, 2.0), Criticality::Critical);
        assert_eq!(Criticality::classify(1e-12, 2.0), Criticality::Critical);
        assert_eq!(Criticality::classify(1.5, 2.0), Criticality::NearCritical);
        assert_eq!(Criticality::classify(2.0, 2.0), Criticality::NonCritical);
    }

    #[test]
    fn test_timing_serializes_criticality() {
        let timing = TaskTiming {
            earliest_start: 1.0,
            earliest_finish: 3.0,
            latest_start: 2.0,
            latest_finish: 4.0,
            slack: 1.0,
            criticality: Criticality::NearCritical,
        };
        let value = serde_json::to_value(&timing).unwrap();
        assert_eq!(value["criticality"], "near_critical");
        assert!(!timing.is_critical());
    }
}
