//! Configuration types for the resolution pipeline.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::blocker::BlockerConfig;
use crate::critical_path::CriticalPathConfig;
use crate::cycles::DetectorConfig;
use crate::scheduler::{ScheduleConfig, DEFAULT_MAX_TIMELINE_HOURS};

/// Errors raised while parsing or validating configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown {kind}: {value}")]
    UnknownStrategy { kind: &'static str, value: String },
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Topological sort algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortAlgorithm {
    /// In-degree elimination, levels sorted by id.
    #[default]
    Kahn,
    /// Depth-first post-order; levels inferred afterwards.
    Dfs,
    /// Kahn with each level sorted by descending priority.
    Priority,
}

/// How sorted levels are partitioned into execution blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelStrategy {
    /// One block per dependency level.
    #[default]
    Maximum,
    /// Pack each level honoring total and per-agent limits.
    ResourceAware,
    /// Group each level by agent, then chunk per agent.
    AgentAware,
    /// Fixed chunks of at most three tasks.
    Conservative,
}

/// Which breakable edge is removed from each cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleBreakStrategy {
    /// Edge into the lowest-priority dependent; optional before soft on ties.
    #[default]
    LowestPriority,
    /// Optional edges before soft edges; priority breaks ties.
    WeakestEdge,
}

macro_rules! strategy_names {
    ($ty:ty, $kind:expr, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(ConfigError::UnknownStrategy {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

strategy_names!(SortAlgorithm, "sort algorithm", {
    Kahn => "kahn",
    Dfs => "dfs",
    Priority => "priority",
});

strategy_names!(ParallelStrategy, "parallel strategy", {
    Maximum => "maximum",
    ResourceAware => "resource_aware",
    AgentAware => "agent_aware",
    Conservative => "conservative",
});

strategy_names!(CycleBreakStrategy, "cycle break strategy", {
    LowestPriority => "lowest_priority",
    WeakestEdge => "weakest_edge",
});

/// Per-agent concurrency cap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceConstraint {
    #[serde(alias = "maxConcurrent")]
    pub max_concurrent: usize,
}

/// Configuration for a full resolution run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    #[serde(alias = "sortAlgorithm")]
    pub sort_algorithm: SortAlgorithm,
    #[serde(alias = "parallelStrategy")]
    pub parallel_strategy: ParallelStrategy,
    /// Maximum tasks in one resource-aware block.
    #[serde(alias = "maxConcurrency", alias = "max_parallel_tasks")]
    pub max_concurrency: usize,
    #[serde(alias = "maxParallelPerAgent")]
    pub max_parallel_per_agent: usize,
    #[serde(alias = "breakCycles")]
    pub break_cycles: bool,
    #[serde(alias = "cycleBreakStrategy")]
    pub cycle_break_strategy: CycleBreakStrategy,
    #[serde(alias = "analyzeCriticalPath")]
    pub analyze_critical_path: bool,
    #[serde(alias = "generateSchedule")]
    pub generate_schedule: bool,
    /// Slack (hours) below which a non-critical task counts as near-critical.
    #[serde(alias = "nearCriticalThreshold")]
    pub near_critical_threshold: f64,
    /// Slack (hours) at which a task is suggested for rescheduling.
    #[serde(alias = "significantSlackHours")]
    pub significant_slack_hours: f64,
    /// Padding applied to every block duration, in percent.
    #[serde(alias = "bufferPercent")]
    pub buffer_percent: f64,
    #[serde(alias = "resourceConstraints")]
    pub resource_constraints: BTreeMap<String, ResourceConstraint>,
    #[serde(alias = "allowSelfDependency")]
    pub allow_self_dependency: bool,
    #[serde(alias = "stopAtFirstCycle")]
    pub stop_at_first_cycle: bool,
    #[serde(alias = "maxCycles")]
    pub max_cycles: usize,
    #[serde(alias = "hoursPerDay")]
    pub hours_per_day: f64,
    /// Longest hour timeline a schedule will materialize.
    #[serde(alias = "maxTimelineHours")]
    pub max_timeline_hours: usize,
    /// Anchors the hour timeline to wall-clock time when set.
    #[serde(alias = "projectStart")]
    pub project_start: Option<NaiveDateTime>,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    pub verbosity: u8,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            sort_algorithm: SortAlgorithm::Kahn,
            parallel_strategy: ParallelStrategy::Maximum,
            max_concurrency: 10,
            max_parallel_per_agent: 3,
            break_cycles: false,
            cycle_break_strategy: CycleBreakStrategy::LowestPriority,
            analyze_critical_path: true,
            generate_schedule: true,
            near_critical_threshold: 2.0,
            significant_slack_hours: 8.0,
            buffer_percent: 0.0,
            resource_constraints: BTreeMap::new(),
            allow_self_dependency: false,
            stop_at_first_cycle: false,
            max_cycles: 100,
            hours_per_day: 8.0,
            max_timeline_hours: DEFAULT_MAX_TIMELINE_HOURS,
            project_start: None,
            verbosity: 0,
        }
    }
}

impl ResolverConfig {
    /// Parse a JSON configuration document; absent keys keep their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check numeric ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_parallel_per_agent == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_parallel_per_agent",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.near_critical_threshold.is_finite() || self.near_critical_threshold < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "near_critical_threshold",
                reason: format!("{} is not a non-negative number", self.near_critical_threshold),
            });
        }
        if !self.buffer_percent.is_finite() || self.buffer_percent < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "buffer_percent",
                reason: format!("{} is not a non-negative number", self.buffer_percent),
            });
        }
        if self.max_timeline_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_timeline_hours",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.hours_per_day.is_finite() || self.hours_per_day <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "hours_per_day",
                reason: format!("{} is not a positive number", self.hours_per_day),
            });
        }
        for (agent, constraint) in &self.resource_constraints {
            if constraint.max_concurrent == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "resource_constraints",
                    reason: format!("max_concurrent for {} must be at least 1", agent),
                });
            }
        }
        Ok(())
    }

    /// Extract cycle detection configuration.
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            stop_at_first: self.stop_at_first_cycle,
            max_cycles: self.max_cycles,
            verbosity: self.verbosity,
        }
    }

    /// Extract block partitioning configuration.
    pub fn blocker_config(&self) -> BlockerConfig {
        BlockerConfig {
            strategy: self.parallel_strategy,
            max_parallel_tasks: self.max_concurrency,
            max_parallel_per_agent: self.max_parallel_per_agent,
            hours_per_day: self.hours_per_day,
            verbosity: self.verbosity,
        }
    }

    /// Extract critical path configuration.
    pub fn critical_path_config(&self) -> CriticalPathConfig {
        CriticalPathConfig {
            near_critical_threshold: self.near_critical_threshold,
            significant_slack_hours: self.significant_slack_hours,
            hours_per_day: self.hours_per_day,
            verbosity: self.verbosity,
            ..CriticalPathConfig::default()
        }
    }

    /// Extract schedule generation configuration.
    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            buffer_percent: self.buffer_percent,
            resource_constraints: self.resource_constraints.clone(),
            hours_per_day: self.hours_per_day,
            max_timeline_hours: self.max_timeline_hours,
            project_start: self.project_start,
            verbosity: self.verbosity,
        }
    }
}
