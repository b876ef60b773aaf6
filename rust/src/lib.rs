//! Dependency resolution and scheduling engine for task graphs.
//!
//! Builds a dependency graph from tasks, detects and optionally breaks
//! cycles, sorts and groups tasks into execution blocks, runs critical path
//! analysis and produces a timestamped schedule. The `rust` Python module
//! exposes the resolver to the host application.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::NaiveDateTime;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::collections::{BTreeMap, HashMap};

pub mod blocker;
pub mod config;
pub mod critical_path;
pub mod cycles;
pub mod graph;
pub mod interner;
pub mod logging;
pub mod models;
pub mod resolver;
pub mod scheduler;
pub mod sorter;

pub use blocker::{
    BlockMode, BlockerConfig, BlockingError, BlockingResult, ExecutionBlock, ParallelBlocker,
};
pub use config::{
    ConfigError, CycleBreakStrategy, ParallelStrategy, ResolverConfig, ResourceConstraint,
    SortAlgorithm,
};
pub use critical_path::{CriticalPathAnalyzer, CriticalPathConfig, CriticalPathResult, TaskTiming};
pub use cycles::{CircularDetector, Cycle, CycleSeverity, DetectionResult, DetectorConfig};
pub use graph::{DependencyGraph, Edge, GraphError, GraphNode, GraphStats};
pub use models::{EdgeType, Task, TaskStatus};
pub use resolver::{
    ErrorKind, ResolutionError, ResolutionObserver, ResolutionResult, ResolutionStage, Resolver,
    ResolverEvent, ResolverStats, ValidationReport,
};
pub use scheduler::{ExecutionSchedule, ScheduleConfig, ScheduleGenerator, ScheduleStatus};
pub use sorter::{verify_sorted_order, SortError, SortResult, TopologicalSorter};

/// Resolver configuration (PyO3 wrapper). Strategy names are validated when
/// the config is used.
#[pyclass(name = "ResolverConfig")]
#[derive(Clone, Debug)]
pub struct PyResolverConfig {
    #[pyo3(get, set)]
    pub sort_algorithm: String,
    #[pyo3(get, set)]
    pub parallel_strategy: String,
    #[pyo3(get, set)]
    pub max_concurrency: usize,
    #[pyo3(get, set)]
    pub max_parallel_per_agent: usize,
    #[pyo3(get, set)]
    pub break_cycles: bool,
    #[pyo3(get, set)]
    pub cycle_break_strategy: String,
    #[pyo3(get, set)]
    pub analyze_critical_path: bool,
    #[pyo3(get, set)]
    pub generate_schedule: bool,
    #[pyo3(get, set)]
    pub near_critical_threshold: f64,
    #[pyo3(get, set)]
    pub significant_slack_hours: f64,
    #[pyo3(get, set)]
    pub buffer_percent: f64,
    /// Agent -> max concurrent tasks.
    #[pyo3(get, set)]
    pub resource_constraints: HashMap<String, usize>,
    #[pyo3(get, set)]
    pub allow_self_dependency: bool,
    #[pyo3(get, set)]
    pub stop_at_first_cycle: bool,
    #[pyo3(get, set)]
    pub max_cycles: usize,
    #[pyo3(get, set)]
    pub hours_per_day: f64,
    #[pyo3(get, set)]
    pub max_timeline_hours: usize,
    #[pyo3(get, set)]
    pub project_start: Option<NaiveDateTime>,
    #[pyo3(get, set)]
    pub verbosity: u8,
}

impl Default for PyResolverConfig {
    fn default() -> Self {
        let defaults = ResolverConfig::default();
        Self {
            sort_algorithm: defaults.sort_algorithm.to_string(),
            parallel_strategy: defaults.parallel_strategy.to_string(),
            max_concurrency: defaults.max_concurrency,
            max_parallel_per_agent: defaults.max_parallel_per_agent,
            break_cycles: defaults.break_cycles,
            cycle_break_strategy: defaults.cycle_break_strategy.to_string(),
            analyze_critical_path: defaults.analyze_critical_path,
            generate_schedule: defaults.generate_schedule,
            near_critical_threshold: defaults.near_critical_threshold,
            significant_slack_hours: defaults.significant_slack_hours,
            buffer_percent: defaults.buffer_percent,
            resource_constraints: HashMap::new(),
            allow_self_dependency: defaults.allow_self_dependency,
            stop_at_first_cycle: defaults.stop_at_first_cycle,
            max_cycles: defaults.max_cycles,
            hours_per_day: defaults.hours_per_day,
            max_timeline_hours: defaults.max_timeline_hours,
            project_start: defaults.project_start,
            verbosity: defaults.verbosity,
        }
    }
}

#[pymethods]
impl PyResolverConfig {
    #[new]
    #[pyo3(signature = (
        sort_algorithm=None,
        parallel_strategy=None,
        max_concurrency=None,
        max_parallel_per_agent=None,
        break_cycles=None,
        cycle_break_strategy=None,
        analyze_critical_path=None,
        generate_schedule=None,
        near_critical_threshold=None,
        significant_slack_hours=None,
        buffer_percent=None,
        resource_constraints=None,
        allow_self_dependency=None,
        stop_at_first_cycle=None,
        max_cycles=None,
        hours_per_day=None,
        max_timeline_hours=None,
        project_start=None,
        verbosity=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        sort_algorithm: Option<String>,
        parallel_strategy: Option<String>,
        max_concurrency: Option<usize>,
        max_parallel_per_agent: Option<usize>,
        break_cycles: Option<bool>,
        cycle_break_strategy: Option<String>,
        analyze_critical_path: Option<bool>,
        generate_schedule: Option<bool>,
        near_critical_threshold: Option<f64>,
        significant_slack_hours: Option<f64>,
        buffer_percent: Option<f64>,
        resource_constraints: Option<HashMap<String, usize>>,
        allow_self_dependency: Option<bool>,
        stop_at_first_cycle: Option<bool>,
        max_cycles: Option<usize>,
        hours_per_day: Option<f64>,
        max_timeline_hours: Option<usize>,
        project_start: Option<NaiveDateTime>,
        verbosity: Option<u8>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            sort_algorithm: sort_algorithm.unwrap_or(defaults.sort_algorithm),
            parallel_strategy: parallel_strategy.unwrap_or(defaults.parallel_strategy),
            max_concurrency: max_concurrency.unwrap_or(defaults.max_concurrency),
            max_parallel_per_agent: max_parallel_per_agent
                .unwrap_or(defaults.max_parallel_per_agent),
            break_cycles: break_cycles.unwrap_or(defaults.break_cycles),
            cycle_break_strategy: cycle_break_strategy.unwrap_or(defaults.cycle_break_strategy),
            analyze_critical_path: analyze_critical_path
                .unwrap_or(defaults.analyze_critical_path),
            generate_schedule: generate_schedule.unwrap_or(defaults.generate_schedule),
            near_critical_threshold: near_critical_threshold
                .unwrap_or(defaults.near_critical_threshold),
            significant_slack_hours: significant_slack_hours
                .unwrap_or(defaults.significant_slack_hours),
            buffer_percent: buffer_percent.unwrap_or(defaults.buffer_percent),
            resource_constraints: resource_constraints.unwrap_or_default(),
            allow_self_dependency: allow_self_dependency
                .unwrap_or(defaults.allow_self_dependency),
            stop_at_first_cycle: stop_at_first_cycle.unwrap_or(defaults.stop_at_first_cycle),
            max_cycles: max_cycles.unwrap_or(defaults.max_cycles),
            hours_per_day: hours_per_day.unwrap_or(defaults.hours_per_day),
            max_timeline_hours: max_timeline_hours.unwrap_or(defaults.max_timeline_hours),
            project_start: project_start.or(defaults.project_start),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "ResolverConfig(sort_algorithm={:?}, parallel_strategy={:?}, break_cycles={}, max_concurrency={})",
            self.sort_algorithm, self.parallel_strategy, self.break_cycles, self.max_concurrency
        )
    }
}

impl PyResolverConfig {
    /// Convert to the native config, parsing strategy names.
    pub fn to_config(&self) -> Result<ResolverConfig, ConfigError> {
        let resource_constraints: BTreeMap<String, ResourceConstraint> = self
            .resource_constraints
            .iter()
            .map(|(agent, &max_concurrent)| (agent.clone(), ResourceConstraint { max_concurrent }))
            .collect();
        let config = ResolverConfig {
            sort_algorithm: self.sort_algorithm.parse()?,
            parallel_strategy: self.parallel_strategy.parse()?,
            max_concurrency: self.max_concurrency,
            max_parallel_per_agent: self.max_parallel_per_agent,
            break_cycles: self.break_cycles,
            cycle_break_strategy: self.cycle_break_strategy.parse()?,
            analyze_critical_path: self.analyze_critical_path,
            generate_schedule: self.generate_schedule,
            near_critical_threshold: self.near_critical_threshold,
            significant_slack_hours: self.significant_slack_hours,
            buffer_percent: self.buffer_percent,
            resource_constraints,
            allow_self_dependency: self.allow_self_dependency,
            stop_at_first_cycle: self.stop_at_first_cycle,
            max_cycles: self.max_cycles,
            hours_per_day: self.hours_per_day,
            max_timeline_hours: self.max_timeline_hours,
            project_start: self.project_start,
            verbosity: self.verbosity,
        };
        config.validate()?;
        Ok(config)
    }
}

fn native_config(config: Option<PyResolverConfig>) -> PyResult<ResolverConfig> {
    match config {
        Some(c) => c.to_config().map_err(|e| PyValueError::new_err(e.to_string())),
        None => Ok(ResolverConfig::default()),
    }
}

fn schedule_for(tasks: &[Task], config: Option<PyResolverConfig>) -> PyResult<ExecutionSchedule> {
    Resolver::new(native_config(config)?)
        .resolve_schedule(tasks)
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Resolve tasks and return the full result as a JSON string.
///
/// Resolution failures (cycles, self-dependencies) are reported inside the
/// JSON with `success: false`; only an invalid config raises.
#[pyfunction]
#[pyo3(signature = (tasks, config=None))]
fn resolve(tasks: Vec<Task>, config: Option<PyResolverConfig>) -> PyResult<String> {
    let result = Resolver::new(native_config(config)?).resolve(&tasks);
    Ok(result.to_json().to_string())
}

/// Resolve tasks given as a JSON array, with an optional JSON config object.
#[pyfunction]
#[pyo3(signature = (tasks_json, config_json=None))]
fn resolve_json(tasks_json: &str, config_json: Option<&str>) -> PyResult<String> {
    let tasks = Task::list_from_json(tasks_json).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let config = match config_json {
        Some(raw) => {
            ResolverConfig::from_json_str(raw).map_err(|e| PyValueError::new_err(e.to_string()))?
        }
        None => ResolverConfig::default(),
    };
    let result = Resolver::new(config).resolve(&tasks);
    Ok(result.to_json().to_string())
}

/// Build the graph and check for cycles; returns a JSON report.
#[pyfunction]
#[pyo3(signature = (tasks, config=None))]
fn validate_tasks(tasks: Vec<Task>, config: Option<PyResolverConfig>) -> PyResult<String> {
    let report = Resolver::new(native_config(config)?).validate_tasks(&tasks);
    Ok(report.to_json().to_string())
}

/// Markdown report of the schedule.
///
/// # Raises
/// * ValueError if the tasks cannot be resolved
#[pyfunction]
#[pyo3(signature = (tasks, config=None))]
fn schedule_markdown(tasks: Vec<Task>, config: Option<PyResolverConfig>) -> PyResult<String> {
    Ok(schedule_for(&tasks, config)?.to_markdown())
}

/// Per-agent ASCII timeline of the schedule.
///
/// # Raises
/// * ValueError if the tasks cannot be resolved
#[pyfunction]
#[pyo3(signature = (tasks, config=None))]
fn schedule_ascii(tasks: Vec<Task>, config: Option<PyResolverConfig>) -> PyResult<String> {
    Ok(schedule_for(&tasks, config)?.to_ascii_timeline())
}

/// The schedule_resolver.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Data types
    m.add_class::<Task>()?;
    m.add_class::<PyResolverConfig>()?;

    // Resolution
    m.add_function(wrap_pyfunction!(resolve, m)?)?;
    m.add_function(wrap_pyfunction!(resolve_json, m)?)?;
    m.add_function(wrap_pyfunction!(validate_tasks, m)?)?;

    // Reports
    m.add_function(wrap_pyfunction!(schedule_markdown, m)?)?;
    m.add_function(wrap_pyfunction!(schedule_ascii, m)?)?;

    Ok(())
}
