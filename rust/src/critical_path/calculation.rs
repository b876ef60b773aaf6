//! Forward and backward passes of the critical path method.

use thiserror::Error;

use crate::graph::DependencyGraph;
use crate::interner::{TaskIdx, TaskIndex};
use crate::log_debug;

use super::types::{Criticality, TaskTiming, SLACK_TOLERANCE};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriticalPathError {
    #[error("Task not found in graph: {0}")]
    UnknownTask(String),
    #[error("Task listed more than once in order: {0}")]
    DuplicateTask(String),
    #[error("Order is not topological: {task} appears before its dependency {dependency}")]
    InvalidOrder { task: String, dependency: String },
    #[error("Order is missing {} task(s): {}", .0.len(), .0.join(", "))]
    MissingTasks(Vec<String>),
}

/// Timings for every task, indexed by position in the sorted order.
#[derive(Clone, Debug)]
pub struct TimingTable {
    pub index: TaskIndex,
    pub timings: Vec<TaskTiming>,
    pub durations: Vec<f64>,
    /// Dependencies of each task as indices.
    pub deps: Vec<Vec<TaskIdx>>,
    /// Dependents of each task as indices.
    pub dependents: Vec<Vec<TaskIdx>>,
    pub total_duration: f64,
}

impl TimingTable {
    pub fn timing(&self, id: &str) -> Option<&TaskTiming> {
        self.index.get(id).map(|idx| &self.timings[idx])
    }

    pub fn len(&self) -> usize {
        self.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }
}

/// Run both passes over `order`, which must be a complete topological order of `graph`.
pub fn calculate_timings(
    graph: &DependencyGraph,
    order: &[String],
    near_critical_threshold: f64,
) -> Result<TimingTable, CriticalPathError> {
    for id in order {
        if !graph.contains(id) {
            return Err(CriticalPathError::UnknownTask(id.clone()));
        }
    }
    let index = TaskIndex::from_ids(order).map_err(CriticalPathError::DuplicateTask)?;

    let mut missing: Vec<String> = graph
        .node_ids()
        .iter()
        .filter(|id| index.get(id).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(CriticalPathError::MissingTasks(missing));
    }

    let n = index.len();
    let mut durations = vec![0.0; n];
    let mut deps: Vec<Vec<TaskIdx>> = vec![Vec::new(); n];
    let mut dependents: Vec<Vec<TaskIdx>> = vec![Vec::new(); n];

    for (idx, id) in order.iter().enumerate() {
        let Some(node) = graph.get_node(id) else {
            continue;
        };
        durations[idx] = node.duration();
        for dep in node.dependencies() {
            let Some(dep_idx) = index.get(dep) else {
                continue;
            };
            if dep_idx >= idx {
                return Err(CriticalPathError::InvalidOrder {
                    task: id.clone(),
                    dependency: dep.clone(),
                });
            }
            deps[idx].push(dep_idx);
            dependents[dep_idx].push(idx);
        }
    }

    let mut timings = vec![TaskTiming::default(); n];

    // Forward pass
    let mut total_duration: f64 = 0.0;
    for idx in 0..n {
        let earliest_start = deps[idx]
            .iter()
            .map(|&d| timings[d].earliest_finish)
            .fold(0.0, f64::max);
        let earliest_finish = earliest_start + durations[idx];
        timings[idx].earliest_start = earliest_start;
        timings[idx].earliest_finish = earliest_finish;
        total_duration = total_duration.max(earliest_finish);
    }

    // Backward pass
    for idx in (0..n).rev() {
        let latest_finish = if dependents[idx].is_empty() {
            total_duration
        } else {
            dependents[idx]
                .iter()
                .map(|&d| timings[d].latest_start)
                .fold(f64::INFINITY, f64::min)
        };
        let timing = &mut timings[idx];
        timing.latest_finish = latest_finish;
        timing.latest_start = latest_finish - durations[idx];

        let mut slack = timing.latest_start - timing.earliest_start;
        if slack.abs() <= SLACK_TOLERANCE {
            slack = 0.0;
        }
        timing.slack = slack;
        timing.criticality = Criticality::classify(slack, near_critical_threshold);
    }

    for (idx, timing) in timings.iter().enumerate() {
        log_debug!(
            graph.verbosity(),
            "  {}: ES={:.2} EF={:.2} LS={:.2} LF={:.2} slack={:.2}",
            index.resolve(idx).unwrap_or("?"),
            timing.earliest_start,
            timing.earliest_finish,
            timing.latest_start,
            timing.latest_finish,
            timing.slack
        );
    }

    Ok(TimingTable {
        index,
        timings,
        durations,
        deps,
        dependents,
        total_duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    fn make_task(id: &str, duration: f64, deps: &[&str]) -> Task {
        Task::with_deps(id, duration, deps)
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn build(tasks: &[Task]) -> DependencyGraph {
        DependencyGraph::build_from_tasks(tasks, false, 0).unwrap()
    }

    #[test]
    fn test_linear_chain_all_critical() {
        let graph = build(&[
            make_task("t1", 1.0, &[]),
            make_task("t2", 2.0, &["t1"]),
            make_task("t3", 3.0, &["t2"]),
            make_task("t4", 2.0, &["t3"]),
        ]);
        let table = calculate_timings(&graph, &ids(&["t1", "t2", "t3", "t4"]), 2.0).unwrap();

        assert!((table.total_duration - 8.0).abs() < 1e-9);
        assert!(table.timings.iter().all(|t| t.is_critical()));
        let t3 = table.timing("t3").unwrap();
        assert!((t3.earliest_start - 3.0).abs() < 1e-9);
        assert!((t3.latest_finish - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_branch_slack() {
        let graph = build(&[
            make_task("a", 1.0, &[]),
            make_task("long", 5.0, &["a"]),
            make_task("short", 2.0, &["a"]),
            make_task("z", 1.0, &["long", "short"]),
        ]);
        let table =
            calculate_timings(&graph, &ids(&["a", "long", "short", "z"]), 2.0).unwrap();

        assert!((table.total_duration - 7.0).abs() < 1e-9);
        let short = table.timing("short").unwrap();
        assert!((short.slack - 3.0).abs() < 1e-9);
        assert_eq!(short.criticality, Criticality::NonCritical);
        assert!((short.latest_start - 4.0).abs() < 1e-9);
        assert!(table.timing("long").unwrap().is_critical());
    }

    #[test]
    fn test_disconnected_tasks_measured_against_makespan() {
        let graph = build(&[make_task("big", 6.0, &[]), make_task("small", 5.0, &[])]);
        let table = calculate_timings(&graph, &ids(&["big", "small"]), 2.0).unwrap();

        let small = table.timing("small").unwrap();
        assert!((small.slack - 1.0).abs() < 1e-9);
        assert_eq!(small.criticality, Criticality::NearCritical);
    }

    #[test]
    fn test_empty_order() {
        let table = calculate_timings(&DependencyGraph::new(), &[], 2.0).unwrap();
        assert!(table.is_empty());
        assert!((table.total_duration).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_bad_orders() {
        let graph = build(&[make_task("a", 1.0, &[]), make_task("b", 1.0, &["a"])]);

        assert_eq!(
            calculate_timings(&graph, &ids(&["b", "a"]), 2.0).unwrap_err(),
            CriticalPathError::InvalidOrder {
                task: "b".to_string(),
                dependency: "a".to_string()
            }
        );
        assert_eq!(
            calculate_timings(&graph, &ids(&["a"]), 2.0).unwrap_err(),
            CriticalPathError::MissingTasks(ids(&["b"]))
        );
        assert_eq!(
            calculate_timings(&graph, &ids(&["a", "x"]), 2.0).unwrap_err(),
            CriticalPathError::UnknownTask("x".to_string())
        );
        assert_eq!(
            calculate_timings(&graph, &ids(&["a", "a", "b"]), 2.0).unwrap_err(),
            CriticalPathError::DuplicateTask("a".to_string())
        );
    }
}
