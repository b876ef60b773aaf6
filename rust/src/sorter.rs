//! Topological ordering of the dependency graph.
//!
//! Three interchangeable algorithms, all driven by dependency counts:
//! - `kahn`: in-degree elimination; each wave of zero in-degree nodes is a
//!   level, sorted by id
//! - `dfs`: post-order over dependencies; levels inferred from dependency depth
//! - `priority`: Kahn with each level ordered by descending priority

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use thiserror::Error;

use crate::config::SortAlgorithm;
use crate::graph::DependencyGraph;
use crate::{log_changes, log_debug};

/// Errors that can occur during sorting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SortError {
    /// Not every node could be ordered; the listed nodes sit on or behind a cycle.
    #[error("CYCLE_DETECTED: {} task(s) could not be ordered: {}", .unsorted.len(), .unsorted.join(", "))]
    CycleDetected { unsorted: Vec<String> },
}

/// Output of a topological sort.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SortResult {
    pub order: Vec<String>,
    /// Mutually independent groups; concatenated they equal `order` for Kahn
    /// and priority sorting.
    pub levels: Vec<Vec<String>>,
    pub algorithm: String,
}

/// One ordering problem found by `find_order_violations`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderViolation {
    /// `task` appears at or before its dependency.
    DependencyAfter { task: String, dependency: String },
    /// A graph node is absent from the order.
    Missing { task: String },
    /// An id in the order is not a graph node.
    Unknown { task: String },
}

/// Produces execution orders from a dependency graph.
#[derive(Clone, Debug, Default)]
pub struct TopologicalSorter {
    algorithm: SortAlgorithm,
    verbosity: u8,
}

impl TopologicalSorter {
    pub fn new(algorithm: SortAlgorithm, verbosity: u8) -> Self {
        Self {
            algorithm,
            verbosity,
        }
    }

    pub fn algorithm(&self) -> SortAlgorithm {
        self.algorithm
    }

    pub fn sort(&self, graph: &DependencyGraph) -> Result<SortResult, SortError> {
        let result = match self.algorithm {
            SortAlgorithm::Kahn => kahn_levels(graph, |level| level.sort()),
            SortAlgorithm::Priority => kahn_levels(graph, |level| {
                level.sort_by(|a, b| {
                    let pa = graph.get_node(a).map(|n| n.task.priority).unwrap_or(0);
                    let pb = graph.get_node(b).map(|n| n.task.priority).unwrap_or(0);
                    pb.cmp(&pa).then_with(|| a.cmp(b))
                })
            }),
            SortAlgorithm::Dfs => dfs_order(graph),
        }
        .map(|(order, levels)| SortResult {
            order,
            levels,
            algorithm: self.algorithm.as_str().to_string(),
        })?;

        log_changes!(
            self.verbosity,
            "Sorted {} tasks into {} levels using {}",
            result.order.len(),
            result.levels.len(),
            result.algorithm
        );
        log_debug!(self.verbosity, "Order: {:?}", result.order);
        Ok(result)
    }
}

/// Kahn's algorithm level by level. `arrange` orders each level before it is
/// appended.
fn kahn_levels<F>(
    graph: &DependencyGraph,
    mut arrange: F,
) -> Result<(Vec<String>, Vec<Vec<String>>), SortError>
where
    F: FnMut(&mut Vec<String>),
{
    let mut in_degree: FxHashMap<&str, usize> = graph
        .nodes()
        .map(|n| (n.id(), n.dependencies().len()))
        .collect();

    let mut current: Vec<String> = graph
        .nodes()
        .filter(|n| n.dependencies().is_empty())
        .map(|n| n.id().to_string())
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(graph.len());
    let mut levels: Vec<Vec<String>> = Vec::new();

    while !current.is_empty() {
        arrange(&mut current);
        let mut next: Vec<String> = Vec::new();
        for id in &current {
            for dependent in graph.get_dependents(id) {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(dependent);
                    }
                }
            }
        }
        order.extend(current.iter().cloned());
        levels.push(std::mem::take(&mut current));
        current = next;
    }

    if order.len() != graph.len() {
        let placed: FxHashSet<&str> = order.iter().map(|s| s.as_str()).collect();
        let mut unsorted: Vec<String> = graph
            .node_ids()
            .iter()
            .filter(|id| !placed.contains(id.as_str()))
            .cloned()
            .collect();
        unsorted.sort();
        return Err(SortError::CycleDetected { unsorted });
    }

    Ok((order, levels))
}

/// Depth-first post-order. Meeting a node on the active stack is a cycle.
fn dfs_order(graph: &DependencyGraph) -> Result<(Vec<String>, Vec<Vec<String>>), SortError> {
    let mut ids: Vec<&str> = graph.node_ids().iter().map(|s| s.as_str()).collect();
    ids.sort_unstable();

    let mut done: FxHashSet<&str> = FxHashSet::default();
    let mut active: FxHashSet<&str> = FxHashSet::default();
    let mut order: Vec<String> = Vec::with_capacity(graph.len());

    for start in ids {
        if done.contains(start) {
            continue;
        }
        let mut stack: Vec<(&str, Vec<&str>)> = vec![(start, pending_deps(graph, start))];
        active.insert(start);

        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            match pending.pop() {
                Some(dep) if done.contains(dep) => {}
                Some(dep) if active.contains(dep) => {
                    let mut unsorted: Vec<String> = active.iter().map(|s| s.to_string()).collect();
                    unsorted.sort();
                    return Err(SortError::CycleDetected { unsorted });
                }
                Some(dep) => {
                    active.insert(dep);
                    stack.push((dep, pending_deps(graph, dep)));
                }
                None => {
                    stack.pop();
                    active.remove(node);
                    done.insert(node);
                    order.push(node.to_string());
                }
            }
        }
    }

    let levels = levels_from_order(graph, &order);
    Ok((order, levels))
}

fn pending_deps<'a>(graph: &'a DependencyGraph, id: &str) -> Vec<&'a str> {
    graph
        .get_node(id)
        .map(|n| n.dependencies().iter().rev().map(|s| s.as_str()).collect())
        .unwrap_or_default()
}

/// Group an order into levels by dependency depth: a task's level is one past
/// the deepest of its dependencies that appear earlier in the order. Within a
/// level the order is preserved.
pub fn levels_from_order(graph: &DependencyGraph, order: &[String]) -> Vec<Vec<String>> {
    let mut level_of: FxHashMap<&str, usize> = FxHashMap::default();
    let mut levels: Vec<Vec<String>> = Vec::new();

    for id in order {
        let level = graph
            .get_node(id)
            .map(|n| {
                n.dependencies()
                    .iter()
                    .filter_map(|dep| level_of.get(dep.as_str()))
                    .map(|l| l + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        level_of.insert(id.as_str(), level);
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(id.clone());
    }

    levels
}

/// List every way `order` fails to be a valid execution order for `graph`.
pub fn find_order_violations(graph: &DependencyGraph, order: &[String]) -> Vec<OrderViolation> {
    let position: FxHashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut violations = Vec::new();

    for id in order {
        if !graph.contains(id) {
            violations.push(OrderViolation::Unknown { task: id.clone() });
        }
    }

    for node in graph.nodes() {
        let Some(&task_pos) = position.get(node.id()) else {
            violations.push(OrderViolation::Missing {
                task: node.id().to_string(),
            });
            continue;
        };
        for dep in node.dependencies() {
            match position.get(dep.as_str()) {
                Some(&dep_pos) if dep_pos < task_pos => {}
                _ => violations.push(OrderViolation::DependencyAfter {
                    task: node.id().to_string(),
                    dependency: dep.clone(),
                }),
            }
        }
    }

    violations
}

/// True when every dependency appears strictly before its dependent and the
/// order covers exactly the graph's nodes.
pub fn verify_sorted_order(graph: &DependencyGraph, order: &[String]) -> bool {
    find_order_violations(graph, order).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    fn make_task(id: &str, priority: i32, deps: &[&str]) -> Task {
        let mut task = Task::with_deps(id, 1.0, deps);
        task.priority = priority;
        task
    }

    fn build(tasks: &[Task]) -> DependencyGraph {
        DependencyGraph::build_from_tasks(tasks, false, 0).unwrap()
    }

    fn diamond() -> DependencyGraph {
        build(&[
            make_task("start", 0, &[]),
            make_task("ui", 1, &["start"]),
            make_task("db", 5, &["start"]),
            make_task("api", 3, &["start"]),
            make_task("integrate", 0, &["api", "ui", "db"]),
        ])
    }

    #[test]
    fn test_kahn_levels_sorted_by_id() {
        let graph = diamond();
        let result = TopologicalSorter::new(SortAlgorithm::Kahn, 0)
            .sort(&graph)
            .unwrap();

        assert_eq!(result.order, vec!["start", "api", "db", "ui", "integrate"]);
        assert_eq!(result.levels.len(), 3);
        assert_eq!(result.levels[1], vec!["api", "db", "ui"]);
        assert!(verify_sorted_order(&graph, &result.order));
    }

    #[test]
    fn test_priority_orders_within_level() {
        let graph = diamond();
        let result = TopologicalSorter::new(SortAlgorithm::Priority, 0)
            .sort(&graph)
            .unwrap();

        assert_eq!(result.levels[1], vec!["db", "api", "ui"]);
        assert!(verify_sorted_order(&graph, &result.order));
    }

    #[test]
    fn test_dfs_order_and_levels() {
        let graph = diamond();
        let result = TopologicalSorter::new(SortAlgorithm::Dfs, 0)
            .sort(&graph)
            .unwrap();

        assert_eq!(result.order.len(), 5);
        assert!(verify_sorted_order(&graph, &result.order));
        assert_eq!(result.levels.len(), 3);
        assert_eq!(result.levels[0], vec!["start"]);
        assert_eq!(result.levels[2], vec!["integrate"]);
    }

    #[test]
    fn test_cycle_reported_by_all_algorithms() {
        let graph = DependencyGraph::build_from_tasks(
            &[
                make_task("a", 0, &["c"]),
                make_task("b", 0, &["a"]),
                make_task("c", 0, &["b"]),
                make_task("free", 0, &[]),
            ],
            false,
            0,
        )
        .unwrap();

        for algorithm in [SortAlgorithm::Kahn, SortAlgorithm::Priority, SortAlgorithm::Dfs] {
            let err = TopologicalSorter::new(algorithm, 0).sort(&graph).unwrap_err();
            let SortError::CycleDetected { unsorted } = err;
            assert!(unsorted.contains(&"a".to_string()));
            assert!(!unsorted.contains(&"free".to_string()));
        }
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new();
        let result = TopologicalSorter::default().sort(&graph).unwrap();
        assert!(result.order.is_empty());
        assert!(result.levels.is_empty());
    }

    #[test]
    fn test_order_violations() {
        let graph = build(&[
            make_task("a", 0, &[]),
            make_task("b", 0, &["a"]),
            make_task("c", 0, &["b"]),
        ]);

        let bad: Vec<String> = ["b", "a", "x"].iter().map(|s| s.to_string()).collect();
        let violations = find_order_violations(&graph, &bad);
        assert!(violations.contains(&OrderViolation::Unknown {
            task: "x".to_string()
        }));
        assert!(violations.contains(&OrderViolation::Missing {
            task: "c".to_string()
        }));
        assert!(violations.contains(&OrderViolation::DependencyAfter {
            task: "b".to_string(),
            dependency: "a".to_string()
        }));
        assert!(!verify_sorted_order(&graph, &bad));
    }

    #[test]
    fn test_levels_from_order() {
        let graph = diamond();
        let order: Vec<String> = ["start", "ui", "api", "db", "integrate"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let levels = levels_from_order(&graph, &order);
        assert_eq!(levels, vec![vec!["start"], vec!["ui", "api", "db"], vec!["integrate"]]);
    }
}
