//! Cycle detection over the dependency graph.
//!
//! Two passes are available:
//! - `detect`: iterative DFS with a recursion stack, deduplicating cycles by
//!   their member set so rotations collapse into one record
//! - `detect_exhaustive`: Tarjan's strongly connected components; every SCC
//!   with more than one member (or a self-loop) contains a cycle
//!
//! Detection never mutates the graph.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use crate::graph::DependencyGraph;
use crate::models::EdgeType;
use crate::{log_changes, log_checks};

/// Severity of a cycle, from its number of distinct members.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl CycleSeverity {
    pub fn from_length(length: usize) -> Self {
        match length {
            0..=2 => CycleSeverity::Critical,
            3..=4 => CycleSeverity::High,
            5..=7 => CycleSeverity::Medium,
            _ => CycleSeverity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CycleSeverity::Critical => "critical",
            CycleSeverity::High => "high",
            CycleSeverity::Medium => "medium",
            CycleSeverity::Low => "low",
        }
    }
}

/// A proposed fix for one cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakSuggestion {
    /// Drop the edge `from -> to` (`to` stops waiting on `from`).
    RemoveEdge {
        from: String,
        to: String,
        edge_type: EdgeType,
    },
    /// Two tasks waiting on each other are probably one unit of work.
    MergeTasks { tasks: Vec<String> },
}

impl BreakSuggestion {
    pub fn description(&self) -> String {
        match self {
            BreakSuggestion::RemoveEdge {
                from,
                to,
                edge_type,
            } => format!(
                "Remove {} dependency: {} no longer waits on {}",
                edge_type.as_str(),
                to,
                from
            ),
            BreakSuggestion::MergeTasks { tasks } => {
                format!("Merge mutually dependent tasks {}", tasks.join(" and "))
            }
        }
    }
}

/// A closed dependency path: `path[i]` waits on `path[i + 1]`, and the last
/// entry repeats the first.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Cycle {
    pub id: String,
    pub path: Vec<String>,
    pub severity: CycleSeverity,
    pub suggestions: Vec<BreakSuggestion>,
}

impl Cycle {
    /// Build a cycle record from an open path; the path is closed if needed.
    pub fn from_path(mut path: Vec<String>, graph: &DependencyGraph) -> Self {
        if path.len() > 1 && path.first() == path.last() {
            path.pop();
        }
        let id = canonical_id(&path);
        let severity = CycleSeverity::from_length(path.len());
        if let Some(first) = path.first().cloned() {
            path.push(first);
        }
        let mut cycle = Self {
            id,
            path,
            severity,
            suggestions: Vec::new(),
        };
        cycle.suggestions = suggest_breaks(&cycle, graph);
        cycle
    }

    /// Distinct member ids in path order.
    pub fn members(&self) -> &[String] {
        match self.path.len() {
            0 => &self.path,
            n => &self.path[..n - 1],
        }
    }

    /// Number of distinct members.
    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Edges of the cycle as (from, to) pairs where `to` waits on `from`.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.path
            .windows(2)
            .map(|w| (w[1].as_str(), w[0].as_str()))
            .collect()
    }

    pub fn describe(&self) -> String {
        format!("{} ({})", self.path.join(" -> "), self.severity.as_str())
    }
}

/// Identify a cycle by its sorted member set.
fn canonical_id(members: &[String]) -> String {
    let mut sorted: Vec<&str> = members.iter().map(|s| s.as_str()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.join("|")
}

/// Candidate fixes for a cycle: breakable edges first, then hard edges.
fn suggest_breaks(cycle: &Cycle, graph: &DependencyGraph) -> Vec<BreakSuggestion> {
    let mut removals: Vec<BreakSuggestion> = cycle
        .edges()
        .into_iter()
        .map(|(from, to)| BreakSuggestion::RemoveEdge {
            from: from.to_string(),
            to: to.to_string(),
            edge_type: graph.edge_type(from, to).unwrap_or(EdgeType::Hard),
        })
        .collect();
    removals.sort_by_key(|s| match s {
        BreakSuggestion::RemoveEdge { edge_type, .. } => !edge_type.is_breakable(),
        BreakSuggestion::MergeTasks { .. } => false,
    });

    let mut suggestions = Vec::with_capacity(removals.len() + 1);
    if cycle.len() == 2 {
        let mut tasks = cycle.members().to_vec();
        tasks.sort();
        suggestions.push(BreakSuggestion::MergeTasks { tasks });
    }
    suggestions.extend(removals);
    suggestions
}

/// Configuration for the cycle detector.
#[derive(Clone, Debug)]
pub struct DetectorConfig {
    /// Return as soon as one cycle is found.
    pub stop_at_first: bool,
    /// Upper bound on recorded cycles.
    pub max_cycles: usize,
    pub verbosity: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            stop_at_first: false,
            max_cycles: 100,
            verbosity: 0,
        }
    }
}

/// Outcome of cycle detection.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DetectionResult {
    pub has_cycles: bool,
    pub cycles: Vec<Cycle>,
    /// Nodes appearing in more than one cycle with their cycle counts,
    /// most frequent first.
    pub hotspots: Vec<(String, usize)>,
    pub recommendations: Vec<String>,
    /// All strongly connected components (exhaustive mode only).
    pub components: Vec<Vec<String>>,
}

/// Finds cycles in a dependency graph.
#[derive(Clone, Debug, Default)]
pub struct CircularDetector {
    config: DetectorConfig,
}

impl CircularDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Iterative DFS over dependencies. A dependency found on the current
    /// recursion stack closes a cycle.
    pub fn detect(&self, graph: &DependencyGraph) -> DetectionResult {
        let limit = if self.config.stop_at_first {
            1
        } else {
            self.config.max_cycles.max(1)
        };
        let mut cycles: Vec<Cycle> = Vec::new();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut visited: FxHashSet<&str> = FxHashSet::default();

        'outer: for start in graph.node_ids() {
            if visited.contains(start.as_str()) {
                continue;
            }

            let mut path: Vec<&str> = vec![start.as_str()];
            let mut on_path: FxHashMap<&str, usize> = FxHashMap::default();
            on_path.insert(start.as_str(), 0);
            let mut pending: Vec<Vec<&str>> = vec![dependencies_of(graph, start)];
            visited.insert(start.as_str());

            while let Some(next) = pending.last_mut() {
                let Some(dep) = next.pop() else {
                    pending.pop();
                    if let Some(done) = path.pop() {
                        on_path.remove(done);
                    }
                    continue;
                };

                if let Some(&pos) = on_path.get(dep) {
                    let mut members: Vec<String> =
                        path[pos..].iter().map(|s| s.to_string()).collect();
                    members.push(dep.to_string());
                    let cycle = Cycle::from_path(members, graph);
                    if seen.insert(cycle.id.clone()) {
                        log_checks!(self.config.verbosity, "Cycle found: {}", cycle.describe());
                        cycles.push(cycle);
                        if cycles.len() >= limit {
                            break 'outer;
                        }
                    }
                    continue;
                }

                if visited.insert(dep) {
                    on_path.insert(dep, path.len());
                    path.push(dep);
                    pending.push(dependencies_of(graph, dep));
                }
            }
        }

        log_changes!(
            self.config.verbosity,
            "Cycle detection: {} cycle(s) in {} nodes",
            cycles.len(),
            graph.len()
        );
        Self::summarize(cycles, Vec::new())
    }

    /// Tarjan SCC pass. Returns every component and one traced cycle per
    /// cyclic component.
    pub fn detect_exhaustive(&self, graph: &DependencyGraph) -> DetectionResult {
        let components = strongly_connected_components(graph);
        let mut cycles = Vec::new();

        for component in &components {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .map(|id| graph.get_dependencies(id).contains(id))
                    .unwrap_or(false);
            if !cyclic {
                continue;
            }
            if let Some(path) = trace_cycle(graph, component) {
                cycles.push(Cycle::from_path(path, graph));
            }
            if cycles.len() >= self.config.max_cycles.max(1) {
                break;
            }
        }

        log_changes!(
            self.config.verbosity,
            "Exhaustive detection: {} components, {} cyclic",
            components.len(),
            cycles.len()
        );
        Self::summarize(cycles, components)
    }

    fn summarize(cycles: Vec<Cycle>, components: Vec<Vec<String>>) -> DetectionResult {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for cycle in &cycles {
            for member in cycle.members() {
                *counts.entry(member.as_str()).or_default() += 1;
            }
        }
        let mut hotspots: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(id, count)| (id.to_string(), count))
            .collect();
        hotspots.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut recommendations = Vec::new();
        for (id, count) in &hotspots {
            recommendations.push(format!(
                "Task {} participates in {} cycles; review its dependencies first",
                id, count
            ));
        }
        let critical = cycles
            .iter()
            .filter(|c| c.severity == CycleSeverity::Critical)
            .count();
        if critical > 0 {
            recommendations.push(format!(
                "{} critical cycle(s) between directly dependent tasks; consider merging them",
                critical
            ));
        }
        let breakable = cycles
            .iter()
            .filter(|c| {
                c.suggestions.iter().any(|s| {
                    matches!(s, BreakSuggestion::RemoveEdge { edge_type, .. } if edge_type.is_breakable())
                })
            })
            .count();
        if breakable > 0 {
            recommendations.push(format!(
                "{} cycle(s) contain soft or optional edges and can be broken automatically",
                breakable
            ));
        }

        DetectionResult {
            has_cycles: !cycles.is_empty(),
            cycles,
            hotspots,
            recommendations,
            components,
        }
    }
}

/// Dependencies in reverse id order so popping visits them ascending.
fn dependencies_of<'a>(graph: &'a DependencyGraph, id: &str) -> Vec<&'a str> {
    graph
        .get_node(id)
        .map(|n| n.dependencies().iter().rev().map(|s| s.as_str()).collect())
        .unwrap_or_default()
}

/// Iterative Tarjan over dependency edges. Components come out in the
/// order Tarjan completes them; members are sorted by id.
pub fn strongly_connected_components(graph: &DependencyGraph) -> Vec<Vec<String>> {
    struct Frame<'a> {
        node: &'a str,
        pending: Vec<&'a str>,
    }

    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    let mut lowlink: FxHashMap<&str, usize> = FxHashMap::default();
    let mut on_stack: FxHashSet<&str> = FxHashSet::default();
    let mut stack: Vec<&str> = Vec::new();
    let mut components: Vec<Vec<String>> = Vec::new();
    let mut next_index = 0usize;

    for root in graph.node_ids() {
        if index.contains_key(root.as_str()) {
            continue;
        }
        index.insert(root.as_str(), next_index);
        lowlink.insert(root.as_str(), next_index);
        next_index += 1;
        stack.push(root.as_str());
        on_stack.insert(root.as_str());
        let mut frames = vec![Frame {
            node: root.as_str(),
            pending: dependencies_of(graph, root),
        }];

        while let Some(frame) = frames.last_mut() {
            let node = frame.node;
            if let Some(dep) = frame.pending.pop() {
                if !index.contains_key(dep) {
                    index.insert(dep, next_index);
                    lowlink.insert(dep, next_index);
                    next_index += 1;
                    stack.push(dep);
                    on_stack.insert(dep);
                    frames.push(Frame {
                        node: dep,
                        pending: dependencies_of(graph, dep),
                    });
                } else if on_stack.contains(dep) {
                    let dep_index = index[dep];
                    if let Some(low) = lowlink.get_mut(node) {
                        *low = (*low).min(dep_index);
                    }
                }
                continue;
            }

            frames.pop();
            let node_low = lowlink[node];
            if let Some(parent) = frames.last() {
                if let Some(low) = lowlink.get_mut(parent.node) {
                    *low = (*low).min(node_low);
                }
            }

            if node_low == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack.remove(member);
                    component.push(member.to_string());
                    if member == node {
                        break;
                    }
                }
                component.sort();
                components.push(component);
            }
        }
    }

    components
}

/// Find a closed path through the smallest member of a component using BFS
/// restricted to the component.
fn trace_cycle(graph: &DependencyGraph, component: &[String]) -> Option<Vec<String>> {
    let start = component.first()?;
    let members: FxHashSet<&str> = component.iter().map(|s| s.as_str()).collect();
    let mut parent: FxHashMap<&str, &str> = FxHashMap::default();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(start.as_str());

    while let Some(current) = queue.pop_front() {
        let node = graph.get_node(current)?;
        for dep in node.dependencies() {
            let dep = dep.as_str();
            if !members.contains(dep) {
                continue;
            }
            if dep == start.as_str() {
                let mut path = vec![start.to_string()];
                let mut cursor = current;
                let mut reversed = vec![cursor.to_string()];
                while cursor != start.as_str() {
                    cursor = *parent.get(cursor)?;
                    reversed.push(cursor.to_string());
                }
                reversed.pop();
                reversed.reverse();
                path.extend(reversed);
                path.push(start.to_string());
                return Some(path);
            }
            if dep != start.as_str() && !parent.contains_key(dep) {
                parent.insert(dep, current);
                queue.push_back(dep);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    fn make_task(id: &str, deps: &[&str]) -> Task {
        Task::with_deps(id, 1.0, deps)
    }

    fn build(tasks: &[Task]) -> DependencyGraph {
        DependencyGraph::build_from_tasks(tasks, true, 0).unwrap()
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(CycleSeverity::from_length(1), CycleSeverity::Critical);
        assert_eq!(CycleSeverity::from_length(2), CycleSeverity::Critical);
        assert_eq!(CycleSeverity::from_length(3), CycleSeverity::High);
        assert_eq!(CycleSeverity::from_length(4), CycleSeverity::High);
        assert_eq!(CycleSeverity::from_length(7), CycleSeverity::Medium);
        assert_eq!(CycleSeverity::from_length(8), CycleSeverity::Low);
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let graph = build(&[
            make_task("a", &[]),
            make_task("b", &["a"]),
            make_task("c", &["a", "b"]),
        ]);
        let result = CircularDetector::default().detect(&graph);
        assert!(!result.has_cycles);
        assert!(result.cycles.is_empty());
    }

    #[test]
    fn test_three_node_cycle() {
        let graph = build(&[
            make_task("a", &["b"]),
            make_task("b", &["c"]),
            make_task("c", &["a"]),
        ]);
        let result = CircularDetector::default().detect(&graph);

        assert!(result.has_cycles);
        assert_eq!(result.cycles.len(), 1);
        let cycle = &result.cycles[0];
        assert_eq!(cycle.id, "a|b|c");
        assert_eq!(cycle.len(), 3);
        assert_eq!(cycle.path.first(), cycle.path.last());
        assert_eq!(cycle.severity, CycleSeverity::High);
        // a waits on b, b waits on c, c waits on a
        assert_eq!(cycle.path, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_rotations_deduplicated() {
        let graph = build(&[
            make_task("a", &["b"]),
            make_task("b", &["a"]),
            make_task("x", &["a"]),
        ]);
        let result = CircularDetector::default().detect(&graph);
        assert_eq!(result.cycles.len(), 1);
        assert_eq!(result.cycles[0].severity, CycleSeverity::Critical);
        assert!(matches!(
            result.cycles[0].suggestions[0],
            BreakSuggestion::MergeTasks { .. }
        ));
    }

    #[test]
    fn test_stop_at_first() {
        let graph = build(&[
            make_task("a", &["b"]),
            make_task("b", &["a"]),
            make_task("c", &["d"]),
            make_task("d", &["c"]),
        ]);

        let all = CircularDetector::default().detect(&graph);
        assert_eq!(all.cycles.len(), 2);

        let first = CircularDetector::new(DetectorConfig {
            stop_at_first: true,
            ..DetectorConfig::default()
        })
        .detect(&graph);
        assert_eq!(first.cycles.len(), 1);
    }

    #[test]
    fn test_self_loop_detected() {
        let graph = build(&[make_task("a", &["a"])]);
        let result = CircularDetector::default().detect(&graph);
        assert_eq!(result.cycles.len(), 1);
        assert_eq!(result.cycles[0].path, vec!["a", "a"]);

        let exhaustive = CircularDetector::default().detect_exhaustive(&graph);
        assert_eq!(exhaustive.cycles.len(), 1);
    }

    #[test]
    fn test_hotspots_reported() {
        // hub sits on two distinct cycles
        let graph = build(&[
            make_task("hub", &["a"]),
            make_task("a", &["hub", "b"]),
            make_task("b", &["hub"]),
        ]);
        let result = CircularDetector::default().detect(&graph);
        assert!(result.cycles.len() >= 2);
        assert!(result.hotspots.iter().any(|(id, _)| id == "hub"));
        assert!(result.recommendations.iter().any(|r| r.contains("hub")));
    }

    #[test]
    fn test_breakable_edges_suggested_first() {
        let mut b = make_task("b", &[]);
        b.soft_dependencies = vec!["c".to_string()];
        let graph = build(&[make_task("a", &["b"]), b, make_task("c", &["a"])]);
        let result = CircularDetector::default().detect(&graph);

        let first = &result.cycles[0].suggestions[0];
        assert_eq!(
            first,
            &BreakSuggestion::RemoveEdge {
                from: "c".to_string(),
                to: "b".to_string(),
                edge_type: EdgeType::Soft,
            }
        );
        assert!(first.description().contains("soft"));
    }

    #[test]
    fn test_tarjan_components() {
        let graph = build(&[
            make_task("a", &["b"]),
            make_task("b", &["c"]),
            make_task("c", &["a"]),
            make_task("d", &["c"]),
            make_task("e", &[]),
        ]);
        let result = CircularDetector::default().detect_exhaustive(&graph);

        assert_eq!(result.components.len(), 3);
        assert!(result
            .components
            .contains(&vec!["a".to_string(), "b".to_string(), "c".to_string()]));
        assert_eq!(result.cycles.len(), 1);
        assert_eq!(result.cycles[0].id, "a|b|c");
        assert_eq!(result.cycles[0].path.first(), result.cycles[0].path.last());
    }

    #[test]
    fn test_detection_does_not_mutate() {
        let graph = build(&[make_task("a", &["b"]), make_task("b", &["a"])]);
        let before = graph.edges();
        let _ = CircularDetector::default().detect(&graph);
        let _ = CircularDetector::default().detect_exhaustive(&graph);
        assert_eq!(graph.edges(), before);
    }
}
