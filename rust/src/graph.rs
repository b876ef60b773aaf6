//! Dependency graph over tasks.
//!
//! Nodes live in one owning map keyed by task id and refer to each other only
//! by id. `dependents` is the derived inverse of `dependencies`; both sets are
//! updated together by every mutation so they never diverge.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use thiserror::Error;

use crate::critical_path::TaskTiming;
use crate::log_checks;
use crate::models::{EdgeType, Task, TaskStatus};

/// Upper bound on a single task duration, in hours (roughly a century of work).
pub const MAX_TASK_DURATION_HOURS: f64 = 1_000_000.0;

/// Errors raised while building or querying the graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Self-dependency not allowed: {0}")]
    SelfDependency(String),
    #[error("Task {task} has invalid duration {duration}")]
    InvalidDuration { task: String, duration: f64 },
    #[error("Task not found: {0}")]
    NodeNotFound(String),
    #[error("Graph contains a cycle; {unresolved} nodes could not be assigned a depth")]
    CycleDetected { unresolved: usize },
}

/// A directed dependency edge: `to` waits on `from`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub edge_type: EdgeType,
}

/// One task inside the graph plus its derived adjacency and analysis fields.
#[derive(Clone, Debug)]
pub struct GraphNode {
    pub task: Task,
    /// Ids this node waits on.
    dependencies: BTreeSet<String>,
    /// Ids waiting on this node.
    dependents: BTreeSet<String>,
    /// Edge type of each outgoing edge, keyed by dependent id.
    edge_types: FxHashMap<String, EdgeType>,
    pub depth: usize,
    pub earliest_start: f64,
    pub earliest_finish: f64,
    pub latest_start: f64,
    pub latest_finish: f64,
    pub slack: f64,
    pub status: TaskStatus,
}

impl GraphNode {
    fn new(task: Task) -> Self {
        Self {
            task,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            edge_types: FxHashMap::default(),
            depth: 0,
            earliest_start: 0.0,
            earliest_finish: 0.0,
            latest_start: 0.0,
            latest_finish: 0.0,
            slack: 0.0,
            status: TaskStatus::Pending,
        }
    }

    pub fn id(&self) -> &str {
        &self.task.id
    }

    pub fn duration(&self) -> f64 {
        self.task.duration
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn dependents(&self) -> &BTreeSet<String> {
        &self.dependents
    }

    /// Type of the edge from this node to `dependent`.
    pub fn edge_type_to(&self, dependent: &str) -> Option<EdgeType> {
        self.edge_types.get(dependent).copied()
    }
}

/// Summary counts for a graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub hard_edges: usize,
    pub soft_edges: usize,
    pub optional_edges: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    pub isolated_count: usize,
    /// Deepest level, or None when the graph has a cycle.
    pub max_depth: Option<usize>,
}

/// Directed graph of tasks keyed by id.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    nodes: FxHashMap<String, GraphNode>,
    /// Insertion order, for deterministic iteration.
    order: Vec<String>,
    warnings: Vec<String>,
    allow_self_dependency: bool,
    verbosity: u8,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph that accepts tasks depending on themselves.
    pub fn allowing_self_dependency() -> Self {
        Self {
            allow_self_dependency: true,
            ..Self::default()
        }
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Build a graph from tasks: all nodes first, then all edges.
    ///
    /// Dependencies on unknown ids are skipped with a warning. A duplicate id
    /// keeps its first occurrence.
    pub fn build_from_tasks(
        tasks: &[Task],
        allow_self_dependency: bool,
        verbosity: u8,
    ) -> Result<Self, GraphError> {
        let mut graph = Self {
            allow_self_dependency,
            verbosity,
            ..Self::default()
        };

        for task in tasks {
            graph.add_node(task.clone())?;
        }

        // Edges come from the surviving node of each id, not from duplicates
        let ids = graph.order.clone();
        for id in &ids {
            let declared: Vec<(String, EdgeType)> = match graph.nodes.get(id) {
                Some(node) => node
                    .task
                    .typed_dependencies()
                    .into_iter()
                    .map(|(dep, edge_type)| (dep.to_string(), edge_type))
                    .collect(),
                None => continue,
            };
            for (dep, edge_type) in declared {
                if !graph.nodes.contains_key(&dep) {
                    let warning =
                        format!("Task {} depends on unknown task {}; dependency skipped", id, dep);
                    log_checks!(graph.verbosity, "{}", warning);
                    graph.warnings.push(warning);
                    continue;
                }
                graph.add_edge(&dep, id, edge_type)?;
            }
        }

        Ok(graph)
    }

    /// Add a node for `task`. Returns false when the id already exists.
    pub fn add_node(&mut self, task: Task) -> Result<bool, GraphError> {
        if self.nodes.contains_key(&task.id) {
            let warning = format!("Duplicate task id {}; keeping first occurrence", task.id);
            log_checks!(self.verbosity, "{}", warning);
            self.warnings.push(warning);
            return Ok(false);
        }

        if !task.duration.is_finite()
            || task.duration < 0.0
            || task.duration > MAX_TASK_DURATION_HOURS
        {
            return Err(GraphError::InvalidDuration {
                task: task.id,
                duration: task.duration,
            });
        }

        if !self.allow_self_dependency
            && task
                .typed_dependencies()
                .iter()
                .any(|(dep, _)| *dep == task.id)
        {
            return Err(GraphError::SelfDependency(task.id));
        }

        self.order.push(task.id.clone());
        self.nodes.insert(task.id.clone(), GraphNode::new(task));
        Ok(true)
    }

    /// Add an edge meaning `to` depends on `from`. Re-adding an edge updates its type.
    pub fn add_edge(&mut self, from: &str, to: &str, edge_type: EdgeType) -> Result<(), GraphError> {
        if from == to && !self.allow_self_dependency {
            return Err(GraphError::SelfDependency(from.to_string()));
        }
        if !self.nodes.contains_key(to) {
            return Err(GraphError::NodeNotFound(to.to_string()));
        }
        let from_node = self
            .nodes
            .get_mut(from)
            .ok_or_else(|| GraphError::NodeNotFound(from.to_string()))?;
        from_node.dependents.insert(to.to_string());
        from_node.edge_types.insert(to.to_string(), edge_type);

        if let Some(to_node) = self.nodes.get_mut(to) {
            to_node.dependencies.insert(from.to_string());
        }
        Ok(())
    }

    /// Remove the edge `from -> to`. Returns the removed edge type.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> Option<EdgeType> {
        let from_node = self.nodes.get_mut(from)?;
        if !from_node.dependents.remove(to) {
            return None;
        }
        let edge_type = from_node.edge_types.remove(to);
        if let Some(to_node) = self.nodes.get_mut(to) {
            to_node.dependencies.remove(from);
        }
        edge_type
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<GraphNode> {
        let node = self.nodes.remove(id)?;
        for dep in &node.dependencies {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.dependents.remove(id);
                dep_node.edge_types.remove(id);
            }
        }
        for dependent in &node.dependents {
            if let Some(dependent_node) = self.nodes.get_mut(dependent) {
                dependent_node.dependencies.remove(id);
            }
        }
        self.order.retain(|existing| existing != id);
        Some(node)
    }

    pub fn get_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> &[String] {
        &self.order
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Warnings collected while building the graph.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Direct dependencies of a node, sorted by id.
    pub fn get_dependencies(&self, id: &str) -> Vec<String> {
        self.nodes
            .get(id)
            .map(|n| n.dependencies.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependents of a node, sorted by id.
    pub fn get_dependents(&self, id: &str) -> Vec<String> {
        self.nodes
            .get(id)
            .map(|n| n.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Type of the edge `from -> to`, if present.
    pub fn edge_type(&self, from: &str, to: &str) -> Option<EdgeType> {
        self.nodes.get(from).and_then(|n| n.edge_type_to(to))
    }

    /// All edges, sorted by (from, to).
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .nodes
            .values()
            .flat_map(|node| {
                node.dependents.iter().map(move |to| Edge {
                    from: node.task.id.clone(),
                    to: to.clone(),
                    edge_type: node.edge_type_to(to).unwrap_or(EdgeType::Hard),
                })
            })
            .collect();
        edges.sort();
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.dependents.len()).sum()
    }

    /// Every node reachable by following dependencies, sorted by id.
    pub fn get_ancestors(&self, id: &str) -> Vec<String> {
        self.transitive(id, |node| &node.dependencies)
    }

    /// Every node reachable by following dependents, sorted by id.
    pub fn get_descendants(&self, id: &str) -> Vec<String> {
        self.transitive(id, |node| &node.dependents)
    }

    /// Transitive closure with a visited set scoped to this call.
    fn transitive<F>(&self, id: &str, next: F) -> Vec<String>
    where
        F: Fn(&GraphNode) -> &BTreeSet<String>,
    {
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut stack: Vec<&str> = match self.nodes.get(id) {
            Some(node) => next(node).iter().map(|s| s.as_str()).collect(),
            None => return Vec::new(),
        };

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                stack.extend(next(node).iter().map(|s| s.as_str()));
            }
        }

        // A cycle back to the start node is not an ancestor of itself
        visited.remove(id);
        let mut result: Vec<String> = visited.into_iter().map(|s| s.to_string()).collect();
        result.sort();
        result
    }

    /// Nodes without dependencies, in insertion order.
    pub fn get_root_nodes(&self) -> Vec<String> {
        self.nodes()
            .filter(|n| n.dependencies.is_empty())
            .map(|n| n.task.id.clone())
            .collect()
    }

    /// Nodes without dependents, in insertion order.
    pub fn get_leaf_nodes(&self) -> Vec<String> {
        self.nodes()
            .filter(|n| n.dependents.is_empty())
            .map(|n| n.task.id.clone())
            .collect()
    }

    /// Assign `depth = 1 + max(parent depths)` starting from roots at depth 0.
    ///
    /// Returns the maximum depth. Nodes are only processed once all their
    /// dependencies are, so a cycle leaves nodes unassigned and fails.
    pub fn calculate_depths(&mut self) -> Result<usize, GraphError> {
        let mut remaining: FxHashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(id, n)| (id.as_str(), n.dependencies.len()))
            .collect();
        let mut depths: FxHashMap<String, usize> = FxHashMap::default();
        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .filter(|id| remaining.get(id.as_str()) == Some(&0))
            .map(|id| id.as_str())
            .collect();

        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let depth = node
                .dependencies
                .iter()
                .filter_map(|dep| depths.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depths.insert(id.to_string(), depth);

            for dependent in &node.dependents {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        let unresolved = self.nodes.len() - depths.len();
        let max_depth = depths.values().copied().max().unwrap_or(0);
        for (id, depth) in depths {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.depth = depth;
            }
        }

        if unresolved > 0 {
            return Err(GraphError::CycleDetected { unresolved });
        }
        Ok(max_depth)
    }

    /// Quick acyclicity probe using an iterative three-color DFS.
    pub fn is_dag(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: FxHashMap<&str, Color> = self
            .nodes
            .keys()
            .map(|id| (id.as_str(), Color::White))
            .collect();

        for start in &self.order {
            if color.get(start.as_str()) != Some(&Color::White) {
                continue;
            }
            let mut stack: Vec<(&str, Vec<&str>)> = vec![(start.as_str(), self.next_deps(start))];
            color.insert(start.as_str(), Color::Gray);

            while let Some((current, pending)) = stack.last_mut() {
                match pending.pop() {
                    Some(dep) => match color.get(dep).copied() {
                        Some(Color::Gray) => return false,
                        Some(Color::White) => {
                            color.insert(dep, Color::Gray);
                            let deps = self.next_deps(dep);
                            stack.push((dep, deps));
                        }
                        _ => {}
                    },
                    None => {
                        color.insert(*current, Color::Black);
                        stack.pop();
                    }
                }
            }
        }
        true
    }

    fn next_deps(&self, id: &str) -> Vec<&str> {
        self.nodes
            .get(id)
            .map(|n| n.dependencies.iter().rev().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Update the informational status of a node.
    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        node.status = status;
        Ok(())
    }

    /// Store critical path timings on a node.
    pub fn record_timing(&mut self, id: &str, timing: &TaskTiming) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.earliest_start = timing.earliest_start;
            node.earliest_finish = timing.earliest_finish;
            node.latest_start = timing.latest_start;
            node.latest_finish = timing.latest_finish;
            node.slack = timing.slack;
        }
    }

    /// Counts describing the graph. Computes depths on a scratch copy.
    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            node_count: self.nodes.len(),
            ..GraphStats::default()
        };
        for node in self.nodes.values() {
            for to in &node.dependents {
                stats.edge_count += 1;
                match node.edge_type_to(to).unwrap_or(EdgeType::Hard) {
                    EdgeType::Hard => stats.hard_edges += 1,
                    EdgeType::Soft => stats.soft_edges += 1,
                    EdgeType::Optional => stats.optional_edges += 1,
                }
            }
            let root = node.dependencies.is_empty();
            let leaf = node.dependents.is_empty();
            if root {
                stats.root_count += 1;
            }
            if leaf {
                stats.leaf_count += 1;
            }
            if root && leaf {
                stats.isolated_count += 1;
            }
        }
        stats.max_depth = self.clone().calculate_depths().ok();
        stats
    }
}
