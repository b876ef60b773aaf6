//! Cycle breaking as a separate transformation.
//!
//! `plan_cycle_breaks` only decides which edges to drop; `apply_cycle_breaks`
//! returns a new graph without them. Only soft and optional edges are ever
//! candidates.

use crate::config::CycleBreakStrategy;
use crate::cycles::Cycle;
use crate::graph::{DependencyGraph, Edge};
use crate::models::EdgeType;

/// Edges chosen for removal and the cycles no breakable edge can fix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BreakPlan {
    pub remove: Vec<Edge>,
    pub unbreakable: Vec<Cycle>,
}

impl BreakPlan {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty()
    }
}

/// Optional edges are weaker than soft ones.
fn edge_strength(edge_type: EdgeType) -> u8 {
    match edge_type {
        EdgeType::Optional => 0,
        EdgeType::Soft => 1,
        EdgeType::Hard => 2,
    }
}

/// Priority of an edge is the priority of the task waiting on it.
fn edge_priority(graph: &DependencyGraph, edge: &Edge) -> i32 {
    graph
        .get_node(&edge.to)
        .map(|n| n.task.priority)
        .unwrap_or(0)
}

/// Pick one breakable edge per cycle. Cycles already cut by an earlier pick
/// in the same plan are skipped.
pub fn plan_cycle_breaks(
    graph: &DependencyGraph,
    cycles: &[Cycle],
    strategy: CycleBreakStrategy,
) -> BreakPlan {
    let mut plan = BreakPlan::default();

    for cycle in cycles {
        let candidates: Vec<Edge> = cycle
            .edges()
            .into_iter()
            .filter_map(|(from, to)| {
                let edge_type = graph.edge_type(from, to)?;
                edge_type.is_breakable().then(|| Edge {
                    from: from.to_string(),
                    to: to.to_string(),
                    edge_type,
                })
            })
            .collect();

        if candidates.iter().any(|c| plan.remove.contains(c)) {
            continue;
        }

        let chosen = match strategy {
            CycleBreakStrategy::LowestPriority => candidates.into_iter().min_by_key(|e| {
                (
                    edge_priority(graph, e),
                    edge_strength(e.edge_type),
                    (e.from.clone(), e.to.clone()),
                )
            }),
            CycleBreakStrategy::WeakestEdge => candidates.into_iter().min_by_key(|e| {
                (
                    edge_strength(e.edge_type),
                    edge_priority(graph, e),
                    (e.from.clone(), e.to.clone()),
                )
            }),
        };

        match chosen {
            Some(edge) => plan.remove.push(edge),
            None => plan.unbreakable.push(cycle.clone()),
        }
    }

    plan
}

/// Copy of `graph` with the planned edges removed.
pub fn apply_cycle_breaks(graph: &DependencyGraph, plan: &BreakPlan) -> DependencyGraph {
    let mut broken = graph.clone();
    for edge in &plan.remove {
        broken.remove_edge(&edge.from, &edge.to);
    }
    broken
}
