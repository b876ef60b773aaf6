//! Derived views over CPM timings: critical path, bottlenecks, risk paths.

use rustc_hash::FxHashSet;

use crate::graph::DependencyGraph;
use crate::interner::TaskIdx;

use super::calculation::TimingTable;
use super::types::{Bottleneck, CriticalPathConfig, Criticality, NearCriticalPath, RiskLevel};

/// Critical tasks ordered by earliest start, ties by position in the sorted order.
pub fn extract_critical_path(table: &TimingTable) -> Vec<String> {
    let mut critical: Vec<TaskIdx> = (0..table.len())
        .filter(|&idx| table.timings[idx].is_critical())
        .collect();
    critical.sort_by(|&a, &b| {
        table.timings[a]
            .earliest_start
            .total_cmp(&table.timings[b].earliest_start)
            .then(a.cmp(&b))
    });
    critical
        .into_iter()
        .map(|idx| table.index.ids()[idx].clone())
        .collect()
}

/// Critical tasks that fan out or feed another critical task, by impact descending.
pub fn find_bottlenecks(graph: &DependencyGraph, table: &TimingTable) -> Vec<Bottleneck> {
    let mut bottlenecks = Vec::new();

    for idx in 0..table.len() {
        if !table.timings[idx].is_critical() {
            continue;
        }
        let dependent_count = table.dependents[idx].len();
        let critical_dependents = table.dependents[idx]
            .iter()
            .filter(|&&d| table.timings[d].is_critical())
            .count();
        if dependent_count <= 1 && critical_dependents == 0 {
            continue;
        }

        let id = &table.index.ids()[idx];
        let impact_hours = graph
            .get_descendants(id)
            .iter()
            .filter_map(|desc| table.index.get(desc))
            .filter(|&d| table.timings[d].is_critical())
            .map(|d| table.durations[d])
            .sum();

        bottlenecks.push(Bottleneck {
            task_id: id.clone(),
            dependent_count,
            critical_dependents,
            impact_hours,
        });
    }

    bottlenecks.sort_by(|a, b| {
        b.impact_hours
            .total_cmp(&a.impact_hours)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });
    bottlenecks
}

/// Trace chains of non-critical tasks starting at each near-critical task.
///
/// From a start node the trace repeatedly steps to the unvisited non-critical
/// dependent with the smallest slack. Paths are ranked by their minimum slack.
pub fn find_near_critical_paths(
    table: &TimingTable,
    config: &CriticalPathConfig,
) -> Vec<NearCriticalPath> {
    let mut visited: FxHashSet<TaskIdx> = FxHashSet::default();
    let mut paths: Vec<NearCriticalPath> = Vec::new();

    for start in 0..table.len() {
        if table.timings[start].criticality != Criticality::NearCritical || visited.contains(&start)
        {
            continue;
        }

        let mut path = vec![start];
        visited.insert(start);
        let mut cursor = start;

        while let Some(next) = table.dependents[cursor]
            .iter()
            .copied()
            .filter(|d| !table.timings[*d].is_critical() && !visited.contains(d))
            .min_by(|&a, &b| {
                table.timings[a]
                    .slack
                    .total_cmp(&table.timings[b].slack)
                    .then(a.cmp(&b))
            })
        {
            visited.insert(next);
            path.push(next);
            cursor = next;
        }

        let slack = path
            .iter()
            .map(|&idx| table.timings[idx].slack)
            .fold(f64::INFINITY, f64::min);
        let risk = if slack < config.high_risk_slack {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };
        paths.push(NearCriticalPath {
            path: path
                .into_iter()
                .map(|idx| table.index.ids()[idx].clone())
                .collect(),
            slack,
            risk,
        });
    }

    paths.sort_by(|a, b| a.slack.total_cmp(&b.slack).then_with(|| a.path.cmp(&b.path)));
    paths.truncate(config.max_near_critical_paths);
    paths
}

pub fn build_recommendations(
    table: &TimingTable,
    bottlenecks: &[Bottleneck],
    near_critical: &[NearCriticalPath],
    config: &CriticalPathConfig,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if let Some(top) = bottlenecks.first() {
        recommendations.push(format!(
            "Prioritize '{}': a delay pushes back {:.1} hours of downstream critical work",
            top.task_id, top.impact_hours
        ));
    }

    let flexible: Vec<&str> = (0..table.len())
        .filter(|&idx| table.timings[idx].slack >= config.significant_slack_hours)
        .filter_map(|idx| table.index.resolve(idx))
        .collect();
    if !flexible.is_empty() {
        recommendations.push(format!(
            "{} task(s) have at least {:.1} hours of slack and can be rescheduled or run in parallel: {}",
            flexible.len(),
            config.significant_slack_hours,
            flexible.join(", ")
        ));
    }

    if !near_critical.is_empty() {
        let high = near_critical
            .iter()
            .filter(|p| p.risk == RiskLevel::High)
            .count();
        recommendations.push(format!(
            "{} near-critical path(s) ({} high risk) could become critical if delayed",
            near_critical.len(),
            high
        ));
    }

    recommendations
}
