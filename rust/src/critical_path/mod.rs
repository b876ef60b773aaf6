//! Critical path analysis.
//!
//! Runs the critical path method over an already-sorted order: earliest and
//! latest timings per task, slack, the zero-slack chain, bottlenecks and
//! near-critical risk paths. Timings are written back onto the graph nodes.

mod analysis;
mod calculation;
mod types;

pub use analysis::{
    build_recommendations, extract_critical_path, find_bottlenecks, find_near_critical_paths,
};
pub use calculation::{calculate_timings, CriticalPathError, TimingTable};
pub use types::{
    Bottleneck, CriticalPathConfig, CriticalPathResult, Criticality, NearCriticalPath, RiskLevel,
    TaskTiming, SLACK_TOLERANCE,
};

use std::collections::BTreeMap;

use crate::graph::DependencyGraph;
use crate::{log_changes, log_checks};

#[derive(Clone, Debug, Default)]
pub struct CriticalPathAnalyzer {
    config: CriticalPathConfig,
}

impl CriticalPathAnalyzer {
    pub fn new(config: CriticalPathConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CriticalPathConfig {
        &self.config
    }

    /// Analyze `graph` along `order` and record timings on its nodes.
    pub fn analyze(
        &self,
        graph: &mut DependencyGraph,
        order: &[String],
    ) -> Result<CriticalPathResult, CriticalPathError> {
        let table = calculate_timings(graph, order, self.config.near_critical_threshold)?;

        for (id, timing) in table.index.ids().iter().zip(&table.timings) {
            graph.record_timing(id, timing);
        }

        let critical_path = extract_critical_path(&table);
        let bottlenecks = find_bottlenecks(graph, &table);
        let near_critical_paths = find_near_critical_paths(&table, &self.config);
        let recommendations =
            build_recommendations(&table, &bottlenecks, &near_critical_paths, &self.config);

        for bottleneck in &bottlenecks {
            log_checks!(
                self.config.verbosity,
                "Bottleneck {} (impact {:.1}h, {} dependents)",
                bottleneck.task_id,
                bottleneck.impact_hours,
                bottleneck.dependent_count
            );
        }
        log_changes!(
            self.config.verbosity,
            "Critical path: {} tasks, {:.1} hours, {} bottlenecks",
            critical_path.len(),
            table.total_duration,
            bottlenecks.len()
        );

        let task_timings: BTreeMap<String, TaskTiming> = table
            .index
            .ids()
            .iter()
            .cloned()
            .zip(table.timings.iter().cloned())
            .collect();

        Ok(CriticalPathResult {
            critical_path,
            total_duration: table.total_duration,
            estimated_days: table.total_duration / self.config.hours_per_day,
            bottlenecks,
            near_critical_paths,
            task_timings,
            recommendations,
        })
    }
}
