//! Resolver facade.
//!
//! Runs the pipeline for one task list: build graph, detect cycles (and
//! optionally break them), sort, block, analyze the critical path and
//! generate the schedule. A failing stage stops the run; the result keeps the
//! metrics gathered up to that point. Every component is rebuilt per call, so
//! a `Resolver` carries only configuration, observers and running totals.

mod breaking;
mod events;
mod result;

pub use breaking::{apply_cycle_breaks, plan_cycle_breaks, BreakPlan};
pub use events::{ResolutionObserver, ResolutionStage, ResolverEvent};
pub use result::{
    ErrorKind, ResolutionError, ResolutionMetrics, ResolutionResult, ResolverStats,
    ValidationReport,
};

use rustc_hash::FxHashSet;
use std::time::Instant;

use crate::blocker::{BlockingResult, ExecutionBlock, ParallelBlocker};
use crate::config::ResolverConfig;
use crate::critical_path::CriticalPathAnalyzer;
use crate::cycles::{CircularDetector, Cycle};
use crate::graph::DependencyGraph;
use crate::models::Task;
use crate::scheduler::{ExecutionSchedule, ScheduleGenerator};
use crate::sorter::TopologicalSorter;
use crate::{log_changes, log_checks};

/// Which optional stages a run includes.
#[derive(Clone, Copy, Debug)]
struct RunPlan {
    through: ResolutionStage,
    critical_path: bool,
    schedule: bool,
}

pub struct Resolver {
    config: ResolverConfig,
    observers: Vec<Box<dyn ResolutionObserver>>,
    stats: ResolverStats,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            observers: Vec::new(),
            stats: ResolverStats::default(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn stats(&self) -> &ResolverStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ResolverStats::default();
    }

    /// Register an observer; events are delivered in stage order.
    pub fn add_observer<O>(&mut self, observer: O)
    where
        O: ResolutionObserver + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Run the full pipeline as configured.
    pub fn resolve(&mut self, tasks: &[Task]) -> ResolutionResult {
        let plan = RunPlan {
            through: ResolutionStage::Schedule,
            critical_path: self.config.analyze_critical_path,
            schedule: self.config.generate_schedule,
        };
        self.run(tasks, plan)
    }

    /// Sorted execution order only.
    pub fn resolve_order(&mut self, tasks: &[Task]) -> Result<Vec<String>, ResolutionError> {
        let result = self.run(
            tasks,
            RunPlan {
                through: ResolutionStage::Sorting,
                critical_path: false,
                schedule: false,
            },
        );
        into_outcome(result, |r| r.sorted_order)
    }

    /// Execution blocks only.
    pub fn resolve_blocks(
        &mut self,
        tasks: &[Task],
    ) -> Result<Vec<ExecutionBlock>, ResolutionError> {
        let result = self.run(
            tasks,
            RunPlan {
                through: ResolutionStage::Blocking,
                critical_path: false,
                schedule: false,
            },
        );
        into_outcome(result, |r| r.parallel_blocks)
    }

    /// Schedule with critical path analysis, regardless of the stage toggles.
    pub fn resolve_schedule(
        &mut self,
        tasks: &[Task],
    ) -> Result<ExecutionSchedule, ResolutionError> {
        let result = self.run(
            tasks,
            RunPlan {
                through: ResolutionStage::Schedule,
                critical_path: true,
                schedule: true,
            },
        );
        if let Some(error) = result.errors.first() {
            return Err(error.clone());
        }
        result.schedule.ok_or_else(|| {
            ResolutionError::unexpected(ResolutionStage::Schedule, "no schedule produced")
        })
    }

    /// Graph build plus cycle detection, without touching stats or observers.
    pub fn validate_tasks(&self, tasks: &[Task]) -> ValidationReport {
        let graph = match DependencyGraph::build_from_tasks(
            tasks,
            self.config.allow_self_dependency,
            self.config.verbosity,
        ) {
            Ok(graph) => graph,
            Err(e) => {
                return ValidationReport {
                    valid: false,
                    stats: Default::default(),
                    cycles: Vec::new(),
                    errors: vec![ResolutionError::unexpected(ResolutionStage::GraphBuild, e)],
                    warnings: Vec::new(),
                }
            }
        };

        let detection = CircularDetector::new(self.config.detector_config()).detect(&graph);
        let errors = if detection.has_cycles {
            vec![ResolutionError::circular(detection.cycles.clone())]
        } else {
            Vec::new()
        };
        ValidationReport {
            valid: errors.is_empty(),
            stats: graph.stats(),
            cycles: detection.cycles,
            errors,
            warnings: graph.warnings().to_vec(),
        }
    }

    fn emit(&mut self, event: ResolverEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }

    fn stage_done(&mut self, stage: ResolutionStage, summary: String) {
        log_changes!(self.config.verbosity, "[{}] {}", stage, summary);
        self.emit(ResolverEvent::StageCompleted { stage, summary });
    }

    fn run(&mut self, tasks: &[Task], plan: RunPlan) -> ResolutionResult {
        let started = Instant::now();
        self.emit(ResolverEvent::Started {
            task_count: tasks.len(),
        });

        let mut result = ResolutionResult::default();
        let outcome = self.run_stages(tasks, plan, &mut result);
        if let Err(error) = outcome {
            log_changes!(self.config.verbosity, "Resolution failed: {}", error);
            self.emit(ResolverEvent::Error {
                error: error.clone(),
            });
            result.errors.push(error);
        }
        result.success = result.errors.is_empty();

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        result.metrics.resolution_time_ms = elapsed_ms;

        self.stats.resolutions_performed += 1;
        if !result.success {
            self.stats.failed_resolutions += 1;
        }
        self.stats.total_time_ms += elapsed_ms;
        self.stats.cycles_found += result.metrics.cycles_detected;
        self.stats.cycles_broken += result.metrics.cycles_broken;

        self.emit(ResolverEvent::Finished {
            success: result.success,
            elapsed_ms,
        });
        result
    }

    fn run_stages(
        &mut self,
        tasks: &[Task],
        plan: RunPlan,
        result: &mut ResolutionResult,
    ) -> Result<(), ResolutionError> {
        let config = self.config.clone();
        config
            .validate()
            .map_err(|e| ResolutionError::unexpected(ResolutionStage::Configuration, e))?;

        // Graph build
        let mut graph =
            DependencyGraph::build_from_tasks(tasks, config.allow_self_dependency, config.verbosity)
                .map_err(|e| ResolutionError::unexpected(ResolutionStage::GraphBuild, e))?;
        result.metrics.task_count = graph.len();
        result.metrics.dependency_count = graph.edge_count();
        for warning in graph.warnings() {
            self.emit(ResolverEvent::Warning {
                message: warning.clone(),
            });
        }
        result.warnings.extend(graph.warnings().iter().cloned());
        self.stage_done(
            ResolutionStage::GraphBuild,
            format!(
                "{} tasks, {} dependencies, {} warnings",
                graph.len(),
                graph.edge_count(),
                graph.warnings().len()
            ),
        );

        // Cycle detection and breaking
        let detector = CircularDetector::new(config.detector_config());
        let mut detection = detector.detect(&graph);
        let mut seen_cycles: FxHashSet<String> =
            detection.cycles.iter().map(|c| c.id.clone()).collect();
        result.metrics.cycles_detected = seen_cycles.len();
        self.emit(ResolverEvent::CyclesDetected {
            count: detection.cycles.len(),
        });
        self.stage_done(
            ResolutionStage::CycleDetection,
            format!("{} cycle(s)", detection.cycles.len()),
        );

        if detection.has_cycles {
            if !config.break_cycles {
                return Err(ResolutionError::circular(detection.cycles));
            }

            let mut broken_cycles = 0;
            while detection.has_cycles {
                let break_plan =
                    plan_cycle_breaks(&graph, &detection.cycles, config.cycle_break_strategy);
                if break_plan.is_empty() {
                    result.metrics.cycles_broken = broken_cycles;
                    return Err(ResolutionError::circular(unresolved(
                        break_plan.unbreakable,
                        detection.cycles,
                    )));
                }

                broken_cycles += detection.cycles.len() - break_plan.unbreakable.len();
                for edge in &break_plan.remove {
                    let message = format!(
                        "Removed {} dependency to break a cycle: {} no longer waits on {}",
                        edge.edge_type.as_str(),
                        edge.to,
                        edge.from
                    );
                    log_checks!(config.verbosity, "{}", message);
                    result.warnings.push(message);
                }
                self.emit(ResolverEvent::EdgesRemoved {
                    edges: break_plan.remove.clone(),
                });

                graph = apply_cycle_breaks(&graph, &break_plan);
                result.removed_edges.extend(break_plan.remove);
                detection = detector.detect(&graph);
                for cycle in &detection.cycles {
                    seen_cycles.insert(cycle.id.clone());
                }
            }

            result.metrics.cycles_detected = seen_cycles.len();
            result.metrics.cycles_broken = broken_cycles;
            self.stage_done(
                ResolutionStage::CycleBreaking,
                format!(
                    "removed {} edge(s), broke {} cycle(s)",
                    result.removed_edges.len(),
                    broken_cycles
                ),
            );
        }

        // Sorting
        let sorted = TopologicalSorter::new(config.sort_algorithm, config.verbosity)
            .sort(&graph)
            .map_err(|e| {
                ResolutionError::new(ErrorKind::SortFailed, ResolutionStage::Sorting, e.to_string())
            })?;
        result.sorted_order = sorted.order;
        result.levels = sorted.levels;
        self.stage_done(
            ResolutionStage::Sorting,
            format!(
                "{} tasks in {} levels ({})",
                result.sorted_order.len(),
                result.levels.len(),
                sorted.algorithm
            ),
        );
        if plan.through <= ResolutionStage::Sorting {
            return Ok(());
        }

        // Blocking
        let BlockingResult {
            success,
            blocks,
            max_parallelism,
            error,
            ..
        } = ParallelBlocker::new(config.blocker_config())
            .create_blocks_from_levels(&graph, &result.levels);
        if !success {
            let message = error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "block partitioning failed".to_string());
            return Err(ResolutionError::unexpected(ResolutionStage::Blocking, message));
        }
        result.metrics.block_count = blocks.len();
        result.metrics.max_parallelism = max_parallelism;
        result.parallel_blocks = blocks;
        self.stage_done(
            ResolutionStage::Blocking,
            format!(
                "{} blocks, max parallelism {}",
                result.parallel_blocks.len(),
                max_parallelism
            ),
        );
        if plan.through <= ResolutionStage::Blocking {
            return Ok(());
        }

        // Critical path
        if plan.critical_path {
            let analysis = CriticalPathAnalyzer::new(config.critical_path_config())
                .analyze(&mut graph, &result.sorted_order)
                .map_err(|e| ResolutionError::unexpected(ResolutionStage::CriticalPath, e))?;
            result.metrics.critical_path_length = analysis.critical_path.len();
            result.metrics.total_duration_hours = analysis.total_duration;
            self.stage_done(
                ResolutionStage::CriticalPath,
                format!(
                    "{} critical tasks, {:.1} hours",
                    analysis.critical_path.len(),
                    analysis.total_duration
                ),
            );
            result.critical_path = Some(analysis);
        }

        // Schedule
        if plan.schedule {
            let schedule = ScheduleGenerator::new(config.schedule_config()).generate_from(
                &graph,
                &result.sorted_order,
                &result.parallel_blocks,
                result.critical_path.as_ref(),
            );
            for warning in &schedule.warnings {
                self.emit(ResolverEvent::Warning {
                    message: warning.clone(),
                });
            }
            result.warnings.extend(schedule.warnings.iter().cloned());
            if result.critical_path.is_none() {
                result.metrics.total_duration_hours = schedule.makespan();
            }
            let failure = schedule.errors.first().cloned();
            self.stage_done(
                ResolutionStage::Schedule,
                format!(
                    "{} ({:.1} hours)",
                    schedule.status.as_str(),
                    schedule.makespan()
                ),
            );
            result.schedule = Some(schedule);
            if let Some(message) = failure {
                return Err(ResolutionError::unexpected(ResolutionStage::Schedule, message));
            }
        }

        Ok(())
    }
}

/// Cycles left after breaking: the unbreakable ones, or all remaining when
/// the plan could not classify them.
fn unresolved(unbreakable: Vec<Cycle>, remaining: Vec<Cycle>) -> Vec<Cycle> {
    if unbreakable.is_empty() {
        remaining
    } else {
        unbreakable
    }
}

fn into_outcome<T>(
    result: ResolutionResult,
    take: impl FnOnce(ResolutionResult) -> T,
) -> Result<T, ResolutionError> {
    match result.errors.first() {
        Some(error) => Err(error.clone()),
        None => Ok(take(result)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParallelStrategy;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn make_task(id: &str, duration: f64, deps: &[&str]) -> Task {
        Task::with_deps(id, duration, deps)
    }

    fn chain() -> Vec<Task> {
        vec![
            make_task("t1", 1.0, &[]),
            make_task("t2", 2.0, &["t1"]),
            make_task("t3", 3.0, &["t2"]),
            make_task("t4", 2.0, &["t3"]),
        ]
    }

    #[test]
    fn test_resolve_chain() {
        let mut resolver = Resolver::default();
        let result = resolver.resolve(&chain());

        assert!(result.success);
        assert_eq!(result.sorted_order, vec!["t1", "t2", "t3", "t4"]);
        assert_eq!(result.metrics.task_count, 4);
        assert_eq!(result.metrics.dependency_count, 3);
        assert_eq!(result.metrics.critical_path_length, 4);
        assert!((result.metrics.total_duration_hours - 8.0).abs() < 1e-9);
        assert_eq!(result.metrics.max_parallelism, 1);
        assert!(result.schedule.is_some());
        assert_eq!(resolver.stats().resolutions_performed, 1);
    }

    #[test]
    fn test_cycle_fails_without_breaking() {
        let tasks = vec![
            make_task("a", 1.0, &["c"]),
            make_task("b", 1.0, &["a"]),
            make_task("c", 1.0, &["b"]),
        ];
        let mut resolver = Resolver::default();
        let result = resolver.resolve(&tasks);

        assert!(!result.success);
        assert!(result.has_error(ErrorKind::CircularDependency));
        assert_eq!(result.first_error().unwrap().cycles.len(), 1);
        assert_eq!(result.metrics.cycles_detected, 1);
        assert_eq!(result.metrics.task_count, 3);
        assert!(result.sorted_order.is_empty());
        assert_eq!(resolver.stats().failed_resolutions, 1);
        assert_eq!(resolver.stats().cycles_found, 1);
    }

    #[test]
    fn test_soft_cycle_broken() {
        let mut a = make_task("a", 1.0, &[]);
        a.soft_dependencies = vec!["b".to_string()];
        let b = make_task("b", 1.0, &["a"]);
        let config = ResolverConfig {
            break_cycles: true,
            ..ResolverConfig::default()
        };
        let mut resolver = Resolver::new(config);
        let result = resolver.resolve(&[a, b]);

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.sorted_order, vec!["a", "b"]);
        assert_eq!(result.removed_edges.len(), 1);
        assert_eq!(result.metrics.cycles_broken, 1);
        assert!(result.warnings.iter().any(|w| w.contains("no longer waits on b")));
        assert_eq!(resolver.stats().cycles_broken, 1);
    }

    #[test]
    fn test_hard_cycle_survives_breaking() {
        let tasks = vec![make_task("x", 1.0, &["y"]), make_task("y", 1.0, &["x"])];
        let config = ResolverConfig {
            break_cycles: true,
            ..ResolverConfig::default()
        };
        let result = Resolver::new(config).resolve(&tasks);

        assert!(!result.success);
        let error = result.first_error().unwrap();
        assert_eq!(error.kind, ErrorKind::CircularDependency);
        assert_eq!(error.cycles.len(), 1);
        assert!(error.cycles[0]
            .suggestions
            .iter()
            .any(|s| matches!(s, crate::cycles::BreakSuggestion::MergeTasks { .. })));
    }

    #[test]
    fn test_self_dependency_is_unexpected_error() {
        let result = Resolver::default().resolve(&[make_task("loop", 1.0, &["loop"])]);
        let error = result.first_error().unwrap();
        assert_eq!(error.kind, ErrorKind::UnexpectedError);
        assert_eq!(error.stage, ResolutionStage::GraphBuild);
    }

    #[test]
    fn test_stage_toggles() {
        let config = ResolverConfig {
            analyze_critical_path: false,
            generate_schedule: false,
            ..ResolverConfig::default()
        };
        let result = Resolver::new(config).resolve(&chain());
        assert!(result.success);
        assert!(result.critical_path.is_none());
        assert!(result.schedule.is_none());
        assert_eq!(result.metrics.block_count, 4);
    }

    #[test]
    fn test_convenience_wrappers() {
        let mut resolver = Resolver::new(ResolverConfig {
            parallel_strategy: ParallelStrategy::Conservative,
            generate_schedule: false,
            ..ResolverConfig::default()
        });
        assert_eq!(
            resolver.resolve_order(&chain()).unwrap(),
            vec!["t1", "t2", "t3", "t4"]
        );
        assert_eq!(resolver.resolve_blocks(&chain()).unwrap().len(), 4);
        let schedule = resolver.resolve_schedule(&chain()).unwrap();
        assert!((schedule.makespan() - 8.0).abs() < 1e-9);
        assert_eq!(resolver.stats().resolutions_performed, 3);

        resolver.reset_stats();
        assert_eq!(resolver.stats().resolutions_performed, 0);
    }

    #[test]
    fn test_observer_sees_stages_in_order() {
        let stages: Rc<RefCell<Vec<ResolutionStage>>> = Rc::default();
        let sink = Rc::clone(&stages);
        let mut resolver = Resolver::default();
        resolver.add_observer(move |event: &ResolverEvent| {
            if let ResolverEvent::StageCompleted { stage, .. } = event {
                sink.borrow_mut().push(*stage);
            }
        });
        resolver.resolve(&chain());

        assert_eq!(
            *stages.borrow(),
            vec![
                ResolutionStage::GraphBuild,
                ResolutionStage::CycleDetection,
                ResolutionStage::Sorting,
                ResolutionStage::Blocking,
                ResolutionStage::CriticalPath,
                ResolutionStage::Schedule,
            ]
        );
    }

    #[test]
    fn test_validate_tasks() {
        let resolver = Resolver::default();
        let report = resolver.validate_tasks(&[
            make_task("a", 1.0, &["ghost"]),
            make_task("b", 1.0, &["a"]),
        ]);
        assert!(report.valid);
        assert_eq!(report.stats.node_count, 2);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(resolver.stats().resolutions_performed, 0);
    }
}
