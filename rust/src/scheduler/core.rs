//! Block placement, schedule validation and metadata.

use chrono::{DateTime, NaiveDateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::blocker::{BlockMode, ExecutionBlock};
use crate::config::ResourceConstraint;
use crate::critical_path::CriticalPathResult;
use crate::graph::DependencyGraph;
use crate::{log_changes, log_checks};

use super::timeline::{
    agent_workload, build_timeline, constraint_violations, offset_timestamp, peak_concurrency,
    timeline_len, AgentWorkload, TimelineEntry, DEFAULT_MAX_TIMELINE_HOURS,
};

/// Errors that stop schedule construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("Buffer percent must be a non-negative number, got {0}")]
    InvalidBuffer(f64),
    #[error("Block {block} references unknown task {task}")]
    UnknownTask { block: String, task: String },
    #[error("Task {0} appears in more than one block")]
    DuplicateTask(String),
    #[error("Task {task} has invalid duration {duration}")]
    InvalidDuration { task: String, duration: f64 },
    #[error("Block {block} depends on {depends_on}, which is not an earlier block")]
    BlockOrder { block: String, depends_on: String },
}

/// Configuration for schedule generation.
#[derive(Clone, Debug)]
pub struct ScheduleConfig {
    /// Padding added to each block's duration, in percent.
    pub buffer_percent: f64,
    pub resource_constraints: BTreeMap<String, ResourceConstraint>,
    pub hours_per_day: f64,
    /// Timelines longer than this many hours are truncated with a warning.
    pub max_timeline_hours: usize,
    /// Anchors hour offsets to wall-clock timestamps when set.
    pub project_start: Option<NaiveDateTime>,
    pub verbosity: u8,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            buffer_percent: 0.0,
            resource_constraints: BTreeMap::new(),
            hours_per_day: 8.0,
            max_timeline_hours: DEFAULT_MAX_TIMELINE_HOURS,
            project_start: None,
            verbosity: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Valid,
    Warning,
    Invalid,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Valid => "valid",
            ScheduleStatus::Warning => "warning",
            ScheduleStatus::Invalid => "invalid",
        }
    }
}

/// An execution block placed on the hour axis.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScheduledBlock {
    pub block_id: String,
    pub sequence: usize,
    pub mode: BlockMode,
    pub tasks: Vec<String>,
    pub depends_on: Vec<String>,
    pub start_hour: f64,
    pub end_hour: f64,
    /// Duration including buffer.
    pub duration_hours: f64,
    pub critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveDateTime>,
}

/// A single task placed on the hour axis.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScheduledTask {
    pub task_id: String,
    pub title: String,
    pub agent: String,
    pub block_id: String,
    pub start_hour: f64,
    pub end_hour: f64,
    pub duration: f64,
    pub critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveDateTime>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ScheduleMetadata {
    pub total_hours: f64,
    pub total_days: f64,
    pub total_tasks: usize,
    pub total_blocks: usize,
    pub max_concurrency: usize,
    pub agent_workload: BTreeMap<String, AgentWorkload>,
}

/// Timestamped schedule produced by `ScheduleGenerator`.
#[derive(Clone, Debug)]
pub struct ExecutionSchedule {
    pub status: ScheduleStatus,
    pub blocks: Vec<ScheduledBlock>,
    pub tasks: Vec<ScheduledTask>,
    pub timeline: Vec<TimelineEntry>,
    pub critical_path: Vec<String>,
    pub critical_path_hours: Option<f64>,
    pub metadata: ScheduleMetadata,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub project_start: Option<NaiveDateTime>,
    pub generated_at: DateTime<Utc>,
}

impl ExecutionSchedule {
    fn empty(project_start: Option<NaiveDateTime>) -> Self {
        Self {
            status: ScheduleStatus::Valid,
            blocks: Vec::new(),
            tasks: Vec::new(),
            timeline: Vec::new(),
            critical_path: Vec::new(),
            critical_path_hours: None,
            metadata: ScheduleMetadata::default(),
            warnings: Vec::new(),
            errors: Vec::new(),
            project_start,
            generated_at: Utc::now(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status != ScheduleStatus::Invalid
    }

    pub fn task(&self, id: &str) -> Option<&ScheduledTask> {
        self.tasks.iter().find(|t| t.task_id == id)
    }

    pub fn block(&self, id: &str) -> Option<&ScheduledBlock> {
        self.blocks.iter().find(|b| b.block_id == id)
    }

    /// End of the last block.
    pub fn makespan(&self) -> f64 {
        self.blocks.last().map(|b| b.end_hour).unwrap_or(0.0)
    }
}

/// Pipeline outputs the generator consumes. Missing parts produce warnings.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScheduleInput<'a> {
    pub graph: Option<&'a DependencyGraph>,
    pub order: Option<&'a [String]>,
    pub blocks: Option<&'a [ExecutionBlock]>,
    pub critical_path: Option<&'a CriticalPathResult>,
}

#[derive(Clone, Debug, Default)]
pub struct ScheduleGenerator {
    config: ScheduleConfig,
}

impl ScheduleGenerator {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Build a schedule from a complete set of pipeline outputs.
    pub fn generate_from(
        &self,
        graph: &DependencyGraph,
        order: &[String],
        blocks: &[ExecutionBlock],
        critical_path: Option<&CriticalPathResult>,
    ) -> ExecutionSchedule {
        self.generate(ScheduleInput {
            graph: Some(graph),
            order: Some(order),
            blocks: Some(blocks),
            critical_path,
        })
    }

    pub fn generate(&self, input: ScheduleInput<'_>) -> ExecutionSchedule {
        let mut schedule = ExecutionSchedule::empty(self.config.project_start);

        if input.graph.is_none() {
            schedule.warnings.push("No dependency graph supplied".to_string());
        }
        if input.order.is_none() {
            schedule.warnings.push("No sorted order supplied".to_string());
        }
        if input.blocks.is_none() {
            schedule.warnings.push("No execution blocks supplied".to_string());
        }
        if input.critical_path.is_none() {
            schedule
                .warnings
                .push("No critical path analysis supplied".to_string());
        }

        if let Some(cp) = input.critical_path {
            schedule.critical_path = cp.critical_path.clone();
            schedule.critical_path_hours = Some(cp.total_duration);
        }

        if let (Some(graph), Some(blocks)) = (input.graph, input.blocks) {
            match self.place_blocks(graph, blocks, input.critical_path) {
                Ok((placed_blocks, placed_tasks)) => {
                    schedule.blocks = placed_blocks;
                    schedule.tasks = placed_tasks;
                    if let Some(warning) = self.level_barrier_warning(&schedule) {
                        log_checks!(self.config.verbosity, "{}", warning);
                        schedule.warnings.push(warning);
                    }
                }
                Err(e) => {
                    log_changes!(self.config.verbosity, "Schedule construction failed: {}", e);
                    schedule.errors.push(e.to_string());
                }
            }
            if let Some(order) = input.order {
                schedule.warnings.extend(coverage_warnings(order, blocks));
            }
        }

        self.finish(&mut schedule);
        schedule
    }

    /// Lay blocks end to end; block N starts when block N-1 ends.
    fn place_blocks(
        &self,
        graph: &DependencyGraph,
        blocks: &[ExecutionBlock],
        critical_path: Option<&CriticalPathResult>,
    ) -> Result<(Vec<ScheduledBlock>, Vec<ScheduledTask>), ScheduleError> {
        let buffer = self.config.buffer_percent;
        if !buffer.is_finite() || buffer < 0.0 {
            return Err(ScheduleError::InvalidBuffer(buffer));
        }
        let factor = 1.0 + buffer / 100.0;
        let start_at = self.config.project_start;

        let critical: FxHashSet<&str> = critical_path
            .map(|cp| cp.critical_path.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default();

        let mut placed_blocks = Vec::with_capacity(blocks.len());
        let mut placed_tasks = Vec::new();
        let mut seen_blocks: FxHashMap<&str, usize> = FxHashMap::default();
        let mut seen_tasks: FxHashSet<&str> = FxHashSet::default();
        let mut cursor = 0.0;

        for block in blocks {
            for upstream in &block.depends_on_blocks {
                if !seen_blocks.contains_key(upstream.as_str()) {
                    return Err(ScheduleError::BlockOrder {
                        block: block.id.clone(),
                        depends_on: upstream.clone(),
                    });
                }
            }

            let block_start = cursor;
            let mut task_cursor = block_start;
            let mut raw_hours: f64 = 0.0;
            let mut block_tasks = Vec::with_capacity(block.tasks.len());

            for id in &block.tasks {
                let node = graph.get_node(id).ok_or_else(|| ScheduleError::UnknownTask {
                    block: block.id.clone(),
                    task: id.clone(),
                })?;
                if !seen_tasks.insert(id.as_str()) {
                    return Err(ScheduleError::DuplicateTask(id.clone()));
                }
                let duration = node.duration();
                if !duration.is_finite() || duration < 0.0 {
                    return Err(ScheduleError::InvalidDuration {
                        task: id.clone(),
                        duration,
                    });
                }

                let start = match block.mode {
                    BlockMode::Parallel => block_start,
                    BlockMode::Sequential => task_cursor,
                };
                let end = start + duration;
                task_cursor = end;
                raw_hours = match block.mode {
                    BlockMode::Parallel => raw_hours.max(duration),
                    BlockMode::Sequential => raw_hours + duration,
                };

                block_tasks.push(ScheduledTask {
                    task_id: id.clone(),
                    title: node.task.title.clone(),
                    agent: node.task.agent.clone(),
                    block_id: block.id.clone(),
                    start_hour: start,
                    end_hour: end,
                    duration,
                    critical: critical.contains(id.as_str()),
                    start_time: offset_timestamp(start_at, start),
                    end_time: offset_timestamp(start_at, end),
                });
            }

            let duration_hours = raw_hours * factor;
            let block_end = block_start + duration_hours;
            cursor = block_end;

            log_checks!(
                self.config.verbosity,
                "Placed {} at {:.2}-{:.2}h",
                block.id,
                block_start,
                block_end
            );

            seen_blocks.insert(block.id.as_str(), block.sequence);
            placed_blocks.push(ScheduledBlock {
                block_id: block.id.clone(),
                sequence: block.sequence,
                mode: block.mode,
                tasks: block.tasks.clone(),
                depends_on: block.depends_on_blocks.clone(),
                start_hour: block_start,
                end_hour: block_end,
                duration_hours,
                critical: block_tasks.iter().any(|t| t.critical),
                start_time: offset_timestamp(start_at, block_start),
                end_time: offset_timestamp(start_at, block_end),
            });
            placed_tasks.extend(block_tasks);
        }

        Ok((placed_blocks, placed_tasks))
    }

    /// Blocks run level by level, so a short task in one level can hold back
    /// an unrelated long chain. Warn when the placed blocks end later than the
    /// critical path length allows for, buffer included.
    fn level_barrier_warning(&self, schedule: &ExecutionSchedule) -> Option<String> {
        let cp_hours = schedule.critical_path_hours?;
        let block_end = schedule.blocks.last()?.end_hour;
        let allowed = cp_hours * (1.0 + self.config.buffer_percent / 100.0);
        if block_end <= allowed + 1e-6 {
            return None;
        }
        Some(format!(
            "Block schedule ends at {:.2}h, {:.2}h after the critical path length of {:.2}h; level barriers delay independent chains",
            block_end,
            block_end - allowed,
            cp_hours
        ))
    }

    /// Timeline, metadata, constraint checks and final status.
    fn finish(&self, schedule: &mut ExecutionSchedule) {
        let makespan = schedule.makespan();
        let max_hours = self.config.max_timeline_hours;
        if timeline_len(makespan) > max_hours as f64 {
            let warning = format!(
                "Timeline truncated to {} of {:.0} hours",
                max_hours,
                timeline_len(makespan)
            );
            log_checks!(self.config.verbosity, "{}", warning);
            schedule.warnings.push(warning);
        }
        schedule.timeline = build_timeline(
            &schedule.tasks,
            makespan,
            self.config.project_start,
            max_hours,
        );

        let workload = agent_workload(
            &schedule.tasks,
            &self.config.resource_constraints,
            makespan,
        );
        schedule.warnings.extend(constraint_violations(
            &workload,
            &self.config.resource_constraints,
        ));

        schedule.metadata = ScheduleMetadata {
            total_hours: makespan,
            total_days: makespan / self.config.hours_per_day,
            total_tasks: schedule.tasks.len(),
            total_blocks: schedule.blocks.len(),
            max_concurrency: peak_concurrency(
                schedule.tasks.iter().map(|t| (t.start_hour, t.end_hour)),
            ),
            agent_workload: workload,
        };

        schedule.status = if !schedule.errors.is_empty() {
            ScheduleStatus::Invalid
        } else if !schedule.warnings.is_empty() {
            ScheduleStatus::Warning
        } else {
            ScheduleStatus::Valid
        };

        log_changes!(
            self.config.verbosity,
            "Schedule {}: {} blocks, {:.1} hours, {} warnings",
            schedule.status.as_str(),
            schedule.blocks.len(),
            makespan,
            schedule.warnings.len()
        );
    }
}

/// Warnings for tasks present in only one of the sorted order and the blocks.
fn coverage_warnings(order: &[String], blocks: &[ExecutionBlock]) -> Vec<String> {
    let in_blocks: FxHashSet<&str> = blocks
        .iter()
        .flat_map(|b| b.tasks.iter().map(|t| t.as_str()))
        .collect();
    let in_order: FxHashSet<&str> = order.iter().map(|s| s.as_str()).collect();

    let mut warnings: Vec<String> = order
        .iter()
        .filter(|id| !in_blocks.contains(id.as_str()))
        .map(|id| format!("Task {} is not in any execution block", id))
        .collect();
    warnings.extend(
        blocks
            .iter()
            .flat_map(|b| b.tasks.iter())
            .filter(|id| !in_order.contains(id.as_str()))
            .map(|id| format!("Task {} is scheduled but missing from the sorted order", id)),
    );
    warnings
}
