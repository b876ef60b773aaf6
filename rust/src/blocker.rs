//! Partitioning of sorted levels into execution blocks.
//!
//! Blocks run one after another in `sequence` order; the tasks inside a
//! `parallel` block have no ordering dependency on each other. Failures are
//! reported through `BlockingResult` instead of an error return so the
//! caller can keep aggregating.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::config::ParallelStrategy;
use crate::graph::DependencyGraph;
use crate::models::UNASSIGNED_AGENT;
use crate::sorter::levels_from_order;
use crate::{log_changes, log_checks};

/// Tasks in a conservative block.
pub const CONSERVATIVE_CHUNK: usize = 3;

/// Errors for malformed level input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockingError {
    #[error("Level {0} is empty")]
    EmptyLevel(usize),
    #[error("Task not found in graph: {0}")]
    UnknownTask(String),
    #[error("Task listed more than once: {0}")]
    DuplicateTask(String),
    #[error("Task {task} is placed before or alongside its dependency {dependency}")]
    LevelOrder { task: String, dependency: String },
}

/// Whether the tasks of a block may run concurrently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockMode {
    Parallel,
    Sequential,
}

impl BlockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockMode::Parallel => "parallel",
            BlockMode::Sequential => "sequential",
        }
    }
}

/// A group of tasks handed to an external executor as one unit.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionBlock {
    pub id: String,
    /// 1-based position in the block sequence.
    pub sequence: usize,
    /// Dependency level the block was cut from.
    pub level: usize,
    pub mode: BlockMode,
    pub tasks: Vec<String>,
    /// Ids of earlier blocks holding a dependency of one of these tasks.
    pub depends_on_blocks: Vec<String>,
    /// Max task duration when parallel, sum when sequential.
    pub estimated_hours: f64,
    pub estimated_days: f64,
    /// Agent -> number of tasks in this block.
    pub resources_required: BTreeMap<String, usize>,
}

impl ExecutionBlock {
    pub fn is_parallel(&self) -> bool {
        self.mode == BlockMode::Parallel
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "block_id": self.id,
            "sequence": self.sequence,
            "level": self.level,
            "parallel": self.is_parallel(),
            "mode": self.mode.as_str(),
            "tasks": self.tasks,
            "depends_on": self.depends_on_blocks,
            "estimated_hours": self.estimated_hours,
            "estimated_days": self.estimated_days,
            "resources_required": self.resources_required,
        })
    }
}

/// Configuration for block partitioning.
#[derive(Clone, Debug)]
pub struct BlockerConfig {
    pub strategy: ParallelStrategy,
    /// Resource-aware cap on tasks per block.
    pub max_parallel_tasks: usize,
    /// Resource-aware and agent-aware cap on one agent's tasks per block.
    pub max_parallel_per_agent: usize,
    pub hours_per_day: f64,
    pub verbosity: u8,
}

impl Default for BlockerConfig {
    fn default() -> Self {
        Self {
            strategy: ParallelStrategy::Maximum,
            max_parallel_tasks: 10,
            max_parallel_per_agent: 3,
            hours_per_day: 8.0,
            verbosity: 0,
        }
    }
}

/// Outcome of block partitioning.
#[derive(Clone, Debug, Default)]
pub struct BlockingResult {
    pub success: bool,
    pub blocks: Vec<ExecutionBlock>,
    /// Largest task count in any parallel block (1 when all blocks are sequential).
    pub max_parallelism: usize,
    pub total_hours: f64,
    pub error: Option<BlockingError>,
}

impl BlockingResult {
    fn failed(error: BlockingError) -> Self {
        Self {
            success: false,
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Cuts dependency levels into execution blocks.
#[derive(Clone, Debug, Default)]
pub struct ParallelBlocker {
    config: BlockerConfig,
}

impl ParallelBlocker {
    pub fn new(config: BlockerConfig) -> Self {
        Self { config }
    }

    /// Build blocks from a flat topological order; levels are re-derived
    /// from dependency depth.
    pub fn create_blocks(&self, graph: &DependencyGraph, order: &[String]) -> BlockingResult {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for id in order {
            if !graph.contains(id) {
                return BlockingResult::failed(BlockingError::UnknownTask(id.clone()));
            }
            if !seen.insert(id.as_str()) {
                return BlockingResult::failed(BlockingError::DuplicateTask(id.clone()));
            }
        }
        let levels = levels_from_order(graph, order);
        self.create_blocks_from_levels(graph, &levels)
    }

    /// Build blocks from precomputed levels.
    pub fn create_blocks_from_levels(
        &self,
        graph: &DependencyGraph,
        levels: &[Vec<String>],
    ) -> BlockingResult {
        if let Err(error) = validate_levels(graph, levels) {
            log_changes!(self.config.verbosity, "Blocking failed: {}", error);
            return BlockingResult::failed(error);
        }

        let mut blocks: Vec<ExecutionBlock> = Vec::new();
        let mut block_of: FxHashMap<&str, usize> = FxHashMap::default();

        for (level_index, level) in levels.iter().enumerate() {
            for chunk in self.partition_level(graph, level) {
                let sequence = blocks.len() + 1;
                let block = self.build_block(graph, &block_of, sequence, level_index, chunk);
                for id in &level[..] {
                    if block.tasks.contains(id) {
                        block_of.insert(id.as_str(), sequence);
                    }
                }
                log_checks!(
                    self.config.verbosity,
                    "Block {} ({}): {:?}",
                    block.id,
                    block.mode.as_str(),
                    block.tasks
                );
                blocks.push(block);
            }
        }

        let max_parallelism = blocks
            .iter()
            .filter(|b| b.is_parallel())
            .map(|b| b.len())
            .max()
            .unwrap_or(if blocks.is_empty() { 0 } else { 1 });
        let total_hours = blocks.iter().map(|b| b.estimated_hours).sum();

        log_changes!(
            self.config.verbosity,
            "Created {} blocks ({} strategy), max parallelism {}",
            blocks.len(),
            self.config.strategy.as_str(),
            max_parallelism
        );

        BlockingResult {
            success: true,
            blocks,
            max_parallelism,
            total_hours,
            error: None,
        }
    }

    /// Split one level into groups according to the strategy.
    fn partition_level(&self, graph: &DependencyGraph, level: &[String]) -> Vec<Vec<String>> {
        let agent_of = |id: &str| -> String {
            graph
                .get_node(id)
                .map(|n| n.task.agent.clone())
                .unwrap_or_else(|| UNASSIGNED_AGENT.to_string())
        };

        match self.config.strategy {
            ParallelStrategy::Maximum => vec![level.to_vec()],
            ParallelStrategy::Conservative => level
                .chunks(CONSERVATIVE_CHUNK)
                .map(|c| c.to_vec())
                .collect(),
            ParallelStrategy::AgentAware => {
                let mut by_agent: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for id in level {
                    by_agent.entry(agent_of(id)).or_default().push(id.clone());
                }
                let per_agent = self.config.max_parallel_per_agent.max(1);
                by_agent
                    .into_values()
                    .flat_map(|ids| {
                        ids.chunks(per_agent)
                            .map(|c| c.to_vec())
                            .collect::<Vec<_>>()
                    })
                    .collect()
            }
            ParallelStrategy::ResourceAware => {
                let max_tasks = self.config.max_parallel_tasks.max(1);
                let per_agent = self.config.max_parallel_per_agent.max(1);
                let mut groups: Vec<Vec<String>> = Vec::new();
                let mut current: Vec<String> = Vec::new();
                let mut agent_counts: FxHashMap<String, usize> = FxHashMap::default();

                for id in level {
                    let agent = agent_of(id);
                    let agent_count = agent_counts.get(&agent).copied().unwrap_or(0);
                    if !current.is_empty()
                        && (current.len() + 1 > max_tasks || agent_count + 1 > per_agent)
                    {
                        log_checks!(
                            self.config.verbosity,
                            "Starting new block before {} (tasks {}, agent {} at {})",
                            id,
                            current.len(),
                            agent,
                            agent_count
                        );
                        groups.push(std::mem::take(&mut current));
                        agent_counts.clear();
                    }
                    *agent_counts.entry(agent).or_default() += 1;
                    current.push(id.clone());
                }
                if !current.is_empty() {
                    groups.push(current);
                }
                groups
            }
        }
    }

    fn build_block(
        &self,
        graph: &DependencyGraph,
        block_of: &FxHashMap<&str, usize>,
        sequence: usize,
        level: usize,
        tasks: Vec<String>,
    ) -> ExecutionBlock {
        let mode = if tasks.len() > 1 {
            BlockMode::Parallel
        } else {
            BlockMode::Sequential
        };

        let mut upstream: BTreeSet<usize> = BTreeSet::new();
        let mut resources_required: BTreeMap<String, usize> = BTreeMap::new();
        let mut durations: Vec<f64> = Vec::with_capacity(tasks.len());

        for id in &tasks {
            if let Some(node) = graph.get_node(id) {
                for dep in node.dependencies() {
                    if let Some(&seq) = block_of.get(dep.as_str()) {
                        upstream.insert(seq);
                    }
                }
                *resources_required.entry(node.task.agent.clone()).or_default() += 1;
                durations.push(node.duration());
            }
        }

        let estimated_hours = match mode {
            BlockMode::Parallel => durations.iter().copied().fold(0.0, f64::max),
            BlockMode::Sequential => durations.iter().sum(),
        };

        ExecutionBlock {
            id: block_id(sequence),
            sequence,
            level,
            mode,
            tasks,
            depends_on_blocks: upstream.into_iter().map(block_id).collect(),
            estimated_hours,
            estimated_days: estimated_hours / self.config.hours_per_day,
            resources_required,
        }
    }
}

pub fn block_id(sequence: usize) -> String {
    format!("block-{}", sequence)
}

/// Every task must be known, listed once, and come after all its dependencies.
fn validate_levels(graph: &DependencyGraph, levels: &[Vec<String>]) -> Result<(), BlockingError> {
    let mut level_of: FxHashMap<&str, usize> = FxHashMap::default();
    for (index, level) in levels.iter().enumerate() {
        if level.is_empty() {
            return Err(BlockingError::EmptyLevel(index));
        }
        for id in level {
            if !graph.contains(id) {
                return Err(BlockingError::UnknownTask(id.clone()));
            }
            if level_of.insert(id.as_str(), index).is_some() {
                return Err(BlockingError::DuplicateTask(id.clone()));
            }
        }
    }

    for (id, &index) in &level_of {
        let Some(node) = graph.get_node(id) else {
            continue;
        };
        for dep in node.dependencies() {
            match level_of.get(dep.as_str()) {
                Some(&dep_index) if dep_index < index => {}
                _ => {
                    return Err(BlockingError::LevelOrder {
                        task: id.to_string(),
                        dependency: dep.clone(),
                    })
                }
            }
        }
    }
    Ok(())
}
