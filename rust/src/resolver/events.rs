//! Stage notifications delivered synchronously during a resolution.

use serde::Serialize;

use crate::graph::Edge;

use super::result::ResolutionError;

/// Pipeline stages in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStage {
    Configuration,
    GraphBuild,
    CycleDetection,
    CycleBreaking,
    Sorting,
    Blocking,
    CriticalPath,
    Schedule,
}

impl ResolutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStage::Configuration => "configuration",
            ResolutionStage::GraphBuild => "graph_build",
            ResolutionStage::CycleDetection => "cycle_detection",
            ResolutionStage::CycleBreaking => "cycle_breaking",
            ResolutionStage::Sorting => "sorting",
            ResolutionStage::Blocking => "blocking",
            ResolutionStage::CriticalPath => "critical_path",
            ResolutionStage::Schedule => "schedule",
        }
    }
}

impl std::fmt::Display for ResolutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResolverEvent {
    Started { task_count: usize },
    StageCompleted { stage: ResolutionStage, summary: String },
    CyclesDetected { count: usize },
    EdgesRemoved { edges: Vec<Edge> },
    Warning { message: String },
    Error { error: ResolutionError },
    Finished { success: bool, elapsed_ms: f64 },
}

/// Receives events from a `Resolver`.
pub trait ResolutionObserver {
    fn on_event(&mut self, event: &ResolverEvent);
}

impl<F> ResolutionObserver for F
where
    F: FnMut(&ResolverEvent),
{
    fn on_event(&mut self, event: &ResolverEvent) {
        self(event)
    }
}
