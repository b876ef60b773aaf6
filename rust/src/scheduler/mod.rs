//! Schedule generation.
//!
//! Places execution blocks on an hour axis, builds the hour-by-hour timeline
//! with per-agent assignments, checks agent concurrency caps and renders the
//! result as JSON, Markdown or an ASCII grid.

mod core;
mod export;
mod timeline;

pub use core::{
    ExecutionSchedule, ScheduleConfig, ScheduleError, ScheduleGenerator, ScheduleInput,
    ScheduleMetadata, ScheduleStatus, ScheduledBlock, ScheduledTask,
};
pub use timeline::{
    agent_workload, build_timeline, constraint_violations, offset_timestamp, peak_concurrency,
    timeline_len, AgentWorkload, TimelineEntry, DEFAULT_MAX_TIMELINE_HOURS,
};
