//! Hour-granularity timeline and per-agent load.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::ResourceConstraint;

use super::core::ScheduledTask;

/// Default cap on the number of hour entries in a timeline.
pub const DEFAULT_MAX_TIMELINE_HOURS: usize = 100_000;

/// Tasks active during one hour of the schedule.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub hour: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
    pub active_tasks: Vec<String>,
    /// Agent -> tasks it is working on during this hour.
    pub agents: BTreeMap<String, Vec<String>>,
}

/// Workload summary for one agent.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AgentWorkload {
    pub task_count: usize,
    pub total_hours: f64,
    pub peak_concurrency: usize,
    /// total_hours / (makespan * max(1, cap)).
    pub utilization: f64,
}

/// Wall-clock time `hours` after `start`.
pub fn offset_timestamp(start: Option<NaiveDateTime>, hours: f64) -> Option<NaiveDateTime> {
    let start = start?;
    let seconds = (hours * 3600.0).round();
    if !seconds.is_finite() {
        return None;
    }
    start.checked_add_signed(Duration::try_seconds(seconds as i64)?)
}

/// Number of hour entries needed to cover `total_hours`.
pub fn timeline_len(total_hours: f64) -> f64 {
    if total_hours.is_finite() {
        total_hours.max(0.0).ceil()
    } else {
        f64::INFINITY
    }
}

/// One entry per integer hour `h` in `[0, ceil(total_hours))`, truncated to
/// `max_hours` entries. A task is active in hour `h` when its interval
/// overlaps `[h, h + 1)`.
pub fn build_timeline(
    tasks: &[ScheduledTask],
    total_hours: f64,
    project_start: Option<NaiveDateTime>,
    max_hours: usize,
) -> Vec<TimelineEntry> {
    let hours = timeline_len(total_hours).min(max_hours as f64) as usize;
    let mut timeline: Vec<TimelineEntry> = (0..hours)
        .map(|hour| TimelineEntry {
            hour,
            timestamp: offset_timestamp(project_start, hour as f64),
            active_tasks: Vec::new(),
            agents: BTreeMap::new(),
        })
        .collect();

    for task in tasks {
        if task.end_hour <= task.start_hour {
            continue;
        }
        let first = task.start_hour.floor().max(0.0).min(hours as f64) as usize;
        let last = task.end_hour.ceil().min(hours as f64) as usize;
        for entry in timeline.iter_mut().take(last).skip(first) {
            entry.active_tasks.push(task.task_id.clone());
            entry
                .agents
                .entry(task.agent.clone())
                .or_default()
                .push(task.task_id.clone());
        }
    }
    timeline
}

/// Maximum number of overlapping half-open intervals.
pub fn peak_concurrency<I>(intervals: I) -> usize
where
    I: IntoIterator<Item = (f64, f64)>,
{
    // (time, delta); ends sort before starts at the same instant
    let mut events: Vec<(f64, i32)> = Vec::new();
    for (start, end) in intervals {
        if end > start {
            events.push((start, 1));
            events.push((end, -1));
        }
    }
    events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut current: i32 = 0;
    let mut peak: i32 = 0;
    for (_, delta) in events {
        current += delta;
        peak = peak.max(current);
    }
    peak.max(0) as usize
}

pub fn agent_workload(
    tasks: &[ScheduledTask],
    constraints: &BTreeMap<String, ResourceConstraint>,
    makespan: f64,
) -> BTreeMap<String, AgentWorkload> {
    let mut by_agent: BTreeMap<&str, Vec<&ScheduledTask>> = BTreeMap::new();
    for task in tasks {
        by_agent.entry(task.agent.as_str()).or_default().push(task);
    }

    by_agent
        .into_iter()
        .map(|(agent, tasks)| {
            let total_hours: f64 = tasks.iter().map(|t| t.duration).sum();
            let cap = constraints
                .get(agent)
                .map(|c| c.max_concurrent)
                .unwrap_or(1)
                .max(1);
            let utilization = if makespan > 0.0 {
                total_hours / (makespan * cap as f64)
            } else {
                0.0
            };
            let workload = AgentWorkload {
                task_count: tasks.len(),
                total_hours,
                peak_concurrency: peak_concurrency(
                    tasks.iter().map(|t| (t.start_hour, t.end_hour)),
                ),
                utilization,
            };
            (agent.to_string(), workload)
        })
        .collect()
}

/// One warning per agent whose peak concurrency exceeds its cap.
pub fn constraint_violations(
    workload: &BTreeMap<String, AgentWorkload>,
    constraints: &BTreeMap<String, ResourceConstraint>,
) -> Vec<String> {
    constraints
        .iter()
        .filter_map(|(agent, constraint)| {
            let load = workload.get(agent)?;
            (load.peak_concurrency > constraint.max_concurrent).then(|| {
                format!(
                    "Agent '{}' runs {} tasks concurrently, exceeding its limit of {}",
                    agent, load.peak_concurrency, constraint.max_concurrent
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_scheduled(id: &str, agent: &str, start: f64, end: f64) -> ScheduledTask {
        ScheduledTask {
            task_id: id.to_string(),
            title: id.to_string(),
            agent: agent.to_string(),
            block_id: "block-1".to_string(),
            start_hour: start,
            end_hour: end,
            duration: end - start,
            critical: false,
            start_time: None,
            end_time: None,
        }
    }

    #[test]
    fn test_timeline_hours() {
        let tasks = vec![
            make_scheduled("a", "dev", 0.0, 2.0),
            make_scheduled("b", "qa", 0.0, 0.5),
            make_scheduled("c", "dev", 2.0, 3.5),
        ];
        let timeline = build_timeline(&tasks, 3.5, None, DEFAULT_MAX_TIMELINE_HOURS);

        assert_eq!(timeline.len(), 4);
        assert_eq!(timeline[0].active_tasks, vec!["a", "b"]);
        assert_eq!(timeline[1].active_tasks, vec!["a"]);
        assert_eq!(timeline[2].active_tasks, vec!["c"]);
        assert_eq!(timeline[3].agents["dev"], vec!["c"]);
        assert!(timeline[0].timestamp.is_none());
    }

    #[test]
    fn test_timeline_timestamps() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let timeline = build_timeline(
            &[make_scheduled("a", "dev", 0.0, 2.0)],
            2.0,
            Some(start),
            DEFAULT_MAX_TIMELINE_HOURS,
        );
        assert_eq!(
            timeline[1].timestamp,
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(10, 0, 0)
        );
        assert_eq!(
            offset_timestamp(Some(start), 1.5),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(10, 30, 0)
        );
    }

    #[test]
    fn test_timeline_truncated_at_cap() {
        let tasks = vec![
            make_scheduled("long", "dev", 0.0, 5e8),
            make_scheduled("late", "qa", 20.0, 30.0),
        ];
        let timeline = build_timeline(&tasks, 5e8, None, 10);

        assert_eq!(timeline.len(), 10);
        assert!(timeline.iter().all(|e| e.active_tasks == vec!["long"]));
        assert_eq!(timeline_len(2.2), 3.0);
        assert!(timeline_len(f64::INFINITY).is_infinite());
    }

    #[test]
    fn test_peak_concurrency_back_to_back() {
        assert_eq!(peak_concurrency(vec![(0.0, 1.0), (1.0, 2.0)]), 1);
        assert_eq!(peak_concurrency(vec![(0.0, 2.0), (1.0, 3.0), (1.5, 1.6)]), 3);
        assert_eq!(peak_concurrency(Vec::new()), 0);
    }

    #[test]
    fn test_workload_and_violations() {
        let tasks = vec![
            make_scheduled("a", "dev", 0.0, 2.0),
            make_scheduled("b", "dev", 0.0, 2.0),
            make_scheduled("c", "qa", 2.0, 4.0),
        ];
        let mut constraints = BTreeMap::new();
        constraints.insert("dev".to_string(), ResourceConstraint { max_concurrent: 1 });
        constraints.insert("qa".to_string(), ResourceConstraint { max_concurrent: 2 });

        let workload = agent_workload(&tasks, &constraints, 4.0);
        assert_eq!(workload["dev"].peak_concurrency, 2);
        assert!((workload["dev"].utilization - 1.0).abs() < 1e-9);
        assert!((workload["qa"].utilization - 0.25).abs() < 1e-9);

        let warnings = constraint_violations(&workload, &constraints);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("'dev'"));
    }
}
