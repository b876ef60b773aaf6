//! JSON, Markdown and ASCII renderings of a schedule.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Write;

use super::core::ExecutionSchedule;

impl ExecutionSchedule {
    pub fn to_json(&self) -> Value {
        json!({
            "summary": {
                "status": self.status.as_str(),
                "total_hours": self.metadata.total_hours,
                "total_days": self.metadata.total_days,
                "total_tasks": self.metadata.total_tasks,
                "total_blocks": self.metadata.total_blocks,
                "max_concurrency": self.metadata.max_concurrency,
                "critical_path": self.critical_path,
                "critical_path_hours": self.critical_path_hours,
                "agent_workload": self.metadata.agent_workload,
                "project_start": self.project_start,
                "generated_at": self.generated_at.to_rfc3339(),
            },
            "execution_blocks": self.blocks,
            "tasks": self.tasks,
            "timeline": self.timeline,
            "warnings": self.warnings,
            "errors": self.errors,
        })
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let meta = &self.metadata;

        let _ = writeln!(out, "# Execution Schedule");
        let _ = writeln!(out);
        let _ = writeln!(out, "- **Status:** {}", self.status.as_str());
        let _ = writeln!(
            out,
            "- **Total duration:** {:.1} hours ({:.1} days)",
            meta.total_hours, meta.total_days
        );
        let _ = writeln!(out, "- **Tasks:** {}", meta.total_tasks);
        let _ = writeln!(out, "- **Blocks:** {}", meta.total_blocks);
        let _ = writeln!(out, "- **Max concurrency:** {}", meta.max_concurrency);
        if let Some(start) = self.project_start {
            let _ = writeln!(out, "- **Project start:** {}", start);
        }
        if !self.critical_path.is_empty() {
            let _ = writeln!(out, "- **Critical path:** {}", self.critical_path.join(" -> "));
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "## Blocks");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Block | Mode | Start (h) | End (h) | Tasks | Depends on |");
        let _ = writeln!(out, "|---|---|---|---|---|---|");
        for block in &self.blocks {
            let tasks: Vec<String> = block
                .tasks
                .iter()
                .map(|id| match self.task(id) {
                    Some(t) if t.critical => format!("**{}**", id),
                    _ => id.clone(),
                })
                .collect();
            let depends = if block.depends_on.is_empty() {
                "-".to_string()
            } else {
                block.depends_on.join(", ")
            };
            let _ = writeln!(
                out,
                "| {} | {} | {:.1} | {:.1} | {} | {} |",
                block.block_id,
                block.mode.as_str(),
                block.start_hour,
                block.end_hour,
                tasks.join(", "),
                depends
            );
        }

        if !meta.agent_workload.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Agents");
            let _ = writeln!(out);
            let _ = writeln!(out, "| Agent | Tasks | Hours | Peak | Utilization |");
            let _ = writeln!(out, "|---|---|---|---|---|");
            for (agent, load) in &meta.agent_workload {
                let _ = writeln!(
                    out,
                    "| {} | {} | {:.1} | {} | {:.0}% |",
                    agent,
                    load.task_count,
                    load.total_hours,
                    load.peak_concurrency,
                    load.utilization * 100.0
                );
            }
        }

        for (title, items) in [("Warnings", &self.warnings), ("Errors", &self.errors)] {
            if items.is_empty() {
                continue;
            }
            let _ = writeln!(out);
            let _ = writeln!(out, "## {}", title);
            let _ = writeln!(out);
            for item in items {
                let _ = writeln!(out, "- {}", item);
            }
        }

        out
    }

    /// One row per agent, one column per hour. `#` busy, `*` busy on a
    /// critical task, `.` idle.
    pub fn to_ascii_timeline(&self) -> String {
        let mut out = String::new();
        let hours = self.timeline.len();
        if hours == 0 {
            out.push_str("(empty schedule)\n");
            return out;
        }

        let mut rows: BTreeMap<&str, Vec<char>> = BTreeMap::new();
        for task in &self.tasks {
            rows.entry(task.agent.as_str())
                .or_insert_with(|| vec!['.'; hours]);
        }
        for entry in &self.timeline {
            for (agent, task_ids) in &entry.agents {
                let critical = task_ids
                    .iter()
                    .any(|id| self.task(id).map(|t| t.critical).unwrap_or(false));
                if let Some(row) = rows.get_mut(agent.as_str()) {
                    row[entry.hour] = if critical { '*' } else { '#' };
                }
            }
        }

        let width = rows.keys().map(|a| a.len()).max().unwrap_or(0).max(5);
        let axis: String = (0..hours)
            .map(|h| char::from_digit((h % 10) as u32, 10).unwrap_or(' '))
            .collect();
        let _ = writeln!(out, "{:<width$} |{}|", "hour", axis, width = width);
        let _ = writeln!(out, "{}-+{}+", "-".repeat(width), "-".repeat(hours));
        for (agent, cells) in &rows {
            let line: String = cells.iter().collect();
            let _ = writeln!(out, "{:<width$} |{}|", agent, line, width = width);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::blocker::ParallelBlocker;
    use crate::critical_path::CriticalPathAnalyzer;
    use crate::graph::DependencyGraph;
    use crate::models::Task;
    use crate::scheduler::{ExecutionSchedule, ScheduleGenerator};

    fn make_task(id: &str, duration: f64, agent: &str, deps: &[&str]) -> Task {
        let mut task = Task::with_deps(id, duration, deps);
        task.agent = agent.to_string();
        task
    }

    fn schedule() -> ExecutionSchedule {
        let mut graph = DependencyGraph::build_from_tasks(
            &[
                make_task("design", 2.0, "alice", &[]),
                make_task("build", 3.0, "bob", &["design"]),
                make_task("docs", 1.0, "alice", &["design"]),
            ],
            false,
            0,
        )
        .unwrap();
        let order: Vec<String> = ["design", "build", "docs"].iter().map(|s| s.to_string()).collect();
        let blocks = ParallelBlocker::default().create_blocks(&graph, &order).blocks;
        let critical = CriticalPathAnalyzer::default()
            .analyze(&mut graph, &order)
            .unwrap();
        ScheduleGenerator::default().generate_from(&graph, &order, &blocks, Some(&critical))
    }

    #[test]
    fn test_json_sections() {
        let value = schedule().to_json();
        assert_eq!(value["summary"]["status"], "valid");
        assert_eq!(value["summary"]["total_hours"], 5.0);
        assert_eq!(value["execution_blocks"].as_array().unwrap().len(), 2);
        assert_eq!(value["execution_blocks"][1]["mode"], "parallel");
        assert_eq!(value["timeline"].as_array().unwrap().len(), 5);
        assert!(value["warnings"].as_array().unwrap().is_empty());
        assert!(value["summary"]["generated_at"].is_string());
    }

    #[test]
    fn test_markdown_report() {
        let md = schedule().to_markdown();
        assert!(md.starts_with("# Execution Schedule"));
        assert!(md.contains("| block-2 | parallel | 2.0 | 5.0 | **build**, docs | block-1 |"));
        assert!(md.contains("design -> build"));
        assert!(!md.contains("## Warnings"));
    }

    #[test]
    fn test_ascii_grid() {
        let grid = schedule().to_ascii_timeline();
        let lines: Vec<&str> = grid.lines().collect();
        assert_eq!(lines[0], "hour  |01234|");
        assert_eq!(lines[2], "alice |**#..|");
        assert_eq!(lines[3], "bob   |..***|");
    }
}
