//! End-to-end tests for the resolution pipeline.

use schedule_resolver_rust::{
    verify_sorted_order, CircularDetector, DependencyGraph, ErrorKind, ParallelStrategy,
    ResolutionStage, Resolver, ResolverConfig, ScheduleStatus, SortAlgorithm, SortError, Task,
    TopologicalSorter,
};

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

fn diamond() -> Vec<Task> {
    vec![
        make_task("start", 1.0, &[]),
        make_task("api", 4.0, &["start"]),
        make_task("ui", 3.0, &["start"]),
        make_task("db", 2.0, &["start"]),
        make_task("integrate", 2.0, &["api", "ui", "db"]),
        make_task("test", 3.0, &["integrate"]),
    ]
}

fn triangle() -> Vec<Task> {
    vec![
        make_task("A", 1.0, &["B"]),
        make_task("B", 1.0, &["C"]),
        make_task("C", 1.0, &["A"]),
    ]
}

/// A wider project with several agents and cross-level dependencies.
fn project() -> Vec<Task> {
    let mut tasks = vec![
        make_task("design", 2.0, &[]),
        make_task("schema", 3.0, &["design"]),
        make_task("auth", 5.0, &["schema"]),
        make_task("api", 4.0, &["schema"]),
        make_task("ui-shell", 3.0, &["design"]),
        make_task("ui-forms", 2.0, &["ui-shell", "api"]),
        make_task("e2e", 3.0, &["auth", "ui-forms"]),
        make_task("docs", 1.0, &["api"]),
        make_task("release", 1.0, &["e2e", "docs"]),
    ];
    for task in &mut tasks {
        task.agent = match task.id.as_str() {
            "ui-shell" | "ui-forms" => "frontend",
            "e2e" | "release" => "qa",
            "docs" | "design" => "writer",
            _ => "backend",
        }
        .to_string();
    }
    tasks
}

#[test]
fn test_acyclic_input_is_dag() {
    for tasks in [chain(), diamond(), project()] {
        let graph = DependencyGraph::build_from_tasks(&tasks, false, 0).unwrap();
        assert!(graph.is_dag());
        assert!(!CircularDetector::default().detect(&graph).has_cycles);
    }
}

#[test]
fn test_sorted_order_is_valid_for_every_algorithm() {
    for algorithm in [SortAlgorithm::Kahn, SortAlgorithm::Dfs, SortAlgorithm::Priority] {
        let config = ResolverConfig {
            sort_algorithm: algorithm,
            ..ResolverConfig::default()
        };
        let tasks = project();
        let result = Resolver::new(config).resolve(&tasks);
        assert!(result.success, "{:?}: {:?}", algorithm, result.errors);

        let graph = DependencyGraph::build_from_tasks(&tasks, false, 0).unwrap();
        assert!(verify_sorted_order(&graph, &result.sorted_order));
        for task in &tasks {
            let pos = |id: &str| result.sorted_order.iter().position(|s| s == id).unwrap();
            for dep in &task.dependencies {
                assert!(pos(dep.as_str()) < pos(task.id.as_str()));
            }
        }
    }
}

#[test]
fn test_resolution_is_deterministic() {
    let first = Resolver::default().resolve(&project());
    let second = Resolver::default().resolve(&project());

    assert_eq!(first.sorted_order, second.sorted_order);
    assert_eq!(first.parallel_blocks, second.parallel_blocks);
    assert_eq!(
        first.critical_path.as_ref().map(|cp| &cp.critical_path),
        second.critical_path.as_ref().map(|cp| &cp.critical_path)
    );
}

#[test]
fn test_critical_path_matches_makespan() {
    for tasks in [chain(), diamond()] {
        let result = Resolver::default().resolve(&tasks);
        let cp = result.critical_path.as_ref().unwrap();
        let schedule = result.schedule.as_ref().unwrap();

        let max_finish = cp
            .task_timings
            .values()
            .map(|t| t.earliest_finish)
            .fold(0.0, f64::max);
        assert!((cp.total_duration - max_finish).abs() < 1e-9);
        assert!((cp.total_duration - schedule.makespan()).abs() < 1e-9);
        assert!((schedule.blocks.last().unwrap().end_hour - cp.total_duration).abs() < 1e-9);
    }
}

#[test]
fn test_slack_is_non_negative() {
    let result = Resolver::default().resolve(&project());
    let cp = result.critical_path.unwrap();

    for (id, timing) in &cp.task_timings {
        assert!(timing.slack >= 0.0, "{} has slack {}", id, timing.slack);
    }
    for id in &cp.critical_path {
        assert!(cp.task_timings[id].slack.abs() < 1e-9);
    }
}

#[test]
fn test_three_node_cycle_rejected() {
    let tasks = triangle();
    let graph = DependencyGraph::build_from_tasks(&tasks, false, 0).unwrap();

    let detection = CircularDetector::default().detect(&graph);
    assert!(detection.has_cycles);
    assert_eq!(detection.cycles.len(), 1);
    assert_eq!(detection.cycles[0].len(), 3);

    let err = TopologicalSorter::default().sort(&graph).unwrap_err();
    assert!(matches!(err, SortError::CycleDetected { .. }));
    assert!(err.to_string().starts_with("CYCLE_DETECTED"));

    let result = Resolver::default().resolve(&tasks);
    assert!(!result.success);
    assert_eq!(result.errors[0].kind, ErrorKind::CircularDependency);
    assert_eq!(result.metrics.task_count, 3);
    assert_eq!(result.metrics.cycles_detected, 1);
}

#[test]
fn test_linear_chain() {
    let result = Resolver::default().resolve(&chain());

    assert_eq!(result.sorted_order, vec!["t1", "t2", "t3", "t4"]);
    let cp = result.critical_path.unwrap();
    assert_eq!(cp.critical_path, vec!["t1", "t2", "t3", "t4"]);
    assert!((cp.total_duration - 8.0).abs() < 1e-9);
    assert!(result.parallel_blocks.iter().all(|b| !b.is_parallel()));
}

#[test]
fn test_diamond_parallelism() {
    let result = Resolver::default().resolve(&diamond());
    assert!(result.success);

    let cp = result.critical_path.as_ref().unwrap();
    assert_eq!(cp.critical_path, vec!["start", "api", "integrate", "test"]);
    assert!((cp.total_duration - 10.0).abs() < 1e-9);
    assert!(cp.task_timings["ui"].slack > 0.0);
    assert!(cp.task_timings["db"].slack > 0.0);
    assert!(result.metrics.max_parallelism >= 3);
    assert_eq!(result.metrics.block_count, 4);
}

#[test]
fn test_self_dependency_fails() {
    let tasks = vec![make_task("a", 1.0, &[]), make_task("b", 1.0, &["b"])];

    assert!(DependencyGraph::build_from_tasks(&tasks, false, 0).is_err());

    let result = Resolver::default().resolve(&tasks);
    assert!(!result.success);
    assert_eq!(result.errors[0].kind, ErrorKind::UnexpectedError);
    assert_eq!(result.errors[0].stage, ResolutionStage::GraphBuild);
}

#[test]
fn test_missing_dependency_is_warning() {
    let tasks = vec![make_task("a", 1.0, &[]), make_task("b", 2.0, &["a", "ghost"])];
    let result = Resolver::default().resolve(&tasks);

    assert!(result.success);
    assert_eq!(result.sorted_order, vec!["a", "b"]);
    assert_eq!(result.metrics.dependency_count, 1);
    assert!(result.warnings.iter().any(|w| w.contains("ghost")));
}

#[test]
fn test_resource_aware_project() {
    let config = ResolverConfig {
        parallel_strategy: ParallelStrategy::ResourceAware,
        max_concurrency: 2,
        max_parallel_per_agent: 1,
        ..ResolverConfig::default()
    };
    let result = Resolver::new(config).resolve(&project());
    assert!(result.success);

    for block in &result.parallel_blocks {
        assert!(block.tasks.len() <= 2);
        assert!(block.resources_required.values().all(|&n| n <= 1));
    }
    let schedule = result.schedule.unwrap();
    let cp = result.critical_path.unwrap();
    assert!(schedule.makespan() >= cp.total_duration - 1e-9);
}

#[test]
fn test_json_output_shape() {
    let tasks = Task::list_from_json(
        r#"[
            {"id": "start", "estimated_hours": 1},
            {"id": "api", "depends_on": ["start"], "estimatedHours": 4, "agent": "backend"},
            {"id": "ui", "dependencies": ["start"], "duration": 3, "agent": "frontend"},
            {"id": "db", "dependencies": ["start"], "duration": 2, "agent": "backend"},
            {"id": "integrate", "dependencies": ["api", "ui", "db"], "duration": 2},
            {"id": "test", "dependencies": ["integrate"], "duration": 3}
        ]"#,
    )
    .unwrap();
    let config = ResolverConfig::from_json_str(r#"{"parallelStrategy": "maximum"}"#).unwrap();
    let value = Resolver::new(config).resolve(&tasks).to_json();

    for key in [
        "success",
        "sorted_order",
        "parallel_blocks",
        "critical_path",
        "schedule",
        "errors",
        "warnings",
        "metrics",
    ] {
        assert!(value.get(key).is_some(), "missing key {}", key);
    }
    assert_eq!(value["success"], true);
    assert_eq!(value["parallel_blocks"][1]["block_id"], "block-2");
    assert_eq!(value["parallel_blocks"][1]["parallel"], true);
    assert_eq!(value["parallel_blocks"][1]["resources_required"]["backend"], 2);
    assert_eq!(value["critical_path"]["total_hours"], 10.0);
    assert!(value["critical_path"]["bottlenecks"].is_array());
    assert!(value["schedule"]["summary"].is_object());
    assert!(value["schedule"]["execution_blocks"].is_array());
    assert_eq!(value["schedule"]["timeline"].as_array().unwrap().len(), 10);
    assert_eq!(value["metrics"]["task_count"], 6);
    assert_eq!(value["metrics"]["max_parallelism"], 3);
}

#[test]
fn test_invalid_durations_fail_graph_build() {
    for duration in [-3.0, f64::NAN, 1e15] {
        let tasks = vec![make_task("a", duration, &[]), make_task("b", 2.0, &["a"])];
        for generate_schedule in [true, false] {
            let config = ResolverConfig {
                generate_schedule,
                ..ResolverConfig::default()
            };
            let result = Resolver::new(config).resolve(&tasks);

            assert!(!result.success);
            assert_eq!(result.errors[0].kind, ErrorKind::UnexpectedError);
            assert_eq!(result.errors[0].stage, ResolutionStage::GraphBuild);
            assert!(result.errors[0].message.contains("invalid duration"));
            assert!(result.critical_path.is_none());
        }
    }
}

#[test]
fn test_long_project_timeline_is_capped() {
    let tasks = vec![
        make_task("a", 900_000.0, &[]),
        make_task("b", 900_000.0, &["a"]),
    ];
    let config = ResolverConfig {
        max_timeline_hours: 1_000,
        ..ResolverConfig::default()
    };
    let result = Resolver::new(config).resolve(&tasks);

    assert!(result.success);
    let schedule = result.schedule.unwrap();
    assert_eq!(schedule.timeline.len(), 1_000);
    assert!((schedule.makespan() - 1_800_000.0).abs() < 1e-6);
    assert!(result.warnings.iter().any(|w| w.contains("truncated")));
}

#[test]
fn test_unbalanced_levels_warn_about_makespan() {
    let tasks = vec![
        make_task("a", 1.0, &[]),
        make_task("b", 5.0, &["a"]),
        make_task("c", 5.0, &[]),
        make_task("d", 1.0, &["c"]),
    ];
    let result = Resolver::default().resolve(&tasks);
    assert!(result.success);

    let cp = result.critical_path.as_ref().unwrap();
    let schedule = result.schedule.as_ref().unwrap();
    assert!((cp.total_duration - 6.0).abs() < 1e-9);
    assert!((schedule.makespan() - 10.0).abs() < 1e-9);
    assert_eq!(schedule.status, ScheduleStatus::Warning);
    assert!(result.warnings.iter().any(|w| w.contains("critical path")));
}

#[test]
fn test_duplicate_self_dependent_record_is_skipped() {
    let tasks = vec![make_task("a", 2.0, &[]), make_task("a", 1.0, &["a"])];
    let result = Resolver::default().resolve(&tasks);

    assert!(result.success);
    assert_eq!(result.sorted_order, vec!["a"]);
    assert!(result.warnings.iter().any(|w| w.contains("Duplicate")));
    assert!((result.critical_path.unwrap().total_duration - 2.0).abs() < 1e-9);
}
