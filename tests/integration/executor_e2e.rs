//! Full plan execution tests.

use std::sync::Arc;

use serde_json::json;

use crest::context::fragment;
use crest::orchestration::RunPhase;
use crest::report::TaskState;
use crest::{ExecutionPlan, SubTask, TaskId};

use crate::fixtures::{registry, run_plan, static_worker, RecordingWorker};

#[tokio::test]
async fn test_two_wave_plan_merges_all_fragments() {
    let plan = ExecutionPlan::new(vec![
        SubTask::new("a", "fetch"),
        SubTask::new("c", "lookup"),
        SubTask::new("b", "report").depends(&["a"]).needs(&["data"]),
    ]);
    let registry = registry(vec![
        ("fetch", static_worker("data", json!({"count": 3}))),
        ("lookup", static_worker("definition", "a unit of work")),
        ("report", static_worker("summary", "3 items found")),
    ]);

    let result = run_plan(plan, registry).await;

    assert_eq!(result.context.goal(), "integration goal");
    assert_eq!(result.context.get("data"), Some(&json!({"count": 3})));
    assert_eq!(
        result.context.get("definition"),
        Some(&json!("a unit of work"))
    );
    assert_eq!(result.context.get("summary"), Some(&json!("3 items found")));

    for id in ["a", "b", "c"] {
        assert_eq!(
            result.status_log.terminal_state(&TaskId::from(id)),
            Some(TaskState::Completed),
            "task {} should have completed",
            id
        );
    }
    assert!(result.forced_tasks.is_empty());
}

#[tokio::test]
async fn test_phases_progress_to_done() {
    let plan = ExecutionPlan::new(vec![SubTask::new("a", "fetch")]);
    let registry = registry(vec![
        ("fetch", static_worker("data", 1)),
        ("summarizer", static_worker("summary", "done")),
    ]);

    let result = run_plan(plan, registry).await;

    let phases: Vec<RunPhase> = result.phases.iter().map(|p| p.phase).collect();
    assert_eq!(
        phases,
        vec![
            RunPhase::Planning,
            RunPhase::Running,
            RunPhase::Aggregating,
            RunPhase::Done
        ]
    );
    for pair in result.phases.windows(2) {
        assert!(pair[0].entered_at <= pair[1].entered_at);
    }
}

#[tokio::test]
async fn test_aggregator_invoked_when_no_summary_exists() {
    let plan = ExecutionPlan::new(vec![SubTask::new("a", "fetch")]);
    let registry = registry(vec![
        ("fetch", static_worker("data", 1)),
        ("summarizer", static_worker("summary", "aggregated")),
    ]);

    let result = run_plan(plan, registry).await;

    assert_eq!(result.context.get("summary"), Some(&json!("aggregated")));
    assert_eq!(
        result
            .status_log
            .terminal_state(&TaskId::from("aggregate")),
        Some(TaskState::Completed)
    );
}

#[tokio::test]
async fn test_task_produced_summary_short_circuits_aggregation() {
    let plan = ExecutionPlan::new(vec![SubTask::new("a", "report")]);
    let registry = registry(vec![
        ("report", static_worker("summary", "from the task")),
        ("summarizer", static_worker("summary", "from the aggregator")),
    ]);

    let result = run_plan(plan, registry).await;

    assert_eq!(
        result.context.get("summary"),
        Some(&json!("from the task"))
    );
    assert!(result
        .status_log
        .for_task(&TaskId::from("aggregate"))
        .is_empty());
}

#[tokio::test]
async fn test_fallback_summary_when_aggregator_missing() {
    let plan = ExecutionPlan::new(vec![SubTask::new("a", "fetch")]);
    let registry = registry(vec![("fetch", static_worker("data", 1))]);

    let result = run_plan(plan, registry).await;

    let summary = result
        .context
        .get("summary")
        .and_then(|v| v.as_str())
        .expect("fallback summary should exist");
    assert!(summary.contains("1 of 1 task(s) completed"));
    assert_eq!(
        result
            .status_log
            .terminal_state(&TaskId::from("aggregate")),
        Some(TaskState::Failed)
    );
}

#[tokio::test]
async fn test_data_needs_projection_limits_visibility() {
    let (recording, seen) = RecordingWorker::new(fragment("checked", true));
    let plan = ExecutionPlan::new(vec![
        SubTask::new("a", "fetch"),
        SubTask::new("b", "lookup"),
        SubTask::new("c", "probe")
            .depends(&["a", "b"])
            .needs(&["data"]),
    ]);
    let registry = registry(vec![
        ("fetch", static_worker("data", 1)),
        ("lookup", static_worker("definition", "x")),
        ("probe", Arc::new(recording)),
    ]);

    run_plan(plan, registry).await;

    let recordings = seen.lock().unwrap();
    assert_eq!(recordings.len(), 1);
    // Only the goal and the declared "data" key are visible; the
    // sibling output "definition" is not.
    assert_eq!(recordings[0], vec!["data".to_string(), "goal".to_string()]);
}

#[tokio::test]
async fn test_worker_status_table_reflects_latest_states() {
    let plan = ExecutionPlan::new(vec![
        SubTask::new("a", "fetch"),
        SubTask::new("b", "lookup").depends(&["a"]),
    ]);
    let registry = registry(vec![
        ("fetch", static_worker("data", 1)),
        ("lookup", static_worker("definition", "x")),
        ("summarizer", static_worker("summary", "s")),
    ]);

    let result = run_plan(plan, registry).await;

    assert_eq!(
        result.worker_status.get("fetch"),
        Some(TaskState::Completed)
    );
    assert_eq!(
        result.worker_status.get("lookup"),
        Some(TaskState::Completed)
    );
    assert_eq!(
        result.worker_status.get("summarizer"),
        Some(TaskState::Completed)
    );
}

#[tokio::test]
async fn test_composite_result_serializes() {
    let plan = ExecutionPlan::new(vec![SubTask::new("a", "fetch")]);
    let registry = registry(vec![
        ("fetch", static_worker("data", 1)),
        ("summarizer", static_worker("summary", "s")),
    ]);

    let result = run_plan(plan, registry).await;
    let json = serde_json::to_string(&result).unwrap();

    assert!(json.contains("\"status_log\""));
    assert!(json.contains("\"worker_status\""));
    assert!(json.contains("\"plan\""));
    assert!(json.contains("\"phases\""));
}

#[tokio::test]
async fn test_empty_plan_still_produces_result() {
    let plan = ExecutionPlan::new(vec![]);
    let registry = registry(vec![]);

    let result = run_plan(plan, registry).await;

    assert_eq!(result.context.goal(), "integration goal");
    // Fallback summary is synthesized even with nothing to run.
    assert!(result.context.contains("summary"));
    assert_eq!(result.phases.last().unwrap().phase, RunPhase::Done);
}

#[tokio::test]
async fn test_multi_worker_task_merges_in_declared_order() {
    let plan = ExecutionPlan::new(vec![SubTask::new("a", "first")
        .with_workers(&["first", "second"])]);
    let registry = registry(vec![
        ("first", static_worker("x", "from first")),
        ("second", static_worker("x", "from second")),
        ("summarizer", static_worker("summary", "s")),
    ]);

    let result = run_plan(plan, registry).await;

    // Within one task, the later declared worker wins deterministically.
    assert_eq!(result.context.get("x"), Some(&json!("from second")));
}
