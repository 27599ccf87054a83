//! Integration tests for running many tasks concurrently.

#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use common::{Harness, approval_json};
use crucible_agent::{RefinementOrchestrator, TaskEvaluator, TaskRunner, TaskWorker};
use crucible_core::{
    CallFailure, ChatMessage, EvaluationVerdict, LogEntry, Role, Rubric, TaskOutcome, TaskSpec,
    TaskStatus,
};
use crucible_providers::ScriptedBackend;
use tokio::time::{sleep, timeout};

fn specs(count: usize) -> Vec<TaskSpec> {
    (0..count)
        .map(|index| TaskSpec::new(format!("task-{index}"), format!("Prompt number {index}")))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_keep_separate_logs() -> Result<()> {
    // One backend serves both roles so its peak counts every admitted call.
    // Evaluator prompts carry the task block; worker prompts get echoed back.
    let shared = ScriptedBackend::new()
        .with_response("<original_task>", approval_json())
        .with_delay(Duration::from_millis(20));
    let harness = Harness::new(shared.clone(), shared.clone(), 3, 2);
    let runner = TaskRunner::new(Arc::clone(&harness.orchestrator));

    let outcomes = runner.run_all(specs(8)).await;
    assert_eq!(outcomes.len(), 8);

    for (index, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.task_id(), format!("task-{index}"));
        let Some(report) = outcome.report() else {
            bail!("task-{index} faulted: {outcome:?}");
        };
        assert_eq!(report.status, TaskStatus::Approved);

        let prompt = format!("Prompt number {index}");
        let expected_answer = format!("Scripted response to: {prompt}");
        for entry in report.log.entries() {
            match entry {
                LogEntry::LlmMessage { role: Role::User, content } => assert_eq!(*content, prompt),
                LogEntry::LlmMessage { content, .. } => assert_eq!(*content, expected_answer),
                LogEntry::Evaluation { evaluator_model, .. } => {
                    assert_eq!(evaluator_model, "evaluator-model");
                }
                LogEntry::SystemMessage { text } => bail!("unexpected note {text}"),
            }
        }
    }

    let peak = shared.peak_in_flight();
    assert!((1..=3).contains(&peak), "combined in-flight peak was {peak}");
    assert_eq!(shared.call_count(), 16);
    assert_eq!(harness.gate.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn test_empty_batch() {
    let harness = Harness::new(ScriptedBackend::new(), ScriptedBackend::new(), 1, 1);
    let outcomes = TaskRunner::new(harness.orchestrator).run_all(Vec::new()).await;
    assert!(outcomes.is_empty());
}

/// Worker that panics on prompts mentioning "explode".
struct VolatileWorker;

#[async_trait]
impl TaskWorker for VolatileWorker {
    async fn respond(&self, task_prompt: &str, _: &[ChatMessage]) -> Result<String, CallFailure> {
        sleep(Duration::from_millis(10)).await;
        if task_prompt.contains("explode") {
            panic!("worker exploded on {task_prompt}");
        }
        Ok(format!("fine: {task_prompt}"))
    }
}

/// Evaluator approving everything.
struct Approver;

#[async_trait]
impl TaskEvaluator for Approver {
    fn model_id(&self) -> &str {
        "approver"
    }

    async fn evaluate(&self, _: &str, _: &str, _: &Rubric) -> EvaluationVerdict {
        EvaluationVerdict::approved("", None)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_task_does_not_affect_others() -> Result<()> {
    let orchestrator = RefinementOrchestrator::new(
        Arc::new(VolatileWorker),
        Arc::new(Approver),
        Arc::new(Rubric::default()),
        3,
    )?;
    let runner = TaskRunner::new(Arc::new(orchestrator));

    let outcomes = runner
        .run_all(vec![
            TaskSpec::new("calm-1", "stay calm"),
            TaskSpec::new("boom", "please explode"),
            TaskSpec::new("calm-2", "stay calm too"),
        ])
        .await;

    let ids: Vec<&str> = outcomes.iter().map(TaskOutcome::task_id).collect();
    assert_eq!(ids, ["calm-1", "boom", "calm-2"]);

    match &outcomes[1] {
        TaskOutcome::Faulted { error, .. } => {
            assert!(error.starts_with("task panicked:"), "{error}");
            assert!(error.contains("please explode"));
        }
        TaskOutcome::Completed(report) => bail!("expected a fault, got {report:?}"),
    }
    for outcome in [&outcomes[0], &outcomes[2]] {
        let status = outcome.report().map(|report| report.status);
        assert_eq!(status, Some(TaskStatus::Approved));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_run_all_releases_gate() -> Result<()> {
    let harness = Harness::new(
        ScriptedBackend::new().with_delay(Duration::from_secs(30)),
        ScriptedBackend::new().with_default_response(approval_json()),
        2,
        1,
    );
    let runner = TaskRunner::new(Arc::clone(&harness.orchestrator));

    if timeout(Duration::from_millis(100), runner.run_all(specs(4)))
        .await
        .is_ok()
    {
        bail!("run_all finished despite a 30s worker delay");
    }

    timeout(Duration::from_secs(2), async {
        while harness.gate.in_flight() > 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .context("aborted tasks kept their gate slots")?;
    assert_eq!(harness.evaluator_backend.call_count(), 0);
    Ok(())
}
