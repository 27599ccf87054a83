use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::{Id as TaskHandleId, JoinError, JoinSet};
use tracing::{Instrument as _, error, info, info_span};

use crucible_core::{TaskOutcome, TaskSpec};

use crate::orchestrator::RefinementOrchestrator;

/// Runs many tasks concurrently, one orchestrator run per task.
///
/// Tasks share only the model gateway behind the orchestrator. A task that
/// panics is reported as faulted without affecting the others, and dropping
/// the future returned by [`TaskRunner::run_all`] aborts every task it spawned.
pub struct TaskRunner {
    orchestrator: Arc<RefinementOrchestrator>,
}

impl TaskRunner {
    /// Creates a runner driving tasks through `orchestrator`.
    pub fn new(orchestrator: Arc<RefinementOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Runs every spec to completion and returns outcomes in input order.
    pub async fn run_all(&self, specs: Vec<TaskSpec>) -> Vec<TaskOutcome> {
        info!(tasks = specs.len(), "Running tasks");

        let mut join_set = JoinSet::new();
        let mut positions: HashMap<TaskHandleId, usize> = HashMap::with_capacity(specs.len());
        let task_ids: Vec<String> = specs.iter().map(|spec| spec.id.clone()).collect();

        for (index, spec) in specs.into_iter().enumerate() {
            let orchestrator = Arc::clone(&self.orchestrator);
            let span = info_span!("task", task_id = %spec.id);
            let handle = join_set.spawn(
                async move { orchestrator.run(&spec).await }.instrument(span),
            );
            positions.insert(handle.id(), index);
        }

        let mut outcomes: Vec<Option<TaskOutcome>> = task_ids.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((handle_id, report)) => {
                    if let Some(&index) = positions.get(&handle_id) {
                        outcomes[index] = Some(TaskOutcome::Completed(report));
                    }
                }
                Err(join_error) => {
                    if let Some(&index) = positions.get(&join_error.id()) {
                        let task_id = task_ids[index].clone();
                        let description = describe_fault(join_error);
                        error!(task_id = %task_id, "Task faulted: {description}");
                        outcomes[index] = Some(TaskOutcome::Faulted {
                            task_id,
                            error: description,
                        });
                    }
                }
            }
        }

        outcomes
            .into_iter()
            .zip(task_ids)
            .map(|(outcome, task_id)| {
                outcome.unwrap_or_else(|| TaskOutcome::Faulted {
                    task_id,
                    error: "task produced no outcome".to_owned(),
                })
            })
            .collect()
    }
}

/// Human readable description of a failed task.
fn describe_fault(join_error: JoinError) -> String {
    if join_error.is_cancelled() {
        return "task was cancelled".to_owned();
    }
    match join_error.try_into_panic() {
        Ok(payload) => format!("task panicked: {}", panic_message(payload.as_ref())),
        Err(other) => other.to_string(),
    }
}

/// Extracts the message of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
