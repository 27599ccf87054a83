//! Per-task worker/evaluator refinement loop.
//!
//! Each iteration asks the worker for an answer, logs the exchange, asks the
//! evaluator to judge the answer against the *original* prompt, and either
//! stops or derives a revision prompt from the evaluator's feedback. The loop
//! is bounded by `max_iterations` and every exit records a terminal status.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crucible_core::prompts::{fill_template, load_prompt};
use crucible_core::{
    Error, Result, Role, Rubric, TaskReport, TaskSpec, TaskState, TaskStatus,
};

use crate::traits::{TaskEvaluator, TaskWorker};

/// Position of a task in the refinement state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementState {
    /// About to run the given 0-based iteration.
    Running(u32),
    /// The evaluator approved an answer.
    Approved,
    /// The worker produced no answer.
    WorkerFailed,
    /// The evaluator produced no verdict.
    EvaluatorFailed,
    /// The iteration budget ran out without approval.
    Exhausted,
}

impl RefinementState {
    /// Task status for a terminal state, `None` while running.
    pub fn terminal_status(self) -> Option<TaskStatus> {
        match self {
            Self::Running(_) => None,
            Self::Approved => Some(TaskStatus::Approved),
            Self::WorkerFailed => Some(TaskStatus::WorkerFailed),
            Self::EvaluatorFailed => Some(TaskStatus::EvaluatorFailed),
            Self::Exhausted => Some(TaskStatus::RejectedMaxIterations),
        }
    }
}

/// Drives one task through the refinement loop.
pub struct RefinementOrchestrator {
    worker: Arc<dyn TaskWorker>,
    evaluator: Arc<dyn TaskEvaluator>,
    rubric: Arc<Rubric>,
    max_iterations: u32,
    /// Template for every prompt after the first.
    revision_template: String,
}

impl RefinementOrchestrator {
    /// Creates an orchestrator allowing at most `max_iterations` worker calls per task.
    ///
    /// # Errors
    /// Returns an error if `max_iterations` is zero or the revision prompt cannot be loaded.
    pub fn new(
        worker: Arc<dyn TaskWorker>,
        evaluator: Arc<dyn TaskEvaluator>,
        rubric: Arc<Rubric>,
        max_iterations: u32,
    ) -> Result<Self> {
        if max_iterations == 0 {
            return Err(Error::Config("max_iterations must be at least 1".to_owned()));
        }
        let revision_template = load_prompt("revision").map_err(Error::Other)?;

        Ok(Self {
            worker,
            evaluator,
            rubric,
            max_iterations,
            revision_template,
        })
    }

    /// Runs a task and returns its report.
    pub async fn run(&self, spec: &TaskSpec) -> TaskReport {
        let started_at = Utc::now();
        let state = self.run_task(spec).await;
        TaskReport::from_state(state, started_at)
    }

    /// Runs a task to a terminal state and returns its final state.
    pub async fn run_task(&self, spec: &TaskSpec) -> TaskState {
        let mut state = TaskState::new(spec);
        info!(max_iterations = self.max_iterations, "Task started");

        let mut phase = RefinementState::Running(0);
        while let RefinementState::Running(iteration) = phase {
            phase = self.iterate(&mut state, iteration).await;
        }

        let status = phase
            .terminal_status()
            .unwrap_or(TaskStatus::Unknown);
        state.finish(status);
        info!(
            status = %status,
            iterations = state.iteration_count,
            "Task finished"
        );
        state
    }

    /// Runs one iteration and returns the next state.
    async fn iterate(&self, state: &mut TaskState, iteration: u32) -> RefinementState {
        let number = iteration + 1;
        state.iteration_count = number;
        info!(iteration = number, max = self.max_iterations, "Starting iteration");

        let history = state.log.conversation_history();
        let answer = match self.worker.respond(&state.current_prompt, &history).await {
            Ok(answer) => answer,
            Err(failure) => {
                warn!(
                    iteration = number,
                    category = %failure.kind.category(),
                    "Worker failed: {failure}"
                );
                state.log.push_system(format!(
                    "Worker failed to produce a response on iteration {number}: {failure}"
                ));
                return RefinementState::WorkerFailed;
            }
        };

        state.log.push_message(Role::User, state.current_prompt.clone());
        state.log.push_message(Role::Assistant, answer.clone());

        let verdict = self
            .evaluator
            .evaluate(&state.original_prompt, &answer, &self.rubric)
            .await;
        if verdict.is_error() {
            warn!(iteration = number, "Evaluator produced no verdict");
            state.log.push_system(format!(
                "Evaluator failed to produce a verdict on iteration {number}"
            ));
            return RefinementState::EvaluatorFailed;
        }

        let approved = verdict.is_approved();
        let feedback = verdict.feedback.clone();
        state
            .log
            .push_evaluation(self.evaluator.model_id(), verdict);

        if approved {
            info!(iteration = number, "Response approved");
            return RefinementState::Approved;
        }

        if number < self.max_iterations {
            info!(iteration = number, "Response rejected, requesting revision");
            state.current_prompt = self.revision_prompt(&state.original_prompt, &feedback);
            RefinementState::Running(number)
        } else {
            info!(iteration = number, "Response rejected, iteration budget exhausted");
            RefinementState::Exhausted
        }
    }

    /// Prompt asking the worker to revise its answer.
    pub fn revision_prompt(&self, original_prompt: &str, feedback: &str) -> String {
        fill_template(
            &self.revision_template,
            &[("original_prompt", original_prompt), ("feedback", feedback)],
        )
    }
}
