//! Task specifications, per-task state, verdicts and results.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::log::{InteractionLog, LogEntry};
use crate::types::Role;

/// Number of trailing log entries reported for a finished task.
pub const LOG_EXCERPT_LEN: usize = 3;

/// One unit of work handed to the task runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Caller-chosen identifier, used in logs and reports.
    #[serde(alias = "task_id")]
    pub id: String,
    /// Initial prompt for the worker.
    pub prompt: String,
}

impl TaskSpec {
    /// Creates a task with an explicit id.
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
        }
    }

    /// Creates a task with a generated id.
    pub fn with_generated_id(prompt: impl Into<String>) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self::new(format!("task-{}", &uuid[..8]), prompt)
    }
}

/// Final outcome of a task's refinement loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The evaluator approved a worker answer.
    Approved,
    /// The worker could not produce an answer.
    WorkerFailed,
    /// The evaluator could not produce a verdict.
    EvaluatorFailed,
    /// Every allowed iteration was rejected.
    RejectedMaxIterations,
    /// Not finished yet.
    #[default]
    Unknown,
}

impl TaskStatus {
    /// Stable snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::WorkerFailed => "worker_failed",
            Self::EvaluatorFailed => "evaluator_failed",
            Self::RejectedMaxIterations => "rejected_max_iterations",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this status ends a task.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Judgement class of an evaluator verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    /// No rubric criterion failed.
    Approved,
    /// At least one criterion failed.
    Rejected,
    /// The evaluator itself failed; says nothing about the answer.
    Error,
}

/// Result of one evaluator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    /// Judgement class.
    pub status: VerdictStatus,
    /// Free-text feedback for the worker.
    pub feedback: String,
    /// The parsed verdict structure as returned by the model.
    pub raw: Option<Value>,
}

impl EvaluationVerdict {
    /// An approving verdict.
    pub fn approved(feedback: impl Into<String>, raw: Option<Value>) -> Self {
        Self {
            status: VerdictStatus::Approved,
            feedback: feedback.into(),
            raw,
        }
    }

    /// A rejecting verdict.
    pub fn rejected(feedback: impl Into<String>, raw: Option<Value>) -> Self {
        Self {
            status: VerdictStatus::Rejected,
            feedback: feedback.into(),
            raw,
        }
    }

    /// The verdict returned when no judgement could be obtained.
    pub fn error() -> Self {
        Self {
            status: VerdictStatus::Error,
            feedback: String::new(),
            raw: None,
        }
    }

    /// Whether the answer was approved.
    pub fn is_approved(&self) -> bool {
        self.status == VerdictStatus::Approved
    }

    /// Whether the evaluator failed.
    pub fn is_error(&self) -> bool {
        self.status == VerdictStatus::Error
    }
}

/// Mutable state of one running task, owned by its orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    /// Task identifier.
    pub task_id: String,
    /// Prompt the task started with; never changes.
    pub original_prompt: String,
    /// Prompt for the current iteration.
    pub current_prompt: String,
    /// Everything that happened so far.
    pub log: InteractionLog,
    /// Worker invocations started so far.
    pub iteration_count: u32,
    final_status: TaskStatus,
}

impl TaskState {
    /// Fresh state for a task that has not started iterating.
    pub fn new(spec: &TaskSpec) -> Self {
        Self {
            task_id: spec.id.clone(),
            original_prompt: spec.prompt.clone(),
            current_prompt: spec.prompt.clone(),
            log: InteractionLog::new(),
            iteration_count: 0,
            final_status: TaskStatus::Unknown,
        }
    }

    /// Terminal status, `Unknown` until [`Self::finish`] was called.
    pub fn final_status(&self) -> TaskStatus {
        self.final_status
    }

    /// Records the terminal status. Only the first call has an effect.
    pub fn finish(&mut self, status: TaskStatus) {
        if self.final_status.is_terminal() {
            warn!(
                task_id = %self.task_id,
                "Ignoring second terminal status {status}; task already {}",
                self.final_status
            );
            return;
        }
        self.final_status = status;
    }

    /// Content of the most recent assistant turn.
    pub fn last_response(&self) -> Option<&str> {
        self.log
            .entries()
            .iter()
            .rev()
            .find_map(|entry| match entry {
                LogEntry::LlmMessage {
                    role: Role::Assistant,
                    content,
                } => Some(content.as_str()),
                LogEntry::LlmMessage { .. }
                | LogEntry::Evaluation { .. }
                | LogEntry::SystemMessage { .. } => None,
            })
    }
}

/// Result record of a finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    /// Task identifier.
    pub task_id: String,
    /// Terminal status.
    pub status: TaskStatus,
    /// Worker invocations performed.
    pub iterations: u32,
    /// Last worker answer, if any was produced.
    pub final_response: Option<String>,
    /// Full interaction log of the task.
    pub log: InteractionLog,
    /// When the task started.
    pub started_at: DateTime<Utc>,
    /// When the task reached its terminal state.
    pub finished_at: DateTime<Utc>,
}

impl TaskReport {
    /// Builds the report from a finished task state.
    pub fn from_state(state: TaskState, started_at: DateTime<Utc>) -> Self {
        Self {
            final_response: state.last_response().map(str::to_owned),
            status: state.final_status(),
            iterations: state.iteration_count,
            task_id: state.task_id,
            log: state.log,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// The last few log entries.
    pub fn excerpt(&self) -> &[LogEntry] {
        self.log.tail(LOG_EXCERPT_LEN)
    }

    /// Wall-clock duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .try_into()
            .unwrap_or(0)
    }
}

/// What the task runner reports for each submitted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The task reached a terminal state.
    Completed(TaskReport),
    /// The task died with an unexpected fault.
    Faulted {
        /// Task identifier.
        task_id: String,
        /// Description of the fault.
        error: String,
    },
}

impl TaskOutcome {
    /// Identifier of the task this outcome belongs to.
    pub fn task_id(&self) -> &str {
        match self {
            Self::Completed(report) => &report.task_id,
            Self::Faulted { task_id, .. } => task_id,
        }
    }

    /// The report, when the task completed.
    pub fn report(&self) -> Option<&TaskReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Faulted { .. } => None,
        }
    }
}
