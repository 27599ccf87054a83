//! Core types and traits for the crucible refinement loop.
//!
//! This crate holds everything the other crates agree on: the error taxonomy,
//! chat and call types, the rubric, per-task state and logs, configuration and
//! the embedded prompt templates. It performs no network I/O itself.

/// Layered configuration loaded from `~/.crucible/config.toml`.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Append-only per-task interaction log.
pub mod log;
/// Embedded prompt templates.
pub mod prompts;
/// Evaluation criteria.
pub mod rubric;
/// Poison-tolerant lock helpers.
pub mod sync;
/// Task specifications, state, verdicts and reports.
pub mod task;
/// Trait seams implemented by other crates.
pub mod traits;
/// Chat and model call types.
pub mod types;

pub use config::{CrucibleConfig, EndpointConfig, ExecutionConfig, FetchConfig, ModelsConfig};
pub use error::{CallFailure, Error, ErrorCategory, FailureKind, FetchError, Result};
pub use log::{InteractionLog, LogEntry};
pub use rubric::Rubric;
pub use sync::IgnoreLock;
pub use task::{
    EvaluationVerdict, LOG_EXCERPT_LEN, TaskOutcome, TaskReport, TaskSpec, TaskState, TaskStatus,
    VerdictStatus,
};
pub use traits::ContentFetcher;
pub use types::{CallDefaults, CallOptions, ChatMessage, ModelCallRequest, Role};
