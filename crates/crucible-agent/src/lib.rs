//! Worker/evaluator refinement loop for LLM tasks.
//!
//! - [`augment`]: inlines fetched web content for `[FETCH_URL: ...]` prompts
//! - [`worker`] and [`evaluator`]: the two model roles
//! - [`orchestrator`]: the bounded per-task refinement state machine
//! - [`runner`]: concurrent execution of many tasks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use crucible_agent::{Evaluator, PromptAugmenter, RefinementOrchestrator, TaskRunner, Worker};
//! use crucible_core::{CrucibleConfig, TaskSpec};
//! use crucible_providers::{HttpContentFetcher, ModelGateway};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CrucibleConfig::load_or_create()?;
//! let gateway = Arc::new(ModelGateway::from_config(&config)?);
//! let fetcher = Arc::new(HttpContentFetcher::new(&config.fetch)?);
//!
//! let worker = Worker::new(
//!     Arc::clone(&gateway),
//!     PromptAugmenter::new(fetcher, config.fetch.max_context_chars),
//!     config.models.worker_model.clone(),
//! );
//! let evaluator = Evaluator::new(gateway, config.models.evaluator_model.clone());
//! let orchestrator = RefinementOrchestrator::new(
//!     Arc::new(worker),
//!     Arc::new(evaluator),
//!     Arc::new(config.rubric.clone()),
//!     config.execution.max_iterations,
//! )?;
//!
//! let outcomes = TaskRunner::new(Arc::new(orchestrator))
//!     .run_all(vec![TaskSpec::new("demo", "Explain borrowing in two sentences.")])
//!     .await;
//! # drop(outcomes);
//! # Ok(())
//! # }
//! ```

/// Prompt augmentation for fetch directives.
pub mod augment;
/// Evaluator role.
pub mod evaluator;
/// Per-task refinement state machine.
pub mod orchestrator;
/// Concurrent task execution.
pub mod runner;
/// Seams for the worker and evaluator roles.
pub mod traits;
/// Worker role.
pub mod worker;

pub use augment::{FetchDirective, PromptAugmenter, parse_directive};
pub use evaluator::Evaluator;
pub use orchestrator::{RefinementOrchestrator, RefinementState};
pub use runner::TaskRunner;
pub use traits::{TaskEvaluator, TaskWorker};
pub use worker::Worker;
