//! Command handlers for CLI operations

use std::fs::OpenOptions;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use futures::StreamExt as _;
use tokio::signal::ctrl_c;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use crucible_agent::{Evaluator, PromptAugmenter, RefinementOrchestrator, TaskRunner, Worker};
use crucible_core::{
    CallOptions, ChatMessage, CrucibleConfig, LogEntry, TaskOutcome, VerdictStatus,
};
use crucible_providers::{HttpContentFetcher, ModelCallOutcome, ModelGateway};

use crate::cli::GlobalArgs;
use crate::tasks::collect_tasks;

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "crucible_agent=info,crucible_providers=info,crucible_cli=info";
/// Characters of each log entry shown in run summaries.
const SUMMARY_PREVIEW_CHARS: usize = 100;
/// Replacement for a credential stored in the config file.
const REDACTED: &str = "********";

/// Installs the global tracing subscriber.
///
/// Logs go to stderr, or to `log_file` without ANSI colors.
///
/// # Errors
/// Returns an error if the log file cannot be opened.
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = Registry::default().with(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            registry
                .with(
                    fmt::layer()
                        .with_writer(Arc::new(file))
                        .with_ansi(false)
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
        None => registry
            .with(fmt::layer().with_writer(io::stderr).with_target(true))
            .init(),
    }

    Ok(())
}

/// Loads the configuration and applies command-line overrides.
///
/// Without `--config` the file at `~/.crucible/config.toml` is used and created
/// with defaults when missing.
///
/// # Errors
/// Returns an error if the file cannot be read or the result is invalid.
pub fn load_config(global: &GlobalArgs) -> Result<(CrucibleConfig, PathBuf)> {
    let (mut config, path) = match &global.config {
        Some(path) => (CrucibleConfig::load_from_file(path)?, path.clone()),
        None => (
            CrucibleConfig::load_or_create()?,
            CrucibleConfig::config_path()?,
        ),
    };

    if let Some(max_iterations) = global.max_iterations {
        config.execution.max_iterations = max_iterations;
    }
    if let Some(concurrency) = global.concurrency {
        config.execution.max_concurrent_calls = Some(concurrency);
    }
    config.validate()?;

    Ok((config, path))
}

/// Wires gateway, fetcher, worker and evaluator into a task runner.
///
/// # Errors
/// Returns an error if an HTTP client cannot be built or the loop cannot be set up.
pub fn build_runner(config: &CrucibleConfig) -> Result<TaskRunner> {
    let gateway = Arc::new(ModelGateway::from_config(config)?);
    let fetcher = Arc::new(HttpContentFetcher::new(&config.fetch)?);

    let worker = Worker::new(
        Arc::clone(&gateway),
        PromptAugmenter::new(fetcher, config.fetch.max_context_chars),
        config.models.worker_model.clone(),
    );
    let evaluator = Evaluator::new(gateway, config.models.evaluator_model.clone());

    let orchestrator = RefinementOrchestrator::new(
        Arc::new(worker),
        Arc::new(evaluator),
        Arc::new(config.rubric.clone()),
        config.execution.max_iterations,
    )?;
    Ok(TaskRunner::new(Arc::new(orchestrator)))
}

/// Handle `crucible run`
///
/// # Errors
/// Returns an error if tasks cannot be loaded, the run is interrupted, or
/// output cannot be written.
pub async fn handle_run(
    config: &CrucibleConfig,
    tasks_file: Option<&Path>,
    prompts: &[String],
    json: bool,
) -> Result<()> {
    let specs = collect_tasks(tasks_file, prompts)?;
    let runner = build_runner(config)?;
    info!(tasks = specs.len(), "Launching tasks concurrently");

    let outcomes = tokio::select! {
        outcomes = runner.run_all(specs) => outcomes,
        signal = ctrl_c() => {
            signal?;
            warn!("Interrupted, cancelling running tasks");
            bail!("Run interrupted");
        }
    };

    let output = if json {
        serde_json::to_string_pretty(&outcomes)?
    } else {
        outcomes
            .iter()
            .map(render_outcome)
            .collect::<Vec<_>>()
            .join("\n")
    };

    #[allow(clippy::print_stdout, reason = "Run results are the command output")]
    {
        println!("{output}");
    }
    Ok(())
}

/// Handle `crucible ask`
///
/// # Errors
/// Returns an error if no credential is configured or the call fails.
pub async fn handle_ask(
    config: &CrucibleConfig,
    prompt: String,
    model: Option<String>,
    stream: bool,
) -> Result<()> {
    let gateway = ModelGateway::from_config(config)?;
    if !gateway.is_configured() {
        bail!(
            "No API key configured; set endpoint.api_key or the {} environment variable",
            config.endpoint.api_key_env
        );
    }

    let model = model.unwrap_or_else(|| config.models.worker_model.clone());
    let messages = vec![ChatMessage::user(prompt)];

    if !stream {
        let answer = gateway
            .complete(&model, messages, CallOptions::default())
            .await?;
        #[allow(clippy::print_stdout, reason = "Model answer is the command output")]
        {
            println!("{answer}");
        }
        return Ok(());
    }

    match gateway
        .stream(&model, messages, CallOptions::streaming())
        .await
    {
        ModelCallOutcome::Stream(mut chunks) => {
            let mut stdout = io::stdout();
            while let Some(chunk) = chunks.next().await {
                stdout.write_all(chunk.as_bytes())?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
            Ok(())
        }
        ModelCallOutcome::Text(text) => {
            writeln!(io::stdout(), "{text}")?;
            Ok(())
        }
        ModelCallOutcome::Failure(failure) => Err(failure.into()),
    }
}

/// Handle `crucible config`
///
/// # Errors
/// Returns an error if the configuration cannot be serialized.
pub fn handle_config(config: &CrucibleConfig, path: &Path) -> Result<()> {
    let output = format!(
        "# Configuration file: {}\n{}",
        path.display(),
        render_config(config)?
    );
    #[allow(clippy::print_stdout, reason = "Configuration is the command output")]
    {
        print!("{output}");
    }
    Ok(())
}

/// Effective configuration as TOML with the credential masked.
///
/// # Errors
/// Returns an error if the configuration cannot be serialized.
pub fn render_config(config: &CrucibleConfig) -> Result<String> {
    let mut shown = config.clone();
    if shown.endpoint.api_key.is_some() {
        shown.endpoint.api_key = Some(REDACTED.to_owned());
    }
    Ok(toml::to_string_pretty(&shown)?)
}

/// One summary block per task: status line, then the log excerpt.
pub fn render_outcome(outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Faulted { task_id, error } => format!("{task_id}: faulted ({error})"),
        TaskOutcome::Completed(report) => {
            let headline = format!(
                "{}: {} after {} iteration(s) in {} ms",
                report.task_id,
                report.status,
                report.iterations,
                report.duration_ms()
            );
            let excerpt = report
                .excerpt()
                .iter()
                .map(|entry| format!("  {}", describe_entry(entry)));
            [headline].into_iter().chain(excerpt).collect::<Vec<_>>().join("\n")
        }
    }
}

/// Single-line preview of a log entry.
fn describe_entry(entry: &LogEntry) -> String {
    match entry {
        LogEntry::LlmMessage { role, content } => {
            format!("[{role}] {}", preview(content))
        }
        LogEntry::Evaluation {
            evaluator_model,
            verdict,
        } => {
            let status = match verdict.status {
                VerdictStatus::Approved => "approved",
                VerdictStatus::Rejected => "rejected",
                VerdictStatus::Error => "error",
            };
            format!(
                "[evaluation {status} by {evaluator_model}] {}",
                preview(&verdict.feedback)
            )
        }
        LogEntry::SystemMessage { text } => format!("[system] {}", preview(text)),
    }
}

/// First characters of `text` on one line.
fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(SUMMARY_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test code is allowed to unwrap")]
mod tests {
    use super::*;
    use chrono::Utc;
    use crucible_core::{EvaluationVerdict, Role, TaskReport, TaskSpec, TaskState, TaskStatus};

    fn report_with(build: impl FnOnce(&mut TaskState), status: TaskStatus) -> TaskReport {
        let mut state = TaskState::new(&TaskSpec::new("demo", "Say hi"));
        build(&mut state);
        state.finish(status);
        TaskReport::from_state(state, Utc::now())
    }

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("a\n  b\tc"), "a b c");
        let long = "x".repeat(150);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(100)));
    }

    #[test]
    fn test_render_completed_outcome() {
        let report = report_with(
            |state| {
                state.iteration_count = 1;
                state.log.push_message(Role::User, "Say hi");
                state.log.push_message(Role::Assistant, "Hi!");
                state
                    .log
                    .push_evaluation("judge", EvaluationVerdict::approved("Good.", None));
            },
            TaskStatus::Approved,
        );

        let text = render_outcome(&TaskOutcome::Completed(report));
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("demo: approved after 1 iteration(s) in "));
        assert_eq!(lines[1], "  [user] Say hi");
        assert_eq!(lines[2], "  [assistant] Hi!");
        assert_eq!(lines[3], "  [evaluation approved by judge] Good.");
    }

    #[test]
    fn test_render_faulted_outcome() {
        let outcome = TaskOutcome::Faulted {
            task_id: "boom".to_owned(),
            error: "task panicked: oops".to_owned(),
        };
        assert_eq!(render_outcome(&outcome), "boom: faulted (task panicked: oops)");
    }

    #[test]
    fn test_render_config_masks_api_key() {
        let mut config = CrucibleConfig::default();
        config.endpoint.api_key = Some("nvapi-secret".to_owned());

        let rendered = render_config(&config).unwrap();
        assert!(!rendered.contains("nvapi-secret"));
        assert!(rendered.contains(REDACTED));
        assert!(rendered.contains("max_iterations = 3"));
        assert_eq!(config.endpoint.api_key.as_deref(), Some("nvapi-secret"));
    }
}
