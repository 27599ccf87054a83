//! Task definitions for `crucible run`.
//!
//! Tasks come from a TOML file (`[[tasks]]` tables with `id` and `prompt`), a
//! JSON array of the same objects, `--prompt` arguments, or the built-in demo
//! set when nothing else is given.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result, bail};
use serde::Deserialize;

use crucible_core::TaskSpec;

/// TOML task file layout.
#[derive(Debug, Deserialize)]
struct TaskFile {
    #[serde(default)]
    tasks: Vec<TaskSpec>,
}

/// Tasks run when none are given.
pub fn demo_tasks() -> Vec<TaskSpec> {
    vec![
        TaskSpec::new(
            "Task-Alpha",
            "Describe quantum computing in simple terms, suitable for a high school student.",
        ),
        TaskSpec::new(
            "Task-Beta",
            "Write a short, optimistic poem about the future of AI.",
        ),
        TaskSpec::new(
            "Task-Gamma",
            "What are the key ingredients in a Margherita pizza? [FETCH_URL: https://en.wikipedia.org/wiki/Margherita_pizza] Please list them based on the source if possible.",
        ),
        TaskSpec::new(
            "Task-Delta",
            "Explain the benefits of asynchronous programming in Python.",
        ),
    ]
}

/// Parses a TOML task file.
///
/// # Errors
/// Returns an error if the content is not valid TOML of the expected shape.
pub fn parse_toml_tasks(contents: &str) -> Result<Vec<TaskSpec>> {
    let file: TaskFile = toml::from_str(contents).context("Invalid TOML task file")?;
    Ok(file.tasks)
}

/// Parses a JSON task array.
///
/// # Errors
/// Returns an error if the content is not a JSON array of tasks.
pub fn parse_json_tasks(contents: &str) -> Result<Vec<TaskSpec>> {
    serde_json::from_str(contents).context("Invalid JSON task file")
}

/// Loads tasks from a file, choosing the format by extension.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_tasks(path: &Path) -> Result<Vec<TaskSpec>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read task file {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let parsed = if is_json {
        parse_json_tasks(&contents)
    } else {
        parse_toml_tasks(&contents)
    };
    parsed.with_context(|| format!("Failed to load tasks from {}", path.display()))
}

/// Assembles the task list for a run.
///
/// File tasks come first, then one task per prompt. With neither, the demo
/// tasks are returned.
///
/// # Errors
/// Returns an error if the file cannot be loaded, a prompt is blank, or two
/// tasks share an id.
pub fn collect_tasks(file: Option<&Path>, prompts: &[String]) -> Result<Vec<TaskSpec>> {
    let mut specs = match file {
        Some(path) => load_tasks(path)?,
        None => Vec::new(),
    };
    specs.extend(prompts.iter().map(TaskSpec::with_generated_id));

    if specs.is_empty() {
        if file.is_some() {
            bail!("Task file contains no tasks");
        }
        return Ok(demo_tasks());
    }

    check_tasks(&specs)?;
    Ok(specs)
}

/// Rejects blank prompts and duplicate ids.
fn check_tasks(specs: &[TaskSpec]) -> Result<()> {
    let mut seen = HashSet::with_capacity(specs.len());
    for spec in specs {
        if spec.id.trim().is_empty() {
            bail!("A task has an empty id");
        }
        if spec.prompt.trim().is_empty() {
            bail!("Task {} has an empty prompt", spec.id);
        }
        if !seen.insert(spec.id.as_str()) {
            bail!("Duplicate task id {}", spec.id);
        }
    }
    Ok(())
}
