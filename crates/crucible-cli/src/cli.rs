use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Command-line arguments for the `crucible` binary
#[derive(Debug, Parser)]
#[command(name = "crucible", version)]
#[command(about = "Refine LLM answers with a worker/evaluator loop", long_about = None)]
pub struct Cli {
    /// Options shared by every command
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Options accepted before or after any subcommand
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Configuration file (default: ~/.crucible/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Maximum worker attempts per task (overrides config)
    #[arg(long, global = true)]
    pub max_iterations: Option<u32>,

    /// Maximum concurrent model calls (overrides config)
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub concurrency: Option<i64>,
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run tasks through the refinement loop
    Run {
        /// Task file: TOML with `[[tasks]]` tables, or a JSON array (by extension)
        #[arg(short, long)]
        tasks: Option<PathBuf>,

        /// Add a task with a generated id (repeatable)
        #[arg(short, long = "prompt")]
        prompts: Vec<String>,

        /// Print the full reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send one prompt straight to a model
    Ask {
        /// Prompt to send
        prompt: String,

        /// Model to use (default: the worker model)
        #[arg(short, long)]
        model: Option<String>,

        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Show the effective configuration
    Config,
}
