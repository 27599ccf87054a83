//! Crucible CLI - worker/evaluator refinement of LLM answers
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        reason = "Allow for tests"
    )
)]

use anyhow::Result;
use clap::Parser as _;
use tracing::debug;

use crucible_cli::cli::{Cli, Commands};
use crucible_cli::handlers;

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be read before the config looks up the credential
    let dotenv_result = dotenv::dotenv();
    let cli = Cli::parse();

    handlers::init_logging(cli.global.log_file.as_deref())?;
    match dotenv_result {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(error) => debug!("No .env file loaded: {error}"),
    }

    let (config, config_path) = handlers::load_config(&cli.global)?;

    match cli.command {
        Commands::Run {
            tasks,
            prompts,
            json,
        } => handlers::handle_run(&config, tasks.as_deref(), &prompts, json).await,
        Commands::Ask {
            prompt,
            model,
            stream,
        } => handlers::handle_ask(&config, prompt, model, stream).await,
        Commands::Config => handlers::handle_config(&config, &config_path),
    }
}
