//! Library interface for crucible-cli
//!
//! Exposes argument parsing, task loading and the command handlers so the
//! binary stays thin and the pieces can be tested directly.

/// Command-line argument definitions
pub mod cli;
/// Handlers behind each subcommand
pub mod handlers;
/// Task files, inline prompts and the demo batch
pub mod tasks;
