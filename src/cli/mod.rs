//! Command-line interface for queueserve.
//!
//! Provides the `serve` and `client` commands.

mod commands;

pub use commands::{log_filter, parse_cli, run, run_with_cli, Cli, ClientArgs, Commands, ServeArgs};
