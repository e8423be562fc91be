//! queueserve CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for command handling.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first to get log_level
    let cli = queueserve::cli::parse_cli();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info".
    // Without RUST_LOG, report records are kept at info regardless.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| queueserve::cli::log_filter(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    queueserve::cli::run_with_cli(cli).await
}
