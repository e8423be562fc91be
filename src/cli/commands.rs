//! CLI command definitions for queueserve.
//!
//! Two subcommands: `serve` runs the scheduling server, `client` drives it
//! with generated load.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::client::{self, LoadProfile};
use crate::config::ServerConfig;
use crate::metrics::init_metrics;
use crate::scheduler::SchedulingPolicy;
use crate::server::{Server, REPORT_TARGET};

/// Default host the client connects to.
const DEFAULT_CLIENT_HOST: &str = "127.0.0.1";

/// Bounded job queue server with FIFO and SJN scheduling.
#[derive(Parser)]
#[command(name = "queueserve")]
#[command(about = "Serve a bounded job queue drained by a worker pool, or generate load against one")]
#[command(version)]
#[command(
    long_about = "queueserve accepts timed jobs over TCP, queues them in a fixed-capacity queue ordered FIFO or shortest-job-next, and drains them with a pool of busy-waiting workers.\n\nExample usage:\n  queueserve serve -q 16 -w 2 -p SJN 2222\n  queueserve client -a 20 -s 0.05 -n 500 2222"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the scheduling server.
    #[command(alias = "server")]
    Serve(ServeArgs),

    /// Send generated load to a running server.
    Client(ClientArgs),
}

/// Arguments for `queueserve serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on.
    pub port: Option<u16>,

    /// Queue capacity per connection.
    #[arg(short = 'q', long)]
    pub capacity: Option<usize>,

    /// Worker threads per connection.
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Scheduling policy (FIFO or SJN).
    #[arg(short = 'p', long)]
    pub policy: Option<SchedulingPolicy>,

    /// Address to bind.
    #[arg(long)]
    pub bind: Option<String>,

    /// YAML configuration file.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Exit after the first connection closes.
    #[arg(long)]
    pub once: bool,

    /// Do not log the queue contents after each completion or rejection.
    #[arg(long)]
    pub no_dump: bool,

    /// Log the Prometheus metrics export after each session.
    #[arg(long)]
    pub print_metrics: bool,
}

/// Arguments for `queueserve client`.
#[derive(Parser, Debug)]
pub struct ClientArgs {
    /// Server port.
    pub port: u16,

    /// Server host.
    #[arg(long, default_value = DEFAULT_CLIENT_HOST)]
    pub host: String,

    /// Mean arrival rate in requests per second.
    #[arg(short = 'a', long, default_value = "10")]
    pub arrival_rate: f64,

    /// Mean requested service time in seconds.
    #[arg(short = 's', long, default_value = "0.05")]
    pub service_time: f64,

    /// Number of requests to send.
    #[arg(short = 'n', long, default_value = "100")]
    pub count: u64,

    /// RNG seed for a reproducible workload.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Builds the `EnvFilter` directive used when `RUST_LOG` is unset.
///
/// Report records stay visible at info even when `--log-level` is
/// quieter.
pub fn log_filter(log_level: &str) -> String {
    format!("{},{}=info", log_level, REPORT_TARGET)
}

/// Parse command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve_command(args).await,
        Commands::Client(args) => run_client_command(args).await,
    }
}

// ============================================================================
// serve
// ============================================================================

/// Layers defaults, the YAML file, environment variables, and flags.
fn build_server_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let base = match &args.config {
        Some(path) => ServerConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => ServerConfig::default(),
    };
    let config = base
        .with_env()
        .context("Invalid QUEUESERVE_* environment variable")?;

    let config = apply_serve_args(config, args);
    config.validate()?;
    Ok(config)
}

fn apply_serve_args(mut config: ServerConfig, args: &ServeArgs) -> ServerConfig {
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(capacity) = args.capacity {
        config.capacity = capacity;
    }
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.clone();
    }
    if args.once {
        config.once = true;
    }
    if args.no_dump {
        config.dump_queue = false;
    }
    config
}

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    let config = build_server_config(&args)?;
    init_metrics().context("Failed to initialize metrics")?;

    info!(
        addr = %config.listen_addr(),
        capacity = config.capacity,
        workers = config.worker_count,
        policy = %config.policy,
        "Starting server"
    );

    let server = Server::bind(config)
        .await
        .context("Failed to start server")?
        .with_metrics_dump(args.print_metrics);
    server.run().await?;
    Ok(())
}

// ============================================================================
// client
// ============================================================================

async fn run_client_command(args: ClientArgs) -> anyhow::Result<()> {
    let profile = LoadProfile {
        arrival_rate: args.arrival_rate,
        mean_service: args.service_time,
        count: args.count,
        seed: args.seed,
    };
    let addr = format!("{}:{}", args.host, args.port);

    let report = client::run(&addr, &profile)
        .await
        .with_context(|| format!("Load run against {} failed", addr))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
