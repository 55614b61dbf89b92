//! # queuectl
//!
//! Command-line entry point for the queuectl background job queue.
//!
//! Every invocation loads configuration, initialises logging and then runs
//! one command against the job store. Worker commands stay in the
//! foreground until they are asked to stop.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use queuectl_config::{ConfigLoader, QueueConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(name = "queuectl")]
#[command(version, about = "Persistent background job queue", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "QUEUECTL_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Job database, overriding `database_path` from the configuration
    #[arg(long, global = true, env = "QUEUECTL_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a job described as JSON: {"id", "command", "max_retries"}
    Enqueue {
        /// Job description
        job: String,
    },
    /// Run workers
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
    /// Show job counts per state
    Status,
    /// List jobs
    List {
        /// Only show jobs in this state
        #[arg(long)]
        state: Option<String>,
    },
    /// Inspect and retry dead jobs
    Dlq {
        #[command(subcommand)]
        command: DlqCommands,
    },
    /// Read and change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Start a pool of worker processes in the foreground
    Start {
        /// Number of worker processes
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,
    },
    /// Run a single worker in this process
    #[command(hide = true)]
    Run {
        /// Position of this worker within its pool
        #[arg(long, default_value_t = 1)]
        index: u32,
        /// Stop when standard input closes
        #[arg(long)]
        supervised: bool,
    },
}

#[derive(Subcommand)]
enum DlqCommands {
    /// List dead jobs
    List,
    /// Move a dead job back to pending with a fresh attempt budget
    Retry {
        /// Job ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print one key, or the whole effective configuration
    Get {
        /// Configuration key
        key: Option<String>,
    },
    /// Persist a key to the configuration file
    Set {
        /// Configuration key
        key: String,
        /// New value
        value: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let loader = ConfigLoader::new(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    let config = loader.get().await;

    init_logging(&config);
    queuectl_jobs::register_metrics();

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.database_path));
    let ctx = Context::new(loader, cli.config, db_path);

    match cli.command {
        Commands::Enqueue { job } => commands::jobs::enqueue(&ctx, &job).await,
        Commands::Worker { command } => match command {
            WorkerCommands::Start { count } => commands::worker::start(&ctx, count).await,
            WorkerCommands::Run { index, supervised } => {
                commands::worker::run(&ctx, index, supervised).await
            }
        },
        Commands::Status => commands::jobs::status(&ctx).await,
        Commands::List { state } => commands::jobs::list(&ctx, state.as_deref()).await,
        Commands::Dlq { command } => match command {
            DlqCommands::List => commands::dlq::list(&ctx).await,
            DlqCommands::Retry { id } => commands::dlq::retry(&ctx, &id).await,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => commands::config::get(&ctx, key.as_deref()).await,
            ConfigCommands::Set { key, value } => commands::config::set(&ctx, &key, &value).await,
        },
    }
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(config: &QueueConfig) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs() {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
