use std::path::{Path, PathBuf};

use clap::Parser;
use graphite_cleaner::{
    config::{CleanerConfig, LogLevel},
    observability,
    retention::{RetentionCycle, RunMode, run_retention_worker},
};
use tokio_util::sync::CancellationToken;

/// CLI arguments for the graphite-clickhouse cleaner
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Removes stale series from graphite-clickhouse tables",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "graphite-cleaner.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the cleaner (default)
    Run(RunArgs),
    /// Load and validate the config file, then exit
    CheckConfig,
    /// Print the default configuration as TOML
    DefaultConfig,
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Run a single cycle and exit non-zero if it fails
    #[arg(long)]
    one_shot: bool,

    /// Override the configured dry-run flag
    #[arg(long)]
    dry_run: Option<bool>,

    /// Override the configured log level
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::CheckConfig) => run_check_config(&args.config),
        Some(Command::DefaultConfig) => run_default_config(),
        Some(Command::Run(run_args)) => run_cleaner(&args.config, run_args).await,
        None => run_cleaner(&args.config, RunArgs::default()).await,
    }
}

fn load_config(path: &Path) -> CleanerConfig {
    match CleanerConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

/// Validate the config file and print a summary
fn run_check_config(path: &Path) {
    let config = load_config(path);
    let retention = &config.retention;
    let store = &config.store;

    println!("Config file {} is valid", path.display());
    println!("  max_age_plain:  {}", retention.max_age_plain);
    println!("  max_age_tagged: {}", retention.max_age_tagged);
    println!("  loop_interval:  {}", retention.loop_interval);
    println!("  dry_run:        {}", retention.dry_run);
    println!(
        "  tables:         {}, {}, {}",
        store.value_table, store.index_table, store.tagged_table
    );
    println!(
        "  cluster:        {}",
        store.cluster_name().unwrap_or("(none)")
    );
}

/// Print the default configuration
fn run_default_config() {
    match CleanerConfig::default_toml() {
        Ok(toml) => print!("{toml}"),
        Err(e) => {
            eprintln!("Failed to render default config: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run the retention worker
async fn run_cleaner(config_path: &Path, run_args: RunArgs) {
    let mut config = load_config(config_path);
    if let Some(dry_run) = run_args.dry_run {
        config.retention.dry_run = dry_run;
    }
    if let Some(level) = run_args.log_level {
        config.observability.logging.level = level;
    }

    // Keep the guard alive for the lifetime of the process
    let _tracing_guard = match observability::init_tracing(&config.observability.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    let cycle = match RetentionCycle::from_config(&config) {
        Ok(cycle) => cycle,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create store connector");
            std::process::exit(1);
        }
    };

    let mode = if run_args.one_shot {
        RunMode::OneShot
    } else {
        RunMode::Continuous {
            interval: config.retention.interval(),
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    // The failed cycle has already been logged
    if run_retention_worker(&cycle, mode, shutdown).await.is_err() {
        std::process::exit(1);
    }
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing current cycle...");
    shutdown.cancel();
}
