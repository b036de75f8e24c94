use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mcrunner::config::{Config, DEFAULT_CONFIG_PATH};
use mcrunner::daemon::{lifecycle, McRunnerDaemon};

#[derive(Parser)]
#[command(name = "mcrunnerd")]
#[command(version)]
#[command(about = "Minecraft server monitoring and control daemon", long_about = None)]
struct Cli {
    /// Path to the mcrunner configuration file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Run,
    /// Start the daemon in the background
    Start,
    /// Stop a running daemon
    Stop,
    /// Restart the daemon
    Restart,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Commands::Run => run(config).await,
        Commands::Start => lifecycle::spawn_daemon(&config, &cli.config).await,
        Commands::Stop => lifecycle::stop_daemon(&config).await,
        Commands::Restart => restart(&config, &cli.config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn restart(config: &Config, config_path: &std::path::Path) -> Result<()> {
    lifecycle::stop_daemon(config).await?;
    lifecycle::spawn_daemon(config, config_path).await
}

async fn run(config: Config) -> Result<()> {
    init_logging(&config)?;

    if let Some(user) = config.mcrunnerd.user.clone() {
        lifecycle::drop_privileges(&user)?;
    }

    McRunnerDaemon::new(config).run().await
}

/// Leveled logging to the configured file; `RUST_LOG` overrides the
/// default `info` filter.
fn init_logging(config: &Config) -> Result<()> {
    let log_path = &config.mcrunnerd.logfile;
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("could not open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}
