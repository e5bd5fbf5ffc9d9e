//! Harvest - quota-aware GitHub organisation harvester
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use harvest::cli::{commands, Cli, Commands};
use harvest::config::ConfigManager;
use harvest::error::HarvestResult;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> HarvestResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::at_default_path(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("harvest=warn"),
        1 => EnvFilter::new("harvest=info"),
        _ => EnvFilter::new("harvest=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
    debug!("Loaded config from {}", config_manager.path().display());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing current request");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Members(args) => commands::members(args, &config, &cancel).await,
        Commands::Sync(args) => commands::sync(args, &config, &cancel).await,
        Commands::Lookup(args) => commands::lookup(args, &config).await,
        Commands::Config(args) => commands::config(args, &config, &config_manager).await,
    }
}
