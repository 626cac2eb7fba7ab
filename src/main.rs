//! cacher - build pipeline artifact cache
//!
//! CLI entry point that dispatches to subcommands.

use cacher::cli::{Cli, Commands};
use cacher::config::{Config, ConfigManager};
use cacher::error::CacherResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
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

async fn run() -> CacherResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);

    // Dispatch to command
    match cli.command {
        Commands::Store(args) => cacher::cli::commands::store(args, &config).await,
        Commands::Restore(args) => cacher::cli::commands::restore(args, &config).await,
        Commands::Key(args) => cacher::cli::commands::key(args).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; RUST_LOG wins when set
fn init_logging(verbose: u8, config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("cacher=warn"),
        1 => EnvFilter::new("cacher=info"),
        _ => EnvFilter::new("cacher=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
