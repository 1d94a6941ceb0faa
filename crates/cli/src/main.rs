//! geofinds CLI entry point

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod args;
mod commands;
mod config;

use args::{Cli, Commands};
use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Flag, then config file, then the default
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| configured_log_level(cli.config.as_deref()))
        .unwrap_or_else(|| "info".to_string());
    init_logging(&log_level, cli.log_json)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.config).await,
        Commands::Config(args) => commands::config::execute(args, cli.config).await,
        Commands::Doctor(args) => commands::doctor::execute(args, cli.config).await,
    }
}

/// Load errors are reported by the command itself
fn configured_log_level(config_path: Option<&Path>) -> Option<String> {
    AppConfig::load(config_path)
        .ok()
        .map(|config| config.general.log_level)
        .filter(|level| !level.trim().is_empty())
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}
