mod cli;
mod commands;
mod error;

use crate::cli::Cli;
use clap::Parser;
use songbook_config::Config;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` first, then the configured level, raised by `-v`.
fn build_env_filter(level: &str, verbose: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directive = match verbose {
        0 => level.to_string(),
        1 => format!("{level},songbook=debug,songbook_library=debug,songbook_cache=debug"),
        _ => "trace".to_string(),
    };
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:?}");
            return ExitCode::FAILURE;
        },
    };
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(&config.log.level, cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    match commands::run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:?}");
            ExitCode::FAILURE
        },
    }
}
