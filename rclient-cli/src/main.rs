//! rclient command-line tool.

#![allow(clippy::print_stdout)] // records are written to stdout

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use rclient::config::ClientConfig;
use rclient_cli::Cli;
use rclient_cli::commands::Runner;
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout carries only JSON records.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rclient={level},rclient_cli={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.global.config {
        Some(path) => ClientConfig::load(path).await?,
        None => ClientConfig::default(),
    };
    cli.global.apply(&mut config);
    config.validate()?;

    for record in Runner::new(config).run(cli.command).await? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
