//! xrun - fetch, verify, cache and run

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use xrun_cli::cmd;
use xrun_cli::{Cli, Commands};
use xrun_core::Verbosity;
use xrun_core::pipeline::EXIT_FAILURE;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // RUST_LOG wins over XRUN_VERBOSE
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Verbosity::from_env().filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Generate { command }) => {
            match cmd::generate::generate(command, cli.http_timeout).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("{e:#}");
                    ExitCode::from(EXIT_FAILURE)
                }
            }
        }
        None => cmd::run::run(&cli).await,
    }
}
