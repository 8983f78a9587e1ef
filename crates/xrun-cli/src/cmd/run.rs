//! Default command: resolve, fetch if needed, and become the executable.

use std::process::ExitCode;

use tracing::error;
use xrun_core::io::exec::SystemLauncher;
use xrun_core::pipeline::{Outcome, RunConfig, RunError};
use xrun_schema::matcher::{parse_archive_path_matcher, parse_url_matcher};

use crate::Cli;

/// Immutable run configuration from parsed arguments and the environment.
pub fn config(cli: &Cli) -> Result<RunConfig, RunError> {
    let urls = cli
        .urls
        .iter()
        .map(|arg| parse_url_matcher(arg))
        .collect::<Result<Vec<_>, _>>()?;
    let archive_paths = cli
        .archive_exe_paths
        .iter()
        .map(|arg| parse_archive_path_matcher(arg))
        .collect::<Result<Vec<_>, _>>()?;

    let mut config = RunConfig::from_env(urls, archive_paths)?;
    config.http_timeout = cli.http_timeout;
    config.dry_run = cli.dry_run;
    Ok(config)
}

/// Only returns on failure or after a dry run.
pub async fn run(cli: &Cli) -> ExitCode {
    let result = match config(cli) {
        Ok(config) => xrun_core::run(&config, &cli.args, &SystemLauncher).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(Outcome::DryRun { .. }) => ExitCode::SUCCESS,
        Ok(Outcome::Launched { program }) => {
            panic!("BUG: exec {} returned without error", program.display())
        }
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
