//! `xrun generate ...`: print matcher arguments for a tool's releases.

use std::time::Duration;

use anyhow::{Context, Result};
use xrun_core::generate::{Endpoints, Generator};

use crate::GenerateCommands;

pub async fn generate(command: &GenerateCommands, timeout: Duration) -> Result<()> {
    let generator = Generator::new(timeout, Endpoints::default())?;

    let generated = match command {
        GenerateCommands::Github {
            owner,
            project,
            tool,
            release,
        } => {
            let project = project.as_deref().unwrap_or(owner);
            let tool = tool.as_deref().unwrap_or(project);
            generator
                .generate_github(owner, project, tool, release.as_deref(), &[])
                .await
                .with_context(|| format!("generate for {owner}/{project}"))?
        }
        GenerateCommands::Pypi {
            project,
            tool,
            release,
        } => {
            let tool = tool.as_deref().unwrap_or(project);
            generator
                .generate_pypi(project, tool, release.as_deref())
                .await
                .with_context(|| format!("generate for PyPI project {project}"))?
        }
        GenerateCommands::Terraform { release } => generator
            .generate_terraform(release.as_deref())
            .await
            .context("generate for terraform")?,
        GenerateCommands::Black { release } => generator
            .generate_black(release.as_deref())
            .await
            .context("generate for black")?,
    };

    print!("{generated}");
    Ok(())
}
