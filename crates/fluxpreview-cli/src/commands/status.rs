//! Status command - publish the pull request status comment

use std::path::Path;

use console::style;
use fluxpreview_github::{GitHubStatusApi, PublishAction, StatusArtifactManager};

use super::Context;
use crate::error::{CliError, Result};

/// Run the status command
pub async fn run(
    ctx: &Context,
    pr: u64,
    workflow: &str,
    revision: &str,
    body_file: &Path,
    json: bool,
) -> Result<()> {
    let client = ctx.github()?;
    let body = std::fs::read_to_string(body_file).map_err(|e| CliError::Io {
        message: format!("{}: {}", body_file.display(), e),
    })?;

    let manager = StatusArtifactManager::new(GitHubStatusApi::new(client));
    let published = manager.publish(pr, workflow, revision, &body).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&published)?);
        return Ok(());
    }

    let verb = match published.action {
        PublishAction::Created => "Created",
        PublishAction::Updated => "Updated",
    };
    println!(
        "{} {} status comment {}",
        style("✓").green().bold(),
        verb,
        style(&published.url).cyan()
    );
    if published.minimized > 0 {
        println!("  Minimized {} outdated comment(s)", published.minimized);
    }
    Ok(())
}
