//! Cleanup command - delete stale previews of a repository

use std::time::Duration;

use console::style;
use fluxpreview_kube::CleanupOptions;

use super::Context;
use crate::display;
use crate::error::{CliError, Result};

/// Run the cleanup command
pub async fn run(
    ctx: &Context,
    repository: Option<&str>,
    older_than: Duration,
    wait: bool,
    timeout: Option<Duration>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let repository = repository
        .or(ctx.config.github.repository.as_deref())
        .ok_or_else(|| {
            CliError::input_with_help(
                "no repository to clean up",
                "pass --repository owner/repo or set GITHUB_REPOSITORY",
            )
        })?;

    let mut options = CleanupOptions::new(repository).older_than(older_than);
    if wait {
        options = options.with_wait(timeout.unwrap_or(ctx.config.delete_timeout));
    }
    if dry_run {
        options = options.dry_run();
    }

    if !json {
        println!(
            "{} Cleaning up previews of {} older than {}{}",
            style("→").blue().bold(),
            style(repository).cyan(),
            humantime::format_duration(older_than),
            if dry_run { " (dry run)" } else { "" }
        );
    }

    let manager = ctx.lifecycle().await?.with_protection(ctx.protection());
    let outcome = manager.cleanup(&options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        display::print_outcome(&outcome);
    }
    Ok(())
}
