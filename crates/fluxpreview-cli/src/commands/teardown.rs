//! Teardown command - delete one preview environment

use std::time::Duration;

use console::style;
use fluxpreview_kube::TeardownOptions;

use super::Context;
use crate::display;
use crate::error::Result;

/// Run the teardown command
pub async fn run(
    ctx: &Context,
    preview: &str,
    wait: bool,
    timeout: Option<Duration>,
    json: bool,
) -> Result<()> {
    if !json {
        println!(
            "{} Tearing down preview {} in namespace {}",
            style("→").blue().bold(),
            style(preview).cyan(),
            style(&ctx.config.namespace).yellow()
        );
    }

    let mut options = TeardownOptions::new();
    if wait {
        options = options.with_wait(timeout.unwrap_or(ctx.config.delete_timeout));
    }

    let manager = ctx.lifecycle().await?;
    let outcome = manager.teardown_preview(preview, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        display::print_outcome(&outcome);
    }
    Ok(())
}
