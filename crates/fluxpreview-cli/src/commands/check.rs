//! Check command - verify cluster permissions before a deploy

use console::style;

use super::Context;
use crate::error::Result;

/// Run the check command
pub async fn run(ctx: &Context) -> Result<()> {
    let manager = ctx.lifecycle().await?;
    manager.check_access().await?;

    println!(
        "{} Can list Kustomizations and OCIRepositories in namespace {}",
        style("✓").green().bold(),
        style(&ctx.config.namespace).yellow()
    );

    match ctx.github() {
        Ok(client) => println!(
            "{} GitHub token configured for {}/{}",
            style("✓").green().bold(),
            client.owner(),
            client.repo()
        ),
        Err(e) => println!(
            "{} GitHub integration disabled: {}",
            style("⚠").yellow(),
            e
        ),
    }
    Ok(())
}
