//! Apply command - create or update preview resources from manifests

use std::path::PathBuf;

use console::style;
use fluxpreview_kube::parse_manifests;

use super::Context;
use crate::error::{CliError, Result};

/// Run the apply command
pub async fn run(ctx: &Context, files: &[PathBuf]) -> Result<()> {
    let mut resources = Vec::new();
    for file in files {
        let content = std::fs::read_to_string(file).map_err(|e| CliError::Io {
            message: format!("{}: {}", file.display(), e),
        })?;
        resources.extend(parse_manifests(&content, &ctx.config.namespace)?);
    }
    if resources.is_empty() {
        return Err(CliError::input("no Kustomization or OCIRepository documents found"));
    }

    let manager = ctx.lifecycle().await?;
    for resource in manager.apply_all(&resources).await? {
        println!(
            "{} Applied {} in namespace {}",
            style("✓").green().bold(),
            style(resource.key()).cyan(),
            style(resource.namespace().unwrap_or(ctx.config.namespace.as_str())).yellow()
        );
    }
    Ok(())
}
