//! Wait command - block until Flux reports resources ready

use std::time::Duration;

use fluxpreview_core::{KUSTOMIZATION, OCI_REPOSITORY, resolve};
use fluxpreview_kube::{KubeError, ReadinessQuery, ReadinessResult};

use super::Context;
use crate::display;
use crate::error::{CliError, Result};

/// Run the wait command
pub async fn run(
    ctx: &Context,
    reference: Option<&str>,
    all: bool,
    version: Option<&str>,
    timeout: Option<Duration>,
    json: bool,
) -> Result<()> {
    let timeout = timeout.unwrap_or(ctx.config.ready_timeout);

    let outcome = match (reference, all) {
        (Some(reference), false) => {
            let mut query = ReadinessQuery::new(&ctx.config.namespace, resolve(reference)?, timeout);
            if let Some(version) = version {
                query = query.with_version(version);
            }
            let watcher = ctx.watcher().await?;
            watcher.wait_until_ready(&query).await.map(|r| vec![r])
        }
        (None, true) => {
            if version.is_some() {
                return Err(CliError::input("--version applies to a single resource"));
            }
            let watcher = ctx.watcher().await?;
            watcher
                .wait_until_all_ready(&ctx.config.namespace, &[KUSTOMIZATION, OCI_REPOSITORY], timeout)
                .await
        }
        _ => {
            return Err(CliError::input_with_help(
                "nothing to wait for",
                "pass a <type>/<name> reference such as ks/pr-42, or --all",
            ));
        }
    };

    match outcome {
        Ok(results) => report(&results, json),
        Err(KubeError::Timeout {
            what,
            elapsed,
            detail,
            pending,
        }) => {
            report(&pending, json)?;
            Err(KubeError::Timeout {
                what,
                elapsed,
                detail,
                pending,
            }
            .into())
        }
        Err(e) => Err(e.into()),
    }
}

fn report(results: &[ReadinessResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
    } else {
        display::print_readiness(results);
    }
    Ok(())
}
