//! fluxpreview - deploy, wait for, and tear down Flux preview environments

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fluxpreview_core::parse_age_threshold;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::Context;
use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "fluxpreview")]
#[command(version)]
#[command(about = "Deploy, wait for, and tear down Flux preview environments", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Configuration file (default: ./fluxpreview.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Namespace holding the Flux resources
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// GitHub token for status comments and protection lookups
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update Kustomizations and OCIRepositories from manifests
    Apply {
        /// Manifest file(s)
        #[arg(short = 'f', long = "filename", required = true)]
        files: Vec<PathBuf>,
    },

    /// Wait until Flux reports resources ready
    #[command(disable_version_flag = true)]
    Wait {
        /// Resource reference, e.g. ks/pr-42 or ocirepository/pr-42
        #[arg(conflicts_with = "all")]
        reference: Option<String>,

        /// Wait for every Kustomization and OCIRepository in the namespace
        #[arg(long)]
        all: bool,

        /// Also require this deployed version (OCI tag or revision)
        #[arg(long)]
        version: Option<String>,

        /// Give up after this long, e.g. 5m
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete the resources of one preview environment
    Teardown {
        /// Preview name (value of the preview label)
        preview: String,

        /// Block until the resources are gone
        #[arg(long)]
        wait: bool,

        /// Deletion deadline when waiting
        #[arg(long, value_parser = humantime::parse_duration, requires = "wait")]
        timeout: Option<Duration>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete stale preview environments of a repository
    Cleanup {
        /// owner/repo (default: GITHUB_REPOSITORY)
        #[arg(long)]
        repository: Option<String>,

        /// Only previews older than this, e.g. 7d or 12h
        #[arg(long, default_value = "7d", value_parser = parse_age_threshold)]
        older_than: Duration,

        /// Block until the resources are gone
        #[arg(long)]
        wait: bool,

        /// Deletion deadline when waiting
        #[arg(long, value_parser = humantime::parse_duration, requires = "wait")]
        timeout: Option<Duration>,

        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Publish the preview status comment on a pull request
    Status {
        /// Pull request number
        #[arg(long)]
        pr: u64,

        /// Workflow name; one live comment is kept per workflow
        #[arg(long)]
        workflow: String,

        /// Commit the status describes
        #[arg(long)]
        revision: String,

        /// Markdown file with the comment body
        #[arg(long)]
        body_file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify cluster access and GitHub configuration
    Check,
}

fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "fluxpreview=debug"
    } else {
        "fluxpreview=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let code = match tokio::runtime::Runtime::new() {
        Ok(runtime) => match runtime.block_on(run(cli)) {
            Ok(()) => exit_codes::SUCCESS,
            Err(err) => report(err),
        },
        Err(e) => report(CliError::internal(format!("failed to start runtime: {}", e))),
    };
    std::process::exit(code);
}

fn report(err: CliError) -> i32 {
    let code = err.exit_code();
    eprintln!("{:?}", miette::Report::new(err));
    code
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load(cli.config.as_deref(), cli.namespace, cli.github_token)?;

    match cli.command {
        Commands::Apply { files } => commands::apply::run(&ctx, &files).await,

        Commands::Wait {
            reference,
            all,
            version,
            timeout,
            json,
        } => {
            commands::wait::run(
                &ctx,
                reference.as_deref(),
                all,
                version.as_deref(),
                timeout,
                json,
            )
            .await
        }

        Commands::Teardown {
            preview,
            wait,
            timeout,
            json,
        } => commands::teardown::run(&ctx, &preview, wait, timeout, json).await,

        Commands::Cleanup {
            repository,
            older_than,
            wait,
            timeout,
            dry_run,
            json,
        } => {
            commands::cleanup::run(
                &ctx,
                repository.as_deref(),
                older_than,
                wait,
                timeout,
                dry_run,
                json,
            )
            .await
        }

        Commands::Status {
            pr,
            workflow,
            revision,
            body_file,
            json,
        } => commands::status::run(&ctx, pr, &workflow, &revision, &body_file, json).await,

        Commands::Check => commands::check::run(&ctx).await,
    }
}
