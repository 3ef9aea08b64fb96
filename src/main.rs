// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! jobflow - local CI/CD pipeline runner
//!
//! Run gated jobs with dependency caches and artifact hand-off.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    jobflow::utils::configure(cli.color);

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Init {
            crate_name,
            trunk,
            force,
        } => jobflow::cli::init::run(crate_name, trunk, force, cli.verbose).await,
        Commands::Run {
            pipeline,
            trigger,
            no_cache,
            dry_run,
            jobs,
        } => {
            jobflow::cli::run::run(pipeline, trigger, no_cache, dry_run, jobs, cli.verbose).await
        }
        Commands::Validate { pipeline } => {
            jobflow::cli::validate::run(pipeline, cli.verbose).await
        }
        Commands::Cache { pipeline, action } => {
            jobflow::cli::cache::run(pipeline, action, cli.verbose).await
        }
        Commands::Graph { pipeline, format } => {
            jobflow::cli::graph::run(pipeline, format, cli.verbose).await
        }
    }
}
