// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for jobflow.

pub mod cache;
pub mod graph;
pub mod init;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::utils::ColorChoice;

/// Local CI/CD pipeline runner
///
/// Run jobs with dependencies, guards, caches and artifacts.
#[derive(Parser, Debug)]
#[clap(
    name = "jobflow",
    version,
    about = "Local CI/CD pipeline runner with gated jobs, caches and artifacts",
    long_about = None,
    after_help = "Examples:\n\
        jobflow init                        Create a .jobflow.yaml\n\
        jobflow validate                    Check the pipeline\n\
        jobflow run                         Run for the current branch\n\
        jobflow run --event pull_request --base main --pr 7\n\
        jobflow graph --format mermaid      Show the job graph\n\n\
        See 'jobflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Colorize output (auto, always, never)
    #[clap(long, global = true, env = "JOBFLOW_COLOR", default_value = "auto")]
    pub color: ColorChoice,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a pipeline for a Rust crate's documentation
    Init {
        /// Crate name (defaults to current directory name)
        #[clap(long)]
        crate_name: Option<String>,

        /// Branch that deploys
        #[clap(long, default_value = "main")]
        trunk: String,

        /// Overwrite an existing pipeline file
        #[clap(short, long)]
        force: bool,
    },

    /// Run the pipeline for one trigger
    Run {
        /// Pipeline file
        #[clap(short, long, default_value = ".jobflow.yaml")]
        pipeline: PathBuf,

        #[clap(flatten)]
        trigger: TriggerArgs,

        /// Skip cache (force re-execution)
        #[clap(long)]
        no_cache: bool,

        /// Dry run (show what would be done)
        #[clap(long)]
        dry_run: bool,

        /// Maximum number of jobs running at once
        #[clap(short = 'j', long)]
        jobs: Option<usize>,
    },

    /// Validate pipeline configuration
    Validate {
        /// Pipeline file to validate
        #[clap(default_value = ".jobflow.yaml")]
        pipeline: PathBuf,
    },

    /// Cache management
    Cache {
        /// Pipeline file (for the cache directory)
        #[clap(short, long, default_value = ".jobflow.yaml")]
        pipeline: PathBuf,

        #[clap(subcommand)]
        action: CacheAction,
    },

    /// Show pipeline as a graph
    Graph {
        /// Pipeline file
        #[clap(default_value = ".jobflow.yaml")]
        pipeline: PathBuf,

        /// Output format
        #[clap(short, long, default_value = "text")]
        format: GraphFormat,
    },
}

/// Describes the event a run is for
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TriggerArgs {
    /// Event kind (push, pull_request)
    #[clap(long, env = "JOBFLOW_EVENT", default_value = "push")]
    pub event: String,

    /// Pushed branch (defaults to the current git branch)
    #[clap(long, env = "JOBFLOW_BRANCH")]
    pub branch: Option<String>,

    /// Pull request base branch
    #[clap(long, env = "JOBFLOW_BASE")]
    pub base: Option<String>,

    /// Pull request number
    #[clap(long, env = "JOBFLOW_PR")]
    pub pr: Option<u64>,

    /// Commit sha
    #[clap(long, env = "JOBFLOW_SHA")]
    pub sha: Option<String>,
}

/// Cache management actions
#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,

    /// Clear the cache
    Clear {
        /// Skip confirmation
        #[clap(short, long)]
        yes: bool,
    },

    /// List cached entries
    List,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}

/// Load a pipeline, keeping the error's diagnostic code and help
pub(crate) fn load_pipeline(path: &std::path::Path) -> miette::Result<crate::pipeline::Pipeline> {
    crate::pipeline::Pipeline::from_file(path).map_err(explain)
}

/// Print the recovery hint for an error, then hand it back for reporting
pub(crate) fn explain(err: crate::errors::JobflowError) -> miette::Report {
    if let Some(suggestion) = err.recovery() {
        use colored::Colorize;
        eprintln!("{}", suggestion.to_string().trim_end().yellow());
        eprintln!();
    }
    miette::Report::new(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "jobflow", "run", "--event", "pull_request", "--base", "main", "--pr", "7",
            "--color", "never",
        ])
        .unwrap();

        assert_eq!(cli.color, ColorChoice::Never);
        match cli.command {
            Commands::Run { trigger, .. } => {
                assert_eq!(trigger.event, "pull_request");
                assert_eq!(trigger.base.as_deref(), Some("main"));
                assert_eq!(trigger.pr, Some(7));
            }
            other => panic!("Expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_load_pipeline_keeps_diagnostic() {
        use miette::Diagnostic;

        let temp = tempfile::TempDir::new().unwrap();
        let missing = temp.path().join(".jobflow.yaml");

        let report = load_pipeline(&missing).unwrap_err();
        let err = report
            .downcast_ref::<crate::errors::JobflowError>()
            .expect("typed error");
        assert!(matches!(err, crate::errors::JobflowError::PipelineNotFound { .. }));
        assert_eq!(
            err.code().map(|c| c.to_string()).as_deref(),
            Some("jobflow::pipeline_not_found")
        );
        assert!(err.help().is_some());
    }
}
