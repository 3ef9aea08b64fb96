// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Run command - execute the pipeline

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{explain, load_pipeline, TriggerArgs};
use crate::cache::FilesystemCache;
use crate::pipeline::{
    EventKind, ExecutionOptions, PipelineExecutor, PipelineStatus, PipelineValidator,
    TriggerContext,
};

/// Run the pipeline
pub async fn run(
    pipeline_path: PathBuf,
    trigger: TriggerArgs,
    no_cache: bool,
    dry_run: bool,
    max_parallel: Option<usize>,
    verbose: bool,
) -> Result<()> {
    let pipeline = load_pipeline(&pipeline_path)?;

    // Validate pipeline
    let validation = PipelineValidator::validate(&pipeline)?;

    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Pipeline configuration is invalid"));
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let trigger = trigger_context(&trigger)?;

    if !pipeline.is_triggered_by(&trigger) {
        println!(
            "{}",
            format!(
                "Pipeline '{}' is not triggered by {} on {}",
                pipeline.name,
                trigger.event(),
                trigger.git_ref()
            )
            .dimmed()
        );
        return Ok(());
    }

    let working_dir = std::env::current_dir()
        .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;

    let mut executor = PipelineExecutor::new();

    // Check required tools are available
    let missing_tools = executor.check_tools(&pipeline);
    if !missing_tools.is_empty() {
        eprintln!("{}", "Missing required tools:".red().bold());
        for tool in &missing_tools {
            eprintln!("  {} {}", "✗".red(), tool);
        }
        return Err(miette::miette!("Required tools are not installed"));
    }

    // Set up cache
    if !no_cache && pipeline.cache.enabled {
        let cache = FilesystemCache::new(working_dir.join(&pipeline.cache.directory))?;
        executor = executor.with_cache(Arc::new(cache));
    }

    // Ctrl-C stops the run at the next step boundary
    let cancel = executor.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("{}", "Cancelling after the current steps...".yellow());
            cancel.cancel();
        }
    });

    let options = ExecutionOptions {
        no_cache,
        dry_run,
        verbose,
        max_parallel,
        source_dir: Some(working_dir.clone()),
        run_id: None,
    };

    let result = executor
        .execute(&pipeline, &trigger, &working_dir, &options)
        .await
        .map_err(explain)?;

    if !result.outputs.is_empty() {
        println!();
        println!("{}:", "Outputs".bold());
        for (key, value) in &result.outputs {
            println!("  {} = {}", key, value.cyan());
        }
    }

    match result.status {
        PipelineStatus::Succeeded => Ok(()),
        PipelineStatus::Cancelled => Err(miette::miette!("Pipeline was cancelled")),
        PipelineStatus::Failed => {
            let mut failed: Vec<_> = result
                .jobs
                .iter()
                .filter(|(_, r)| r.status == crate::pipeline::JobStatus::Failed)
                .collect();
            failed.sort_by_key(|(name, _)| name.as_str());

            for (name, report) in failed {
                if let Some(step) = report.steps.iter().find(|s| !s.success) {
                    eprintln!();
                    eprintln!(
                        "{}",
                        format!("Job '{}' failed at step '{}':", name, step.name).red().bold()
                    );
                    if !step.stderr.is_empty() {
                        eprintln!("{}", step.stderr.trim_end().dimmed());
                    }
                }
            }
            Err(miette::miette!("Pipeline execution failed"))
        }
    }
}

/// Build the trigger context from flags, env fallbacks and git
pub fn trigger_context(args: &TriggerArgs) -> Result<TriggerContext> {
    let event: EventKind = args
        .event
        .parse()
        .map_err(|e: String| miette::miette!("{}", e))?;

    let trigger = match event {
        EventKind::Push => {
            let branch = match args.branch {
                Some(ref b) => b.clone(),
                None => current_branch().ok_or_else(|| {
                    miette::miette!("Cannot determine the branch; pass --branch or set JOBFLOW_BRANCH")
                })?,
            };
            TriggerContext::push(&branch)
        }
        EventKind::PullRequest => {
            let base = args.base.as_deref().ok_or_else(|| {
                miette::miette!("Pull request runs need --base (or JOBFLOW_BASE)")
            })?;
            TriggerContext::pull_request(args.pr.unwrap_or(0), base)
        }
    };

    let sha = args.sha.clone().or_else(current_sha);
    Ok(match sha {
        Some(sha) => trigger.with_sha(sha),
        None => trigger,
    })
}

fn git(args: &[&str]) -> Option<String> {
    let output = std::process::Command::new("git").args(args).output();
    match output {
        Ok(out) if out.status.success() => {
            let value = String::from_utf8_lossy(&out.stdout).trim().to_string();
            (!value.is_empty()).then_some(value)
        }
        Ok(out) => {
            debug!(status = ?out.status.code(), "git {} failed", args.join(" "));
            None
        }
        Err(e) => {
            warn!(error = %e, "git is not available");
            None
        }
    }
}

fn current_branch() -> Option<String> {
    git(&["rev-parse", "--abbrev-ref", "HEAD"]).filter(|b| b != "HEAD")
}

fn current_sha() -> Option<String> {
    git(&["rev-parse", "HEAD"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_from_flags() {
        let args = TriggerArgs {
            event: "push".into(),
            branch: Some("main".into()),
            sha: Some("abc123".into()),
            ..Default::default()
        };

        let trigger = trigger_context(&args).unwrap();
        assert_eq!(trigger.git_ref(), "refs/heads/main");
        assert_eq!(trigger.sha(), Some("abc123"));
    }

    #[test]
    fn test_pull_request_needs_base() {
        let args = TriggerArgs {
            event: "pull_request".into(),
            pr: Some(7),
            ..Default::default()
        };
        assert!(trigger_context(&args).is_err());

        let args = TriggerArgs {
            base: Some("main".into()),
            ..args
        };
        let trigger = trigger_context(&args).unwrap();
        assert_eq!(trigger.event(), EventKind::PullRequest);
        assert_eq!(trigger.base_branch(), Some("main"));
        assert_eq!(trigger.branch(), None);
    }

    #[test]
    fn test_unknown_event() {
        let args = TriggerArgs {
            event: "tag".into(),
            branch: Some("main".into()),
            ..Default::default()
        };
        assert!(trigger_context(&args).is_err());
    }
}
