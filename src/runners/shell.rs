// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Shell runner
//!
//! Executes `run:` steps. A step publishes outputs by appending `key=value`
//! lines to the file named by `$JOBFLOW_OUTPUT`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use super::{JobEnvironment, StepOutcome, StepRunner};
use crate::errors::JobflowError;
use crate::pipeline::{Step, StepKind};

static OUTPUT_FILES: AtomicU64 = AtomicU64::new(0);

/// Shell runner
pub struct ShellRunner;

impl ShellRunner {
    /// Create a new shell runner
    pub fn new() -> Self {
        Self
    }

    /// Run `command` with `shell -c` in `dir`
    pub async fn run_command(
        shell: &str,
        command: &str,
        dir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<StepOutcome, JobflowError> {
        let start = Instant::now();

        std::fs::create_dir_all(dir).map_err(|e| JobflowError::write(dir, e))?;

        let mut cmd = Command::new(shell);
        cmd.arg("-c").arg(command);
        cmd.current_dir(dir);
        cmd.envs(env);

        let output = cmd.output().await.map_err(|e| JobflowError::ToolExecutionFailed {
            tool: shell.to_string(),
            error: e.to_string(),
            help: Some(format!("Shell '{}' may not be available", shell)),
        })?;

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        debug!(shell, status = ?output.status.code(), "command finished");

        Ok(StepOutcome {
            success: output.status.success(),
            stdout,
            stderr,
            exit_code: output.status.code().unwrap_or(-1),
            outputs: HashMap::new(),
            duration,
            cache_hit: false,
        })
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `key=value` lines; blank lines and lines without `=` are ignored
fn parse_outputs(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .filter(|(k, _)| !k.trim().is_empty())
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl StepRunner for ShellRunner {
    async fn run(&self, step: &Step, env: &mut JobEnvironment) -> Result<StepOutcome, JobflowError> {
        let StepKind::Run { run, shell } = &step.kind else {
            return Err(JobflowError::InvalidStep {
                job: env.job.clone(),
                step: step.display_name(),
                reason: "Expected a run step".to_string(),
            });
        };

        let command = env.expr().interpolate(run)?;
        let mut vars = env.step_env(step)?;

        let output_file = env.scratch.join(format!(
            "output-{}.env",
            OUTPUT_FILES.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&output_file, "").map_err(|e| JobflowError::write(&output_file, e))?;
        vars.insert(
            "JOBFLOW_OUTPUT".into(),
            output_file.to_string_lossy().to_string(),
        );

        let mut outcome = Self::run_command(shell, &command, &env.step_dir(step), &vars).await?;

        if outcome.success {
            let written = std::fs::read_to_string(&output_file)
                .map_err(|e| JobflowError::read(&output_file, e))?;
            outcome.outputs = parse_outputs(&written);
        }

        Ok(outcome)
    }

    fn validate_step(&self, job: &str, step: &Step) -> Result<(), JobflowError> {
        let StepKind::Run { run, shell } = &step.kind else {
            return Err(JobflowError::InvalidStep {
                job: job.to_string(),
                step: step.display_name(),
                reason: "Not a run step".to_string(),
            });
        };

        if run.trim().is_empty() {
            return Err(JobflowError::InvalidStep {
                job: job.to_string(),
                step: step.display_name(),
                reason: "Shell command is empty".to_string(),
            });
        }

        if shell.trim().is_empty() {
            return Err(JobflowError::InvalidStep {
                job: job.to_string(),
                step: step.display_name(),
                reason: "Shell is empty".to_string(),
            });
        }

        Ok(())
    }

    fn check_available(&self, step: &Step) -> bool {
        match &step.kind {
            StepKind::Run { shell, .. } => which::which(shell).is_ok(),
            _ => true,
        }
    }
}
