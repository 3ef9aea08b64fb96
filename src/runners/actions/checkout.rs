// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Checkout action
//!
//! Copies the project into the job workspace. Submodules are initialised in
//! that copy, never in the project itself.

use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use super::{flag, param, Action, Params};
use crate::errors::JobflowError;
use crate::pipeline::DEFAULT_SHELL;
use crate::runners::{JobEnvironment, ShellRunner, StepOutcome};
use crate::utils::fs::copy_tree;

/// `checkout@v1`: copy the project source into the job workspace
pub struct Checkout;

#[async_trait]
impl Action for Checkout {
    fn name(&self) -> &'static str {
        "checkout"
    }

    async fn invoke(
        &self,
        params: &Params,
        env: &mut JobEnvironment,
        dir: &Path,
    ) -> Result<StepOutcome, JobflowError> {
        let start = Instant::now();
        let source = env.source_dir.clone();

        let mut exclude: Vec<String> = env.source_exclude.clone();
        if let Some(extra) = params.get("exclude") {
            exclude.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
            );
        }
        let exclude: Vec<&str> = exclude.iter().map(String::as_str).collect();

        let bytes = copy_tree(&source, dir, &exclude)?;
        info!(job = %env.job, bytes, "checked out source");

        if flag(params, "submodules") && dir.join(".git").exists() {
            let vars = env.base_env();
            let shell = param(params, "shell", DEFAULT_SHELL);
            let updated = ShellRunner::run_command(
                shell,
                "git submodule update --init --recursive",
                dir,
                &vars,
            )
            .await?;
            if !updated.success {
                return Ok(StepOutcome::failure(
                    format!("Submodule update failed:\n{}", updated.stderr),
                    updated.exit_code,
                    start.elapsed(),
                ));
            }
        }

        Ok(StepOutcome::success(
            format!("Checked out {} into {}", source.display(), dir.display()),
            start.elapsed(),
        ))
    }
}
