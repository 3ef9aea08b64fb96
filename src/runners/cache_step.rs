// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Cache step runner
//!
//! Runs the lock command, derives the key from the materialized manifest,
//! restores on a hit and queues a save on a miss.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::shell::ShellRunner;
use super::{JobEnvironment, PendingSave, StepOutcome, StepRunner};
use crate::cache::{Cache, CacheKey, MaterializedManifest};
use crate::errors::JobflowError;
use crate::pipeline::{Step, StepKind};

/// Runner for `cache:` steps
pub struct CacheStepRunner {
    cache: Option<Arc<dyn Cache>>,
}

impl CacheStepRunner {
    /// `None` disables restore and save; keys are still derived
    pub fn new(cache: Option<Arc<dyn Cache>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl StepRunner for CacheStepRunner {
    async fn run(&self, step: &Step, env: &mut JobEnvironment) -> Result<StepOutcome, JobflowError> {
        let StepKind::Cache { cache: spec } = &step.kind else {
            return Err(JobflowError::InvalidStep {
                job: env.job.clone(),
                step: step.display_name(),
                reason: "Expected a cache step".to_string(),
            });
        };

        let start = Instant::now();
        let dir = env.step_dir(step);

        // Phase one: materialize the manifest
        if let Some(ref lock) = spec.lock {
            let vars = env.step_env(step)?;
            let locked = ShellRunner::run_command(&spec.shell, lock, &dir, &vars).await?;
            if !locked.success {
                return Ok(StepOutcome::failure(
                    format!("Lock command failed: {}\n{}", lock, locked.stderr),
                    locked.exit_code,
                    start.elapsed(),
                ));
            }
        }
        let manifest = MaterializedManifest::locate(&spec.manifest, &dir)?;

        // Phase two: key, then restore
        let key = CacheKey::derive(&spec.key_prefix, &manifest)?;
        let paths: Vec<PathBuf> = spec.paths.iter().map(PathBuf::from).collect();

        let Some(ref cache) = self.cache else {
            return Ok(StepOutcome::success(String::new(), start.elapsed())
                .with_output("cache-hit", "false")
                .with_output("key", key.as_str()));
        };

        let restored = match cache.restore(&key, &dir).await {
            Ok(found) => found,
            Err(e) => {
                warn!(job = %env.job, key = %key, error = %e, "cache restore failed, treating as miss");
                None
            }
        };

        let outcome = match restored {
            Some(paths) => {
                info!(job = %env.job, key = %key, "cache hit");
                StepOutcome::success(
                    format!("Restored {} path(s) from {}", paths.len(), key),
                    start.elapsed(),
                )
                .with_cache_hit()
                .with_output("cache-hit", "true")
            }
            None => {
                info!(job = %env.job, key = %key, "cache miss");
                env.pending_saves.push(PendingSave {
                    key: key.clone(),
                    root: dir,
                    paths,
                });
                StepOutcome::success(format!("No cache entry for {}", key), start.elapsed())
                    .with_output("cache-hit", "false")
            }
        };

        Ok(outcome.with_output("key", key.as_str()))
    }

    fn validate_step(&self, job: &str, step: &Step) -> Result<(), JobflowError> {
        let StepKind::Cache { cache: spec } = &step.kind else {
            return Err(JobflowError::InvalidStep {
                job: job.to_string(),
                step: step.display_name(),
                reason: "Not a cache step".to_string(),
            });
        };

        let invalid = |reason: &str| JobflowError::InvalidStep {
            job: job.to_string(),
            step: step.display_name(),
            reason: reason.to_string(),
        };

        if spec.manifest.is_empty() {
            return Err(invalid("Cache manifest list is empty"));
        }
        if spec.paths.is_empty() {
            return Err(invalid("Cache paths list is empty"));
        }
        if spec.key_prefix.trim().is_empty() {
            return Err(invalid("Cache key prefix is empty"));
        }
        if spec.lock.is_some() && spec.shell.trim().is_empty() {
            return Err(invalid("Shell for the lock command is empty"));
        }

        Ok(())
    }

    fn check_available(&self, step: &Step) -> bool {
        match &step.kind {
            StepKind::Cache { cache: spec } if spec.lock.is_some() => {
                which::which(&spec.shell).is_ok()
            }
            _ => true,
        }
    }
}
