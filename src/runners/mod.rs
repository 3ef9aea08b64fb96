// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Step runners
//!
//! This module provides the runner trait, the per-job environment steps
//! execute in, and the built-in runners for `run`, `uses` and `cache` steps.

pub mod actions;
mod cache_step;
mod shell;

pub use actions::{Action, ActionRegistry, ActionRunner};
pub use cache_step::CacheStepRunner;
pub use shell::ShellRunner;

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::artifacts::ArtifactStore;
use crate::cache::{Cache, CacheKey};
use crate::errors::JobflowError;
use crate::pipeline::expr::{ExprContext, OutputMap};
use crate::pipeline::{Permission, Step, TriggerContext};

/// Result of running one step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Whether the step succeeded
    pub success: bool,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code
    pub exit_code: i32,

    /// Named outputs for `steps.<id>.outputs.*`
    pub outputs: HashMap<String, String>,

    /// Execution duration
    pub duration: Duration,

    /// Cache hit or miss (cache steps only)
    pub cache_hit: bool,
}

impl StepOutcome {
    /// Create a successful outcome
    pub fn success(stdout: String, duration: Duration) -> Self {
        Self {
            success: true,
            stdout,
            stderr: String::new(),
            exit_code: 0,
            outputs: HashMap::new(),
            duration,
            cache_hit: false,
        }
    }

    /// Create a failed outcome
    pub fn failure(stderr: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr,
            exit_code,
            outputs: HashMap::new(),
            duration,
            cache_hit: false,
        }
    }

    /// Attach a named output
    pub fn with_output(mut self, key: &str, value: impl Into<String>) -> Self {
        self.outputs.insert(key.to_string(), value.into());
        self
    }

    /// Mark this outcome as a cache hit
    pub fn with_cache_hit(mut self) -> Self {
        self.cache_hit = true;
        self
    }
}

/// A cache save queued by a cache step, performed after the job succeeds
#[derive(Debug, Clone)]
pub struct PendingSave {
    pub key: CacheKey,
    pub root: PathBuf,
    pub paths: Vec<PathBuf>,
}

/// State shared by the steps of one job, and by nothing else
pub struct JobEnvironment {
    /// Job name
    pub job: String,
    /// Private workspace directory
    pub workspace: PathBuf,
    /// Project source checked out by `checkout`
    pub source_dir: PathBuf,
    /// Top-level names `checkout` never copies
    pub source_exclude: Vec<String>,
    /// Pipeline env merged with job env
    pub env: HashMap<String, String>,
    /// Capabilities granted to this job
    pub permissions: BTreeSet<Permission>,
    /// Every job this one depends on, directly or transitively
    pub upstream: BTreeSet<String>,
    /// Trigger context of the run
    pub trigger: Arc<TriggerContext>,
    /// Artifact channel of the run
    pub artifacts: Arc<ArtifactStore>,
    /// Outputs of completed steps, by step id
    pub step_outputs: OutputMap,
    /// Outputs of direct upstream jobs
    pub needs_outputs: OutputMap,
    /// Cache saves to perform once the job succeeds
    pub pending_saves: Vec<PendingSave>,
    /// Scratch directory for step output files
    pub scratch: PathBuf,
}

impl JobEnvironment {
    /// Expression context over this job's state
    pub fn expr(&self) -> ExprContext<'_> {
        ExprContext {
            trigger: &self.trigger,
            env: &self.env,
            steps: &self.step_outputs,
            needs: &self.needs_outputs,
        }
    }

    /// Directory a step runs in
    pub fn step_dir(&self, step: &Step) -> PathBuf {
        match step.working_directory {
            Some(ref dir) => self.workspace.join(dir),
            None => self.workspace.clone(),
        }
    }

    /// Job environment plus run metadata
    pub fn base_env(&self) -> HashMap<String, String> {
        let mut vars = self.env.clone();
        vars.extend(self.trigger.env_vars());
        vars.insert("JOBFLOW_JOB".into(), self.job.clone());
        vars.insert(
            "JOBFLOW_WORKSPACE".into(),
            self.workspace.to_string_lossy().to_string(),
        );
        vars
    }

    /// Full environment for a step: pipeline < job < step, plus run metadata
    pub fn step_env(&self, step: &Step) -> Result<HashMap<String, String>, JobflowError> {
        let mut vars = self.base_env();

        for (k, v) in &step.env {
            vars.insert(k.clone(), self.expr().interpolate(v)?);
        }

        Ok(vars)
    }

    /// Fail unless this job was granted `permission`
    pub fn require(&self, permission: Permission) -> Result<(), JobflowError> {
        if self.permissions.contains(&permission) {
            Ok(())
        } else {
            Err(JobflowError::PermissionDenied {
                job: self.job.clone(),
                permission: permission.to_string(),
            })
        }
    }

    /// Resolve `path` against `base` unless it is absolute
    pub fn resolve(base: &Path, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            base.join(p)
        }
    }
}

/// Trait for step runners
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run a step in the job environment.
    ///
    /// A non-zero exit is reported as an unsuccessful outcome; `Err` means
    /// the step could not run at all. Both fail the job.
    async fn run(&self, step: &Step, env: &mut JobEnvironment) -> Result<StepOutcome, JobflowError>;

    /// Validate step configuration
    fn validate_step(&self, job: &str, step: &Step) -> Result<(), JobflowError>;

    /// Check that whatever the step needs is installed
    fn check_available(&self, _step: &Step) -> bool {
        true
    }
}

/// Create the standard runner set, keyed by step kind
pub fn create_default_runners(
    cache: Option<Arc<dyn Cache>>,
) -> HashMap<String, Arc<dyn StepRunner>> {
    let mut runners: HashMap<String, Arc<dyn StepRunner>> = HashMap::new();

    runners.insert("run".to_string(), Arc::new(ShellRunner::new()));
    runners.insert(
        "uses".to_string(),
        Arc::new(ActionRunner::new(Arc::new(ActionRegistry::builtin()))),
    );
    runners.insert("cache".to_string(), Arc::new(CacheStepRunner::new(cache)));

    runners
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for building job environments in tests

    use super::*;
    use tempfile::TempDir;

    pub struct TestJob {
        pub temp: TempDir,
        pub env: JobEnvironment,
    }

    pub fn job_env(job: &str) -> TestJob {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("workspace");
        let source = temp.path().join("source");
        let scratch = temp.path().join("scratch");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&scratch).unwrap();

        let artifacts = ArtifactStore::new(temp.path().join("artifacts")).unwrap();

        let env = JobEnvironment {
            job: job.to_string(),
            workspace,
            source_dir: source,
            source_exclude: vec![".jobflow".into()],
            env: HashMap::new(),
            permissions: BTreeSet::new(),
            upstream: BTreeSet::new(),
            trigger: Arc::new(TriggerContext::push("main")),
            artifacts: Arc::new(artifacts),
            step_outputs: OutputMap::new(),
            needs_outputs: OutputMap::new(),
            pending_saves: vec![],
            scratch,
        };

        TestJob { temp, env }
    }

    pub fn step(yaml: &str) -> Step {
        serde_yaml::from_str(yaml).unwrap()
    }
}
