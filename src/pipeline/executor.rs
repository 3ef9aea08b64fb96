// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Pipeline executor
//!
//! Schedules jobs in dependency order. A job is evaluated by the gate only
//! once every upstream job is terminal; runnable jobs are spawned onto a
//! `JoinSet` bounded by a semaphore, and each job runs its steps in order
//! inside its own workspace.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::expr::OutputMap;
use super::{
    Gate, GateDecision, Job, JobGraph, JobState, JobStatus, Pipeline, PipelineStatus,
    SkipReason, TriggerContext,
};
use crate::artifacts::ArtifactStore;
use crate::cache::Cache;
use crate::errors::JobflowError;
use crate::runners::{create_default_runners, CacheStepRunner, JobEnvironment, PendingSave, StepRunner};

type RunnerMap = HashMap<String, Arc<dyn StepRunner>>;

/// Pipeline execution options
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Skip cache restores and saves
    pub no_cache: bool,
    /// Only show what would be done
    pub dry_run: bool,
    /// Print step output
    pub verbose: bool,
    /// Upper bound on concurrently running jobs
    pub max_parallel: Option<usize>,
    /// Project checked out by `checkout` (defaults to the working directory)
    pub source_dir: Option<PathBuf>,
    /// Run directory name under the pipeline workdir
    pub run_id: Option<String>,
}

/// Result of one step
#[derive(Debug, Clone)]
pub struct StepReport {
    pub name: String,
    pub success: bool,
    pub exit_code: i32,
    pub duration: Duration,
    pub cache_hit: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Final state of one job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub status: JobStatus,
    pub steps: Vec<StepReport>,
    pub outputs: BTreeMap<String, String>,
    pub skip_reason: Option<SkipReason>,
    pub duration: Duration,
}

impl JobReport {
    fn new(status: JobStatus) -> Self {
        Self {
            status,
            steps: Vec::new(),
            outputs: BTreeMap::new(),
            skip_reason: None,
            duration: Duration::ZERO,
        }
    }
}

/// Result of executing a pipeline
#[derive(Debug)]
pub struct PipelineResult {
    /// Overall status
    pub status: PipelineStatus,
    /// Report for each job
    pub jobs: HashMap<String, JobReport>,
    /// Job outputs, keyed `<job>.<output>`
    pub outputs: BTreeMap<String, String>,
    /// Every status transition, in order
    pub events: Vec<(String, JobStatus)>,
    /// Run directory holding workspaces and artifacts
    pub run_dir: PathBuf,
    /// Total execution time
    pub duration: Duration,
}

impl PipelineResult {
    pub fn success(&self) -> bool {
        self.status == PipelineStatus::Succeeded
    }

    /// Status of `job`, if it is part of the pipeline
    pub fn job_status(&self, job: &str) -> Option<JobStatus> {
        self.jobs.get(job).map(|r| r.status)
    }
}

/// Requests cancellation of a running pipeline.
///
/// Running jobs stop before their next step; jobs that have not started
/// are marked cancelled. No step is interrupted.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// What a spawned job hands back to the scheduler
struct JobRun {
    name: String,
    status: JobStatus,
    steps: Vec<StepReport>,
    outputs: BTreeMap<String, String>,
    pending_saves: Vec<PendingSave>,
    duration: Duration,
}

/// Pipeline executor
pub struct PipelineExecutor {
    /// Registered runners by step kind
    runners: RunnerMap,
    /// Cache layer
    cache: Option<Arc<dyn Cache>>,
    cancel: CancelHandle,
}

impl PipelineExecutor {
    /// Create an executor with the default runners and no cache
    pub fn new() -> Self {
        Self {
            runners: create_default_runners(None),
            cache: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Set the cache layer
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.runners.insert(
            "cache".to_string(),
            Arc::new(CacheStepRunner::new(Some(cache.clone()))),
        );
        self.cache = Some(cache);
        self
    }

    /// Handle for cancelling runs of this executor
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Execute a pipeline for one trigger
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        trigger: &TriggerContext,
        working_dir: &Path,
        options: &ExecutionOptions,
    ) -> Result<PipelineResult, JobflowError> {
        let start = Instant::now();

        // Build and validate DAG
        let graph = JobGraph::build(pipeline)?;
        let order = graph.topological_order()?;

        self.print_execution_plan(pipeline, &graph, trigger)?;

        let run_dir = working_dir
            .join(&pipeline.workdir)
            .join(options.run_id.clone().unwrap_or_else(new_run_id));

        if options.dry_run {
            return Ok(PipelineResult {
                status: PipelineStatus::Succeeded,
                jobs: HashMap::new(),
                outputs: BTreeMap::new(),
                events: Vec::new(),
                run_dir,
                duration: start.elapsed(),
            });
        }

        info!(pipeline = %pipeline.name, run = %run_dir.display(), "starting run");

        let source_dir = options
            .source_dir
            .clone()
            .unwrap_or_else(|| working_dir.to_path_buf());
        let source_exclude = source_exclusions(pipeline);

        let trigger = Arc::new(trigger.clone());
        let artifacts = Arc::new(ArtifactStore::new(run_dir.join("artifacts"))?);
        let runners = Arc::new(self.runners_for(options));
        let cache = if options.no_cache { None } else { self.cache.clone() };

        let max_parallel = options.max_parallel.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));

        let mut states: HashMap<String, JobState> = pipeline
            .jobs
            .iter()
            .map(|j| (j.name.clone(), JobState::new(&j.name)))
            .collect();
        let mut reports: HashMap<String, JobReport> = HashMap::new();
        let mut job_outputs: HashMap<String, BTreeMap<String, String>> = HashMap::new();
        let mut events = Vec::new();

        let mut running: JoinSet<JobRun> = JoinSet::new();
        let mut saves: JoinSet<Result<(), JobflowError>> = JoinSet::new();

        loop {
            // Settle every job whose upstream is terminal, repeating while
            // skips make further jobs ready
            let mut progressed = true;
            while progressed {
                progressed = false;

                for &idx in &order {
                    let job = &pipeline.jobs[idx];
                    if states[&job.name].status() != JobStatus::Pending {
                        continue;
                    }

                    if self.cancel.is_cancelled() {
                        transition(&mut states, &mut events, &job.name, JobStatus::Cancelled)?;
                        println!("  {} {} cancelled", "⊘".yellow(), job.name.bold());
                        reports.insert(job.name.clone(), JobReport::new(JobStatus::Cancelled));
                        progressed = true;
                        continue;
                    }

                    let upstream: HashMap<String, JobStatus> = job
                        .needs
                        .iter()
                        .map(|n| (n.clone(), states[n].status()))
                        .collect();
                    if !upstream.values().all(|s| s.is_terminal()) {
                        continue;
                    }

                    match Gate::evaluate(job, &trigger, &upstream) {
                        GateDecision::Skip(reason) => {
                            progressed = true;
                            transition(&mut states, &mut events, &job.name, JobStatus::Skipped)?;
                            println!(
                                "  {} {} {}",
                                "○".dimmed(),
                                job.name.bold(),
                                format!("skipped ({})", reason).dimmed()
                            );
                            info!(job = %job.name, reason = %reason, "job skipped");

                            let mut report = JobReport::new(JobStatus::Skipped);
                            report.skip_reason = Some(reason);
                            reports.insert(job.name.clone(), report);
                        }
                        GateDecision::Run => {
                            // Stays pending until a slot frees up
                            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                                continue;
                            };
                            progressed = true;

                            transition(&mut states, &mut events, &job.name, JobStatus::Running)?;
                            println!("  {} {}", "▶".blue(), job.name.bold());
                            info!(job = %job.name, "job started");

                            let jobs_dir = run_dir.join("jobs").join(&job.name);
                            let env = JobEnvironment {
                                job: job.name.clone(),
                                workspace: jobs_dir.join("workspace"),
                                source_dir: source_dir.clone(),
                                source_exclude: source_exclude.clone(),
                                env: merged_env(pipeline, job),
                                permissions: job.permissions.iter().copied().collect(),
                                upstream: graph.upstream_closure(&job.name),
                                trigger: trigger.clone(),
                                artifacts: artifacts.clone(),
                                step_outputs: OutputMap::new(),
                                needs_outputs: needs_outputs(job, &job_outputs),
                                pending_saves: Vec::new(),
                                scratch: jobs_dir.join("scratch"),
                            };

                            running.spawn(run_job(
                                job.clone(),
                                env,
                                runners.clone(),
                                self.cancel.subscribe(),
                                permit,
                                options.verbose,
                            ));
                        }
                    }
                }
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let run = joined.map_err(|e| JobflowError::ExecutionFailed {
                message: format!("Job task panicked: {}", e),
                help: None,
            })?;

            let mut status = run.status;
            if status == JobStatus::Succeeded {
                if let Err(e) = artifacts.finalize_job(&run.name).await {
                    warn!(job = %run.name, error = %e, "artifact finalization failed");
                    status = JobStatus::Failed;
                }
            }
            if status != JobStatus::Succeeded {
                if let Err(e) = artifacts.discard_job(&run.name).await {
                    warn!(job = %run.name, error = %e, "discarding artifacts failed");
                }
            }

            transition(&mut states, &mut events, &run.name, status)?;
            print_job_result(&run.name, status, run.duration);
            info!(job = %run.name, status = %status, "job finished");

            if status == JobStatus::Succeeded {
                if let Some(ref cache) = cache {
                    for save in run.pending_saves {
                        let cache = cache.clone();
                        saves.spawn(async move {
                            cache.save(&save.key, &save.root, &save.paths).await
                        });
                    }
                }
                job_outputs.insert(run.name.clone(), run.outputs.clone());
            }

            reports.insert(
                run.name.clone(),
                JobReport {
                    status,
                    steps: run.steps,
                    outputs: run.outputs,
                    skip_reason: None,
                    duration: run.duration,
                },
            );
        }

        // Cache saves never block downstream jobs, only the end of the run
        while let Some(saved) = saves.join_next().await {
            match saved {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "cache save failed"),
                Err(e) => warn!(error = %e, "cache save task failed"),
            }
        }

        let status = PipelineStatus::from_jobs(states.values().map(JobState::status));
        let outputs = job_outputs
            .iter()
            .flat_map(|(job, outs)| {
                outs.iter()
                    .map(move |(k, v)| (format!("{}.{}", job, k), v.clone()))
            })
            .collect();

        let duration = start.elapsed();
        print_summary(status, duration);

        Ok(PipelineResult {
            status,
            jobs: reports,
            outputs,
            events,
            run_dir,
            duration,
        })
    }

    /// Runner set for one run; `no_cache` swaps in a cache step that never
    /// restores or saves
    fn runners_for(&self, options: &ExecutionOptions) -> RunnerMap {
        let mut runners = self.runners.clone();
        if options.no_cache {
            runners.insert("cache".to_string(), Arc::new(CacheStepRunner::new(None)));
        }
        runners
    }

    /// Print the execution plan
    fn print_execution_plan(
        &self,
        pipeline: &Pipeline,
        graph: &JobGraph,
        trigger: &TriggerContext,
    ) -> Result<(), JobflowError> {
        println!();
        println!("{}: {}", "Pipeline".bold(), pipeline.name);
        println!("{}", "═".repeat(50));
        println!(
            "Trigger: {} {}",
            trigger.event(),
            trigger.git_ref().dimmed()
        );
        println!(
            "Execution plan ({} job{}):",
            pipeline.jobs.len(),
            if pipeline.jobs.len() == 1 { "" } else { "s" }
        );
        println!();

        for line in graph.to_text(pipeline)?.lines() {
            println!("  {}", line);
        }

        println!();

        Ok(())
    }

    /// Steps whose tooling is not installed, as `job/step` labels
    pub fn check_tools(&self, pipeline: &Pipeline) -> Vec<String> {
        let mut missing = Vec::new();

        for job in &pipeline.jobs {
            for step in &job.steps {
                let available = self
                    .runners
                    .get(step.kind_name())
                    .is_some_and(|r| r.check_available(step));
                if !available {
                    missing.push(format!("{}/{}", job.name, step.display_name()));
                }
            }
        }

        missing
    }
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one job's steps in order, stopping at the first failure
async fn run_job(
    job: Job,
    mut env: JobEnvironment,
    runners: Arc<RunnerMap>,
    cancel: watch::Receiver<bool>,
    permit: OwnedSemaphorePermit,
    verbose: bool,
) -> JobRun {
    let _permit = permit;
    let start = Instant::now();

    let mut steps = Vec::new();
    let mut status = JobStatus::Succeeded;

    if let Err(e) = prepare_dirs(&env) {
        warn!(job = %job.name, error = %e, "workspace setup failed");
        return JobRun {
            name: job.name,
            status: JobStatus::Failed,
            steps,
            outputs: BTreeMap::new(),
            pending_saves: Vec::new(),
            duration: start.elapsed(),
        };
    }

    for step in &job.steps {
        if *cancel.borrow() {
            status = JobStatus::Cancelled;
            break;
        }

        let label = step.display_name();
        let Some(runner) = runners.get(step.kind_name()) else {
            eprintln!("    {} no runner for '{}' steps", "✗".red(), step.kind_name());
            status = JobStatus::Failed;
            break;
        };

        debug!(job = %job.name, step = %label, "step started");

        let report = match runner.run(step, &mut env).await {
            Ok(outcome) => {
                if let Some(ref id) = step.id {
                    env.step_outputs.insert(id.clone(), outcome.outputs.clone());
                }
                StepReport {
                    name: label.clone(),
                    success: outcome.success,
                    exit_code: outcome.exit_code,
                    duration: outcome.duration,
                    cache_hit: outcome.cache_hit,
                    stdout: outcome.stdout,
                    stderr: outcome.stderr,
                }
            }
            Err(e) => StepReport {
                name: label.clone(),
                success: false,
                exit_code: -1,
                duration: Duration::ZERO,
                cache_hit: false,
                stdout: String::new(),
                stderr: e.to_string(),
            },
        };

        print_step(&job.name, &report, verbose);
        let failed = !report.success;
        steps.push(report);

        if failed {
            warn!(job = %job.name, step = %label, "step failed");
            status = JobStatus::Failed;
            break;
        }
    }

    let mut outputs = BTreeMap::new();
    if status == JobStatus::Succeeded {
        for (key, expression) in &job.outputs {
            match env.expr().interpolate(expression) {
                Ok(value) => {
                    outputs.insert(key.clone(), value);
                }
                Err(e) => {
                    eprintln!("    {} output '{}': {}", "✗".red(), key, e);
                    status = JobStatus::Failed;
                }
            }
        }
    }

    JobRun {
        name: job.name,
        status,
        steps,
        outputs,
        pending_saves: std::mem::take(&mut env.pending_saves),
        duration: start.elapsed(),
    }
}

fn prepare_dirs(env: &JobEnvironment) -> Result<(), JobflowError> {
    for dir in [&env.workspace, &env.scratch] {
        std::fs::create_dir_all(dir).map_err(|e| JobflowError::write(dir, e))?;
    }
    Ok(())
}

fn transition(
    states: &mut HashMap<String, JobState>,
    events: &mut Vec<(String, JobStatus)>,
    job: &str,
    next: JobStatus,
) -> Result<(), JobflowError> {
    let state = states
        .get_mut(job)
        .ok_or_else(|| JobflowError::JobNotFound {
            job: job.to_string(),
        })?;
    state.transition(next)?;
    events.push((job.to_string(), next));
    Ok(())
}

/// Pipeline env overlaid with job env
fn merged_env(pipeline: &Pipeline, job: &Job) -> HashMap<String, String> {
    let mut env = pipeline.env.clone();
    env.extend(job.env.clone());
    env
}

fn needs_outputs(job: &Job, outputs: &HashMap<String, BTreeMap<String, String>>) -> OutputMap {
    job.needs
        .iter()
        .filter_map(|need| {
            outputs
                .get(need)
                .map(|o| (need.clone(), o.clone().into_iter().collect()))
        })
        .collect()
}

/// Top-level source entries that belong to jobflow itself
fn source_exclusions(pipeline: &Pipeline) -> Vec<String> {
    let mut exclude = vec![".jobflow".to_string()];
    for dir in [&pipeline.workdir, &pipeline.cache.directory] {
        if dir.is_relative() {
            if let Some(first) = dir.components().next() {
                let first = first.as_os_str().to_string_lossy().to_string();
                if !exclude.contains(&first) {
                    exclude.push(first);
                }
            }
        }
    }
    exclude
}

fn new_run_id() -> String {
    format!("run-{}", Uuid::new_v4().simple())
}

fn print_step(job: &str, report: &StepReport, verbose: bool) {
    let prefix = format!("{} /", job).dimmed();
    if report.success {
        let cached = if report.cache_hit { " (cache hit)" } else { "" };
        println!(
            "    {} {} {} ({:.2}s){}",
            "✓".green(),
            prefix,
            report.name,
            report.duration.as_secs_f64(),
            cached.dimmed()
        );
    } else {
        println!("    {} {} {} failed", "✗".red(), prefix, report.name.bold());
        if !report.stderr.is_empty() {
            eprintln!("{}", report.stderr.trim_end().dimmed());
        }
    }

    if verbose && !report.stdout.is_empty() {
        println!("{}", report.stdout.trim_end());
    }
}

fn print_job_result(job: &str, status: JobStatus, duration: Duration) {
    match status {
        JobStatus::Succeeded => println!(
            "  {} {} ({:.2}s)",
            "✓".green(),
            job.bold(),
            duration.as_secs_f64()
        ),
        JobStatus::Cancelled => println!("  {} {} cancelled", "⊘".yellow(), job.bold()),
        _ => println!("  {} {} {}", "✗".red(), job.bold(), status),
    }
}

fn print_summary(status: PipelineStatus, duration: Duration) {
    println!();
    let line = format!("Pipeline {} in {:.2}s", status, duration.as_secs_f64());
    match status {
        PipelineStatus::Succeeded => println!("{}", line.green()),
        PipelineStatus::Failed => println!("{}", line.red()),
        PipelineStatus::Cancelled => println!("{}", line.yellow()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    async fn run(yaml: &str, trigger: TriggerContext) -> (TempDir, PipelineResult) {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::from_yaml(yaml).unwrap();
        let result = PipelineExecutor::new()
            .execute(&pipeline, &trigger, temp.path(), &ExecutionOptions::default())
            .await
            .unwrap();
        (temp, result)
    }

    fn position(events: &[(String, JobStatus)], job: &str, status: JobStatus) -> usize {
        events
            .iter()
            .position(|(j, s)| j == job && *s == status)
            .unwrap_or_else(|| panic!("no {} event for {}", status, job))
    }

    const CHAIN: &str = r#"
name: chain
jobs:
  - name: build
    outputs:
      version: "${{ steps.meta.outputs.version }}"
    steps:
      - id: meta
        run: echo "version=1.2.3" >> "$JOBFLOW_OUTPUT"
  - name: test
    needs: [build]
    steps:
      - run: test "${{ needs.build.outputs.version }}" = "1.2.3"
  - name: deploy
    needs: [test]
    if:
      branch: main
    steps:
      - run: "true"
"#;

    #[tokio::test]
    async fn test_chain_runs_in_order_and_passes_outputs() {
        let (_temp, result) = run(CHAIN, TriggerContext::push("main")).await;

        assert!(result.success());
        assert_eq!(result.outputs["build.version"], "1.2.3");
        assert_eq!(result.job_status("deploy"), Some(JobStatus::Succeeded));

        let events = &result.events;
        assert!(
            position(events, "build", JobStatus::Succeeded)
                < position(events, "test", JobStatus::Running)
        );
        assert!(
            position(events, "test", JobStatus::Succeeded)
                < position(events, "deploy", JobStatus::Running)
        );
    }

    #[tokio::test]
    async fn test_guard_false_skips_without_failing() {
        let (_temp, result) = run(CHAIN, TriggerContext::push("feature/x")).await;

        assert_eq!(result.status, PipelineStatus::Succeeded);
        let deploy = &result.jobs["deploy"];
        assert_eq!(deploy.status, JobStatus::Skipped);
        assert_eq!(deploy.skip_reason, Some(SkipReason::GuardFalse));
    }

    #[tokio::test]
    async fn test_failure_skips_downstream_transitively() {
        let yaml = r#"
name: failing
jobs:
  - name: build
    steps:
      - run: exit 1
      - run: touch never-here
  - name: test
    needs: [build]
    steps: [{ run: "true" }]
  - name: deploy
    needs: [test]
    steps: [{ run: "true" }]
"#;
        let (_temp, result) = run(yaml, TriggerContext::push("main")).await;

        assert_eq!(result.status, PipelineStatus::Failed);
        assert_eq!(result.jobs["build"].steps.len(), 1);
        assert_eq!(result.job_status("test"), Some(JobStatus::Skipped));
        assert_eq!(
            result.jobs["deploy"].skip_reason,
            Some(SkipReason::UpstreamNotSucceeded {
                job: "test".into(),
                status: JobStatus::Skipped
            })
        );
    }

    #[tokio::test]
    async fn test_independent_jobs_share_nothing() {
        let yaml = r#"
name: fanout
jobs:
  - name: a
    steps:
      - run: echo a > marker
  - name: b
    steps:
      - run: test ! -e marker
"#;
        let (_temp, result) = run(yaml, TriggerContext::push("main")).await;
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::from_yaml(CHAIN).unwrap();
        let executor = PipelineExecutor::new();
        executor.cancel_handle().cancel();

        let result = executor
            .execute(
                &pipeline,
                &TriggerContext::push("main"),
                temp.path(),
                &ExecutionOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(result.status, PipelineStatus::Cancelled);
        assert!(result
            .jobs
            .values()
            .all(|r| r.status == JobStatus::Cancelled));
        assert!(result.events.iter().all(|(_, s)| *s == JobStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_running() {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::from_yaml(
            r#"
name: cycle
jobs:
  - name: a
    needs: [b]
    steps: [{ run: "touch ran" }]
  - name: b
    needs: [a]
    steps: [{ run: "touch ran" }]
"#,
        )
        .unwrap();

        let result = PipelineExecutor::new()
            .execute(
                &pipeline,
                &TriggerContext::push("main"),
                temp.path(),
                &ExecutionOptions::default(),
            )
            .await;

        assert!(matches!(result, Err(JobflowError::CircularDependency { .. })));
        assert!(!temp.path().join(".jobflow").exists());
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::from_yaml(CHAIN).unwrap();
        let options = ExecutionOptions {
            dry_run: true,
            ..Default::default()
        };

        let result = PipelineExecutor::new()
            .execute(&pipeline, &TriggerContext::push("main"), temp.path(), &options)
            .await
            .unwrap();

        assert!(result.jobs.is_empty());
        assert!(!result.run_dir.exists());
    }

    /// Highest number of jobs running at once, replayed from the event log
    fn max_concurrent(events: &[(String, JobStatus)]) -> usize {
        let mut running = 0usize;
        let mut peak = 0;
        for (_, status) in events {
            match status {
                JobStatus::Running => running += 1,
                JobStatus::Succeeded | JobStatus::Failed => running -= 1,
                JobStatus::Cancelled => running = running.saturating_sub(1),
                _ => {}
            }
            peak = peak.max(running);
        }
        peak
    }

    async fn run_with(
        pipeline: &Pipeline,
        executor: &PipelineExecutor,
        dir: &Path,
        max_parallel: Option<usize>,
    ) -> PipelineResult {
        let options = ExecutionOptions {
            max_parallel,
            ..Default::default()
        };
        let trigger = TriggerContext::push("main");
        let run = executor.execute(pipeline, &trigger, dir, &options);
        tokio::time::timeout(Duration::from_secs(30), run)
            .await
            .expect("pipeline did not finish")
            .unwrap()
    }

    #[tokio::test]
    async fn test_independent_jobs_run_concurrently() {
        let temp = TempDir::new().unwrap();
        let mut pipeline = Pipeline::from_yaml(
            r#"
name: rendezvous
jobs:
  - name: left
    steps:
      - run: |
          touch "$MEET/left"
          for i in $(seq 200); do [ -f "$MEET/right" ] && exit 0; sleep 0.05; done
          exit 1
  - name: right
    steps:
      - run: |
          touch "$MEET/right"
          for i in $(seq 200); do [ -f "$MEET/left" ] && exit 0; sleep 0.05; done
          exit 1
"#,
        )
        .unwrap();
        let meet = temp.path().join("meet");
        std::fs::create_dir_all(&meet).unwrap();
        pipeline
            .env
            .insert("MEET".into(), meet.to_string_lossy().to_string());

        let result = run_with(&pipeline, &PipelineExecutor::new(), temp.path(), Some(2)).await;

        assert!(result.success(), "{:?}", result.events);
        assert_eq!(max_concurrent(&result.events), 2);
    }

    #[tokio::test]
    async fn test_max_parallel_one_serializes_jobs() {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::from_yaml(
            r#"
name: serial
jobs:
  - name: a
    steps: [{ run: "sleep 0.1" }]
  - name: b
    steps: [{ run: "sleep 0.1" }]
  - name: c
    steps: [{ run: "sleep 0.1" }]
"#,
        )
        .unwrap();

        let result = run_with(&pipeline, &PipelineExecutor::new(), temp.path(), Some(1)).await;

        assert!(result.success());
        assert_eq!(max_concurrent(&result.events), 1);
        assert_eq!(
            result
                .events
                .iter()
                .filter(|(_, s)| *s == JobStatus::Running)
                .count(),
            3
        );
    }

    /// Cache whose saves wait for a marker written by a downstream job
    struct MarkerCache {
        marker: PathBuf,
        saw_marker: AtomicBool,
    }

    #[async_trait::async_trait]
    impl Cache for MarkerCache {
        async fn restore(
            &self,
            _key: &crate::cache::CacheKey,
            _dest: &Path,
        ) -> Result<Option<Vec<PathBuf>>, JobflowError> {
            Ok(None)
        }

        async fn save(
            &self,
            _key: &crate::cache::CacheKey,
            _root: &Path,
            _paths: &[PathBuf],
        ) -> Result<(), JobflowError> {
            for _ in 0..200 {
                if self.marker.exists() {
                    self.saw_marker.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(())
        }

        async fn entries(&self) -> Result<Vec<crate::cache::CachedEntry>, JobflowError> {
            Ok(Vec::new())
        }

        async fn clear(&self) -> Result<(), JobflowError> {
            Ok(())
        }

        async fn stats(&self) -> Result<crate::cache::CacheStats, JobflowError> {
            Ok(Default::default())
        }
    }

    #[tokio::test]
    async fn test_cache_save_does_not_delay_downstream() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("downstream-started");
        let mut pipeline = Pipeline::from_yaml(
            r#"
name: save
jobs:
  - name: build
    steps:
      - cache:
          manifest: [deps.lock]
          lock: echo pinned > deps.lock
          paths: [vendor]
  - name: test
    needs: [build]
    steps:
      - run: touch "$MARKER"
"#,
        )
        .unwrap();
        pipeline
            .env
            .insert("MARKER".into(), marker.to_string_lossy().to_string());

        let cache = Arc::new(MarkerCache {
            marker,
            saw_marker: AtomicBool::new(false),
        });
        let executor = PipelineExecutor::new().with_cache(cache.clone());

        let result = run_with(&pipeline, &executor, temp.path(), None).await;

        assert!(result.success());
        assert!(cache.saw_marker.load(Ordering::SeqCst));
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = new_run_id();
        let b = new_run_id();
        assert!(a.starts_with("run-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_source_exclusions() {
        let mut pipeline = Pipeline::from_yaml(CHAIN).unwrap();
        pipeline.workdir = PathBuf::from("build/runs");
        assert_eq!(source_exclusions(&pipeline), vec![".jobflow", "build"]);
    }
}
