// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Pipeline validation
//!
//! Validates pipeline configuration before execution.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use super::expr::referenced_steps;
use super::{Job, JobGraph, Pipeline, StepKind};
use crate::errors::JobflowError;
use crate::runners::{ActionRegistry, ActionRunner, CacheStepRunner, ShellRunner, StepRunner};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline against the built-in actions
    pub fn validate(pipeline: &Pipeline) -> Result<ValidationResult, JobflowError> {
        Self::validate_with(pipeline, Arc::new(ActionRegistry::builtin()))
    }

    /// Validate a pipeline against a specific action registry
    pub fn validate_with(
        pipeline: &Pipeline,
        registry: Arc<ActionRegistry>,
    ) -> Result<ValidationResult, JobflowError> {
        let mut result = ValidationResult::new();

        if pipeline.jobs.is_empty() {
            result.add_error("Pipeline has no jobs defined");
        }

        let mut seen_names = HashSet::new();
        for job in &pipeline.jobs {
            if !seen_names.insert(&job.name) {
                result.add_error(&format!("Duplicate job name: '{}'", job.name));
            }
        }

        // Cycles and unknown needs; the graph also feeds the artifact check
        let graph = match JobGraph::build(pipeline) {
            Ok(graph) => Some(graph),
            Err(JobflowError::CircularDependency { jobs }) => {
                result.add_error(&format!("Circular dependency: {}", jobs.join(" → ")));
                None
            }
            Err(JobflowError::UnknownDependency { job, dependency }) => {
                result.add_error(&format!(
                    "Job '{}' needs unknown job '{}'",
                    job, dependency
                ));
                None
            }
            Err(JobflowError::InvalidPipeline { .. }) => None,
            Err(e) => {
                result.add_error(&format!("DAG validation error: {}", e));
                None
            }
        };

        let actions = ActionRunner::new(registry.clone());
        for job in &pipeline.jobs {
            Self::validate_job(job, &actions, &registry, &mut result);
        }

        if let Some(ref graph) = graph {
            Self::validate_downloads(pipeline, graph, &mut result);
        }

        Ok(result)
    }

    /// Validate a single job and its steps
    fn validate_job(
        job: &Job,
        actions: &ActionRunner,
        registry: &ActionRegistry,
        result: &mut ValidationResult,
    ) {
        if job.steps.is_empty() {
            result.add_warning(&format!("Job '{}' has no steps", job.name));
        }

        if job.runs_on != "local" {
            result.add_warning(&format!(
                "Job '{}': runner '{}' is not available, the job runs locally",
                job.name, job.runs_on
            ));
        }

        let mut seen_ids = HashSet::new();
        for step in &job.steps {
            if let Some(ref id) = step.id {
                if !seen_ids.insert(id.as_str()) {
                    result.add_error(&format!("Job '{}': duplicate step id '{}'", job.name, id));
                }
            }

            let checked = match &step.kind {
                StepKind::Run { .. } => ShellRunner::new().validate_step(&job.name, step),
                StepKind::Cache { cache } => {
                    if cache.lock.is_none() {
                        result.add_warning(&format!(
                            "Job '{}': cache step '{}' has no lock command, the manifest must already exist",
                            job.name,
                            step.display_name()
                        ));
                    }
                    CacheStepRunner::new(None).validate_step(&job.name, step)
                }
                StepKind::Uses { uses, .. } => {
                    if let Ok(action) = registry.resolve(uses) {
                        for permission in action.required_permissions() {
                            if !job.has_permission(*permission) {
                                result.add_error(&format!(
                                    "Job '{}': action '{}' requires permission '{}'",
                                    job.name, uses, permission
                                ));
                            }
                        }
                    }
                    actions.validate_step(&job.name, step)
                }
            };

            if let Err(e) = checked {
                result.add_error(&format!("Job '{}': {}", job.name, e));
            }
        }

        let known: HashSet<&str> = job.step_ids().into_iter().collect();
        for (key, expression) in &job.outputs {
            for id in referenced_steps(expression) {
                if !known.contains(id.as_str()) {
                    result.add_warning(&format!(
                        "Job '{}': output '{}' references unknown step '{}'",
                        job.name, key, id
                    ));
                }
            }
        }
    }

    /// Every downloaded artifact must be uploaded by a transitive upstream job
    fn validate_downloads(pipeline: &Pipeline, graph: &JobGraph, result: &mut ValidationResult) {
        for job in &pipeline.jobs {
            let upstream = graph.upstream_closure(&job.name);

            for name in artifact_names(job, "download-artifact") {
                let uploaded = pipeline
                    .jobs
                    .iter()
                    .filter(|j| upstream.contains(&j.name))
                    .any(|j| artifact_names(j, "upload-artifact").contains(&name));

                if !uploaded {
                    result.add_error(&format!(
                        "Job '{}': downloads artifact '{}' that no upstream job uploads",
                        job.name, name
                    ));
                }
            }
        }
    }
}

/// Literal `with.name` values of `action` steps; expressions are not checked
fn artifact_names(job: &Job, action: &str) -> BTreeSet<String> {
    job.steps
        .iter()
        .filter_map(|step| match &step.kind {
            StepKind::Uses { uses, params } if uses.name == action => params.get("name"),
            _ => None,
        })
        .filter(|name| !name.contains("${{"))
        .cloned()
        .collect()
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
