// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Error types with actionable messages
//!
//! Every failure surfaced by jobflow carries a diagnostic code and, where
//! possible, a hint that points at the fix rather than the symptom.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::JobStatus;

/// Result type for jobflow operations
pub type JobflowResult<T> = Result<T, JobflowError>;

/// Main error type for jobflow
#[derive(Error, Debug, Diagnostic)]
pub enum JobflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Step / Action Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Unknown action '{action}'")]
    #[diagnostic(
        code(jobflow::unknown_action),
        help("Built-in actions: checkout, upload-artifact, download-artifact, write-redirect, deploy-pages")
    )]
    UnknownAction { action: String },

    #[error("Action '{action}' does not support version '{version}'")]
    #[diagnostic(code(jobflow::unsupported_action_version), help("Pin one of: {supported}"))]
    UnsupportedActionVersion {
        action: String,
        version: String,
        supported: String,
    },

    #[error("Action '{action}' is missing required parameter '{param}'")]
    #[diagnostic(code(jobflow::missing_parameter))]
    MissingParameter { action: String, param: String },

    #[error("Tool '{tool}' execution failed: {error}")]
    #[diagnostic(code(jobflow::tool_execution_failed))]
    ToolExecutionFailed {
        tool: String,
        error: String,
        #[help]
        help: Option<String>,
    },

    #[error("Job '{job}' lacks permission '{permission}'")]
    #[diagnostic(
        code(jobflow::permission_denied),
        help("Add '{permission}' to the job's permissions list")
    )]
    PermissionDenied { job: String, permission: String },

    #[error("Invalid expression '{expression}': {reason}")]
    #[diagnostic(
        code(jobflow::invalid_expression),
        help("Supported roots: trigger, env, steps.<id>.outputs, needs.<job>.outputs")
    )]
    InvalidExpression { expression: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(jobflow::pipeline_not_found),
        help("Create a pipeline with 'jobflow init' or write .jobflow.yaml manually")
    )]
    PipelineNotFound { path: PathBuf },

    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(jobflow::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Step '{step}' in job '{job}' is invalid: {reason}")]
    #[diagnostic(code(jobflow::invalid_step))]
    InvalidStep {
        job: String,
        step: String,
        reason: String,
    },

    #[error("Circular dependency detected: {}", jobs.join(" → "))]
    #[diagnostic(
        code(jobflow::circular_dependency),
        help("Review the 'needs' lists of these jobs to remove the cycle")
    )]
    CircularDependency { jobs: Vec<String> },

    #[error("Job '{job}' needs unknown job '{dependency}'")]
    #[diagnostic(
        code(jobflow::unknown_dependency),
        help("Check that '{dependency}' is defined in your pipeline")
    )]
    UnknownDependency { job: String, dependency: String },

    #[error("Job '{job}' not found in pipeline")]
    #[diagnostic(code(jobflow::job_not_found))]
    JobNotFound { job: String },

    #[error("Job '{job}' cannot move from {from} to {to}")]
    #[diagnostic(code(jobflow::invalid_transition))]
    InvalidTransition {
        job: String,
        from: JobStatus,
        to: JobStatus,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Execution failed: {message}")]
    #[diagnostic(code(jobflow::execution_failed))]
    ExecutionFailed {
        message: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Artifact Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Artifact '{name}' from job '{producer}' is not yet available")]
    #[diagnostic(
        code(jobflow::artifact_not_available),
        help("Artifacts become visible once their producing job has succeeded")
    )]
    ArtifactNotAvailable { producer: String, name: String },

    #[error("Artifact '{name}' not found")]
    #[diagnostic(
        code(jobflow::artifact_not_found),
        help("Only artifacts uploaded by jobs listed (directly or transitively) in 'needs' are visible")
    )]
    ArtifactNotFound { name: String },

    #[error("Artifact '{name}' was already published by job '{producer}'")]
    #[diagnostic(code(jobflow::artifact_exists), help("Artifacts are immutable; pick a new name"))]
    ArtifactExists { producer: String, name: String },

    // ─────────────────────────────────────────────────────────────────────────
    // File Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("File not found: {path}")]
    #[diagnostic(code(jobflow::file_not_found))]
    FileNotFound {
        path: PathBuf,
        #[help]
        help: Option<String>,
    },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(jobflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(jobflow::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Cache Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Cache manifest not found: {pattern}")]
    #[diagnostic(
        code(jobflow::manifest_missing),
        help("Set 'lock' on the cache step to a command that generates the manifest")
    )]
    ManifestMissing { pattern: String },

    #[error("Cache error: {message}")]
    #[diagnostic(code(jobflow::cache_error))]
    CacheError { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(jobflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(jobflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(jobflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(jobflow::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(jobflow::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for JobflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for JobflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for JobflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for JobflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for JobflowError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl JobflowError {
    /// Wrap an IO failure while reading `path`
    pub fn read(path: &std::path::Path, e: impl std::fmt::Display) -> Self {
        Self::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        }
    }

    /// Wrap an IO failure while writing `path`
    pub fn write(path: &std::path::Path, e: impl std::fmt::Display) -> Self {
        Self::FileWriteError {
            path: path.to_path_buf(),
            error: e.to_string(),
        }
    }

    /// Create a cache error from any displayable cause
    pub fn cache(message: impl Into<String>) -> Self {
        Self::CacheError {
            message: message.into(),
        }
    }

    /// Recovery hint for this error, when one exists
    pub fn recovery(&self) -> Option<RecoverySuggestion> {
        match self {
            Self::CircularDependency { jobs } => {
                Some(RecoverySuggestion::fix_circular_dependency(jobs))
            }
            Self::UnknownAction { action } => Some(RecoverySuggestion::unknown_action(action)),
            Self::PermissionDenied { job, permission } => {
                Some(RecoverySuggestion::grant_permission(job, permission))
            }
            Self::ManifestMissing { pattern } => {
                Some(RecoverySuggestion::materialize_manifest(pattern))
            }
            _ => None,
        }
    }
}
