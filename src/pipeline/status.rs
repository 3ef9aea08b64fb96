// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Job lifecycle state machine

use serde::Serialize;

use crate::errors::JobflowError;

/// Runtime status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl JobStatus {
    /// No transitions leave a terminal state
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Skipped)
                | (Pending, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A job's current status, guarded against illegal transitions
#[derive(Debug, Clone)]
pub struct JobState {
    job: String,
    status: JobStatus,
}

impl JobState {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            status: JobStatus::Pending,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Move to `next`, rejecting anything the lifecycle forbids
    pub fn transition(&mut self, next: JobStatus) -> Result<JobStatus, JobflowError> {
        if !self.status.can_transition_to(next) {
            return Err(JobflowError::InvalidTransition {
                job: self.job.clone(),
                from: self.status,
                to: next,
            });
        }
        let previous = self.status;
        self.status = next;
        Ok(previous)
    }
}

/// Overall outcome of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    /// Failed if any job failed; skips never fail a run
    pub fn from_jobs<I: IntoIterator<Item = JobStatus>>(statuses: I) -> Self {
        let mut cancelled = false;
        for status in statuses {
            match status {
                JobStatus::Failed => return Self::Failed,
                JobStatus::Cancelled => cancelled = true,
                _ => {}
            }
        }
        if cancelled {
            Self::Cancelled
        } else {
            Self::Succeeded
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
