// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Dependency gate
//!
//! Decides whether a job runs once all of its upstream jobs are terminal.
//! A job runs iff every upstream job succeeded and its guard holds against
//! the trigger context. Anything else is a skip, never a failure.

use std::collections::HashMap;

use super::status::JobStatus;
use super::trigger::TriggerContext;
use super::{Condition, Job};

impl Condition {
    /// Evaluate against the trigger context alone
    pub fn evaluate(&self, trigger: &TriggerContext) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Branch(name) => trigger.branch() == Some(name.trim_start_matches("refs/heads/")),
            Self::Event(kind) => trigger.event() == *kind,
            Self::All(conds) => conds.iter().all(|c| c.evaluate(trigger)),
            Self::Any(conds) => conds.iter().any(|c| c.evaluate(trigger)),
            Self::Not(cond) => !cond.evaluate(trigger),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |conds: &[Condition], sep: &str| {
            conds
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(sep)
        };

        match self {
            Self::Always => write!(f, "always"),
            Self::Never => write!(f, "never"),
            Self::Branch(name) => write!(f, "branch == {}", name),
            Self::Event(kind) => write!(f, "event == {}", kind),
            Self::All(conds) => write!(f, "({})", join(conds, " && ")),
            Self::Any(conds) => write!(f, "({})", join(conds, " || ")),
            Self::Not(cond) => write!(f, "!{}", cond),
        }
    }
}

/// Why a job did not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// An upstream job ended in something other than success
    UpstreamNotSucceeded { job: String, status: JobStatus },
    /// The guard evaluated false
    GuardFalse,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpstreamNotSucceeded { job, status } => {
                write!(f, "upstream '{}' {}", job, status)
            }
            Self::GuardFalse => write!(f, "condition not met"),
        }
    }
}

/// Gate verdict for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Run,
    Skip(SkipReason),
}

impl GateDecision {
    pub fn is_run(&self) -> bool {
        matches!(self, Self::Run)
    }
}

/// Dependency gate
pub struct Gate;

impl Gate {
    /// Evaluate the gate for `job`.
    ///
    /// `upstream` must hold a terminal status for every job in `job.needs`;
    /// a missing or non-terminal entry blocks the job.
    pub fn evaluate(
        job: &Job,
        trigger: &TriggerContext,
        upstream: &HashMap<String, JobStatus>,
    ) -> GateDecision {
        for need in &job.needs {
            let status = upstream.get(need).copied().unwrap_or(JobStatus::Pending);
            if status != JobStatus::Succeeded {
                return GateDecision::Skip(SkipReason::UpstreamNotSucceeded {
                    job: need.clone(),
                    status,
                });
            }
        }

        match job.condition {
            Some(ref cond) if !cond.evaluate(trigger) => GateDecision::Skip(SkipReason::GuardFalse),
            _ => GateDecision::Run,
        }
    }

    /// Shorthand for `evaluate(..).is_run()`
    pub fn should_run(
        job: &Job,
        trigger: &TriggerContext,
        upstream: &HashMap<String, JobStatus>,
    ) -> bool {
        Self::evaluate(job, trigger, upstream).is_run()
    }
}
