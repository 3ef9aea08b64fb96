// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Pipeline definitions and scheduling
//!
//! This module defines the data structures for jobflow pipelines (jobs,
//! steps, guards, permissions), the trigger context a run is evaluated
//! against, the job dependency graph, and the executor that drives it.

mod dag;
mod definition;
mod executor;
pub mod expr;
mod gate;
mod status;
mod trigger;
mod validation;

pub use dag::JobGraph;
pub use definition::*;
pub use executor::{
    CancelHandle, ExecutionOptions, JobReport, PipelineExecutor, PipelineResult, StepReport,
};
pub use gate::{Gate, GateDecision, SkipReason};
pub use status::{JobState, JobStatus, PipelineStatus};
pub use trigger::{EventKind, TriggerContext};
pub use validation::{PipelineValidator, ValidationResult};
