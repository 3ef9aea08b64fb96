// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! # jobflow - local CI/CD pipeline runner
//!
//! `jobflow` runs a pipeline of jobs connected by `needs`, gating each job
//! on its upstream results and a guard evaluated against the trigger.
//!
//! ## Features
//!
//! - **Dependency gate** - a job runs only when every upstream job succeeded
//!   and its `if:` guard holds for the triggering event
//! - **Content-keyed caches** - dependency directories restored from a key
//!   derived from a materialized lockfile
//! - **Artifact hand-off** - outputs become visible downstream only once
//!   their producer succeeds
//! - **Scoped permissions** - deployment actions require explicit grants
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a docs pipeline for the current crate
//! jobflow init
//!
//! # Check it
//! jobflow validate
//!
//! # Run it as a push to main
//! jobflow run --branch main
//! ```

pub mod artifacts;
pub mod cache;
pub mod cli;
pub mod errors;
pub mod pipeline;
pub mod runners;
pub mod utils;

// Re-export commonly used types
pub use errors::{JobflowError, JobflowResult};
pub use pipeline::{Job, Pipeline, PipelineExecutor, Step, TriggerContext};
