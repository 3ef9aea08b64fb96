// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Validate command - check pipeline configuration

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::pipeline::{Pipeline, PipelineValidator};
use crate::utils::{print_error, print_success, print_warning};

/// Run the validate command
pub async fn run(pipeline_path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    if !pipeline_path.exists() {
        return Err(miette::miette!(
            "Pipeline file not found: {}\n\n\
             Run 'jobflow init' to create one.",
            pipeline_path.display()
        ));
    }

    let pipeline = match Pipeline::from_file(&pipeline_path) {
        Ok(p) => p,
        Err(e) => {
            print_error("Failed to parse pipeline");
            eprintln!();
            return Err(miette::miette!("Parse error: {}", e));
        }
    };

    print_success("Pipeline file parses");

    let validation = PipelineValidator::validate(&pipeline)?;

    if !validation.errors.is_empty() {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            print_error(error);
        }
    }

    if !validation.warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            print_warning(warning);
        }
    }

    if verbose {
        println!();
        println!("{}:", "Pipeline summary".bold());
        println!("  Name: {}", pipeline.name);
        println!("  Jobs: {}", pipeline.jobs.len());
        for job in &pipeline.jobs {
            let needs = if job.needs.is_empty() {
                String::new()
            } else {
                format!(" [needs: {}]", job.needs.join(", "))
            };
            let guard = job
                .condition
                .as_ref()
                .map(|c| format!(" [if: {}]", c))
                .unwrap_or_default();
            println!(
                "    - {} ({} step{}){}{}",
                job.name,
                job.steps.len(),
                if job.steps.len() == 1 { "" } else { "s" },
                needs.dimmed(),
                guard.dimmed()
            );
        }
    }

    println!();

    if !validation.is_valid() {
        Err(miette::miette!("Pipeline validation failed"))
    } else if validation.has_warnings() {
        println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "Pipeline is valid!".green().bold());
        Ok(())
    }
}
