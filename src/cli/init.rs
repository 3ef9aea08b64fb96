// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Init command - write a starter pipeline

use colored::Colorize;
use miette::Result;
use std::path::Path;

const PIPELINE_FILE: &str = ".jobflow.yaml";

/// Run the init command
pub async fn run(crate_name: Option<String>, trunk: String, force: bool, verbose: bool) -> Result<()> {
    let crate_name = crate_name.unwrap_or_else(|| {
        std::env::current_dir()
            .ok()
            .and_then(|p| p.file_name().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_else(|| "my-crate".to_string())
    });

    println!("{}", "Initializing jobflow pipeline...".bold());
    println!();

    if Path::new(PIPELINE_FILE).exists() && !force {
        return Err(miette::miette!(
            "{} already exists. Use --force to overwrite.",
            PIPELINE_FILE
        ));
    }

    let pipeline_content = generate_docs_template(&crate_name, &trunk);

    std::fs::write(PIPELINE_FILE, &pipeline_content)
        .map_err(|e| miette::miette!("Failed to write {}: {}", PIPELINE_FILE, e))?;

    println!("  {} Created {}", "✓".green(), PIPELINE_FILE);

    println!();
    println!("{}", "Pipeline initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to adjust jobs and steps", PIPELINE_FILE.cyan());
    println!("  2. Run {} to check it", "jobflow validate".cyan());
    println!(
        "  3. Run {} to build and deploy the docs",
        format!("jobflow run --branch {}", trunk).cyan()
    );
    println!();

    if verbose {
        println!("{}", "Generated pipeline:".dimmed());
        println!("{}", "─".repeat(50).dimmed());
        println!("{}", pipeline_content.dimmed());
    }

    Ok(())
}

/// Build, test and document a crate; deploy the docs from the trunk branch
fn generate_docs_template(crate_name: &str, trunk: &str) -> String {
    let doc_dir = crate_name.replace('-', "_");

    format!(
        r#"# jobflow pipeline configuration
version: "1"
name: "{crate_name} docs"

on:
  push:
    branches: [{trunk}]
  pull_request:
    branches: [{trunk}]

env:
  CARGO_TERM_COLOR: always

jobs:
  - name: build
    steps:
      - uses: checkout@v1
        with:
          submodules: true
      - name: Generate lockfile
        cache:
          manifest: [Cargo.lock]
          lock: cargo generate-lockfile
          paths: [target]
          key_prefix: cargo
      - name: Build
        run: cargo build --verbose
      - name: Run tests
        run: cargo test --verbose
      - name: Build docs
        run: cargo doc --no-deps
      - name: Add redirect
        uses: write-redirect@v1
        with:
          root: target/doc
          target: {doc_dir}/index.html
      - name: Upload docs
        uses: upload-artifact@v1
        with:
          name: pages
          path: target/doc

  - name: deploy
    needs: [build]
    if:
      branch: {trunk}
    permissions: [pages-write, id-token-write]
    outputs:
      page_url: "${{{{ steps.deployment.outputs.page_url }}}}"
    steps:
      - id: deployment
        uses: deploy-pages@v1
        with:
          artifact: pages
"#
    )
}
