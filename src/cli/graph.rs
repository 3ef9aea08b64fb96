// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Graph command - visualize the job graph

use miette::Result;
use std::path::PathBuf;

use super::{explain, load_pipeline, GraphFormat};
use crate::pipeline::JobGraph;

/// Run the graph command
pub async fn run(pipeline_path: PathBuf, format: GraphFormat, _verbose: bool) -> Result<()> {
    let pipeline = load_pipeline(&pipeline_path)?;

    let graph = JobGraph::build(&pipeline).map_err(explain)?;

    let output = match format {
        GraphFormat::Text => graph.to_text(&pipeline).map_err(explain)?,
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
    };

    println!("{}", output);

    Ok(())
}
