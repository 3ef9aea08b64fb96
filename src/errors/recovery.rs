// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from errors.

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Suggest fixing a circular dependency
    pub fn fix_circular_dependency(jobs: &[String]) -> Self {
        Self {
            action: "Remove circular dependency".into(),
            steps: vec![
                format!("Detected cycle: {}", jobs.join(" → ")),
                "Review the 'needs' list of each job in the cycle".into(),
                "Jobs must form a directed acyclic graph (DAG)".into(),
            ],
            commands: vec![
                "# Visualize your pipeline:".into(),
                "jobflow graph --format mermaid".into(),
            ],
        }
    }

    /// Suggest a valid action reference
    pub fn unknown_action(action: &str) -> Self {
        Self {
            action: format!("Replace action '{}'", action),
            steps: vec![
                "Only built-in actions can be referenced with 'uses:'".into(),
                "Use a 'run:' step for anything else".into(),
            ],
            commands: vec![
                "# Built-in actions:".into(),
                "checkout@v1  upload-artifact@v1  download-artifact@v1".into(),
                "write-redirect@v1  deploy-pages@v1".into(),
            ],
        }
    }

    /// Suggest granting a permission to a job
    pub fn grant_permission(job: &str, permission: &str) -> Self {
        Self {
            action: format!("Grant '{}' to job '{}'", permission, job),
            steps: vec![
                "Permissions are scoped per job and never inherited".into(),
                format!("Add '{}' to the permissions of '{}'", permission, job),
            ],
            commands: vec![
                "permissions:".into(),
                format!("  - {}", permission),
            ],
        }
    }

    /// Suggest generating a cache manifest before hashing it
    pub fn materialize_manifest(pattern: &str) -> Self {
        Self {
            action: format!("Generate '{}' before the cache step", pattern),
            steps: vec![
                "Cache keys are hashed from manifest contents".into(),
                "A missing manifest cannot produce a stable key".into(),
            ],
            commands: vec![
                "cache:".into(),
                format!("  manifest: [\"{}\"]", pattern),
                "  lock: cargo generate-lockfile".into(),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}
