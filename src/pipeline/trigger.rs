// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Trigger context
//!
//! The immutable record of the event that started a run. It is built once
//! and passed by reference to everything that needs it.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

const HEADS_PREFIX: &str = "refs/heads/";

/// Kind of event that started the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::PullRequest => write!(f, "pull_request"),
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "push" => Ok(Self::Push),
            "pull_request" | "pull-request" | "pr" => Ok(Self::PullRequest),
            _ => Err(format!("Unknown event kind: {}", s)),
        }
    }
}

/// Immutable description of the triggering event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerContext {
    event: EventKind,
    git_ref: String,
    base_branch: Option<String>,
    sha: Option<String>,
}

impl TriggerContext {
    /// A push to `branch` (a bare name or a full `refs/heads/` ref)
    pub fn push(branch: &str) -> Self {
        let git_ref = if branch.starts_with("refs/") {
            branch.to_string()
        } else {
            format!("{}{}", HEADS_PREFIX, branch)
        };

        Self {
            event: EventKind::Push,
            git_ref,
            base_branch: None,
            sha: None,
        }
    }

    /// A pull request `number` targeting `base`
    pub fn pull_request(number: u64, base: &str) -> Self {
        Self {
            event: EventKind::PullRequest,
            git_ref: format!("refs/pull/{}/merge", number),
            base_branch: Some(base.trim_start_matches(HEADS_PREFIX).to_string()),
            sha: None,
        }
    }

    /// Attach the commit being built
    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    pub fn event(&self) -> EventKind {
        self.event
    }

    /// Full git ref being built
    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    /// Branch name, if the ref is a branch
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix(HEADS_PREFIX)
    }

    /// Target branch of a pull request
    pub fn base_branch(&self) -> Option<&str> {
        self.base_branch.as_deref()
    }

    pub fn sha(&self) -> Option<&str> {
        self.sha.as_deref()
    }

    /// Resolve a `trigger.<field>` expression
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "event" => Some(self.event.to_string()),
            "ref" => Some(self.git_ref.clone()),
            "branch" => Some(self.branch().unwrap_or_default().to_string()),
            "base" => Some(self.base_branch().unwrap_or_default().to_string()),
            "sha" => Some(self.sha().unwrap_or_default().to_string()),
            _ => None,
        }
    }

    /// Variables exported to every step
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("JOBFLOW_EVENT".to_string(), self.event.to_string()),
            ("JOBFLOW_REF".to_string(), self.git_ref.clone()),
        ];
        if let Some(sha) = self.sha() {
            vars.push(("JOBFLOW_SHA".to_string(), sha.to_string()));
        }
        vars
    }
}
