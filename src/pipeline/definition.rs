// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Pipeline definition structures
//!
//! Defines the schema for .jobflow.yaml files.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::trigger::{EventKind, TriggerContext};
use crate::errors::JobflowError;

/// Pipeline definition from .jobflow.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline name
    pub name: String,

    /// Pipeline description
    #[serde(default)]
    pub description: Option<String>,

    /// Events that start this pipeline
    #[serde(default, rename = "on")]
    pub triggers: Triggers,

    /// Global environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Jobs, in declaration order
    pub jobs: Vec<Job>,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Root directory for run workspaces and artifacts
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".jobflow/runs")
}

impl Pipeline {
    /// Load pipeline from a YAML or TOML file
    pub fn from_file(path: &Path) -> Result<Self, JobflowError> {
        if !path.exists() {
            return Err(JobflowError::PipelineNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| JobflowError::read(path, e))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parse pipeline from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, JobflowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Parse pipeline from TOML string
    pub fn from_toml(source: &str) -> Result<Self, JobflowError> {
        toml::from_str(source).map_err(Into::into)
    }

    /// Get a job by name
    pub fn get_job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Whether the `on:` filter accepts this trigger
    pub fn is_triggered_by(&self, trigger: &TriggerContext) -> bool {
        self.triggers.matches(trigger)
    }
}

/// Event filter (`on:` block)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Triggers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<BranchFilter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<BranchFilter>,
}

impl Triggers {
    /// No filter configured: every event triggers the pipeline
    pub fn is_empty(&self) -> bool {
        self.push.is_none() && self.pull_request.is_none()
    }

    /// Check a trigger against the filter
    pub fn matches(&self, trigger: &TriggerContext) -> bool {
        if self.is_empty() {
            return true;
        }

        match trigger.event() {
            EventKind::Push => self
                .push
                .as_ref()
                .is_some_and(|f| f.matches(trigger.branch())),
            EventKind::PullRequest => self
                .pull_request
                .as_ref()
                .is_some_and(|f| f.matches(trigger.base_branch())),
        }
    }
}

/// Branch list for one event kind; empty means any branch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchFilter {
    #[serde(default)]
    pub branches: Vec<String>,
}

impl BranchFilter {
    pub fn matches(&self, branch: Option<&str>) -> bool {
        if self.branches.is_empty() {
            return true;
        }
        branch.is_some_and(|b| self.branches.iter().any(|allowed| allowed == b))
    }
}

/// A job: steps sharing one workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job name (must be unique within pipeline)
    pub name: String,

    /// Job description
    #[serde(default)]
    pub description: Option<String>,

    /// Runner label this job targets
    #[serde(default = "default_runner")]
    pub runs_on: String,

    /// Jobs that must succeed before this one runs
    #[serde(default)]
    pub needs: Vec<String>,

    /// Guard evaluated against the trigger context, written as a map
    /// (`{branch: main}`, `{not: {event: pull_request}}`)
    #[serde(
        default,
        rename = "if",
        with = "serde_yaml::with::singleton_map_recursive",
        skip_serializing_if = "Option::is_none"
    )]
    pub condition: Option<Condition>,

    /// Capabilities granted to this job only
    #[serde(default)]
    pub permissions: Vec<Permission>,

    /// Environment variables for this job
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Job outputs, as expressions over step outputs
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

fn default_runner() -> String {
    "local".to_string()
}

impl Job {
    /// Check whether this job was granted a permission
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Ids of steps that declare one
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().filter_map(|s| s.id.as_deref()).collect()
    }
}

/// Guard condition for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Always run (default)
    Always,
    /// Never run
    Never,
    /// Run only when the trigger ref is this branch
    Branch(String),
    /// Run only for this event kind
    Event(EventKind),
    /// All nested conditions hold
    All(Vec<Condition>),
    /// Any nested condition holds
    Any(Vec<Condition>),
    /// Negation
    Not(Box<Condition>),
}

/// Elevated capabilities a job may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    ContentsRead,
    PagesWrite,
    IdTokenWrite,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContentsRead => write!(f, "contents-read"),
            Self::PagesWrite => write!(f, "pages-write"),
            Self::IdTokenWrite => write!(f, "id-token-write"),
        }
    }
}

/// A single step within a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step id, referenced by `steps.<id>.outputs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Environment variables for this step
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Working directory relative to the job workspace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,

    /// What the step does
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    /// Human-readable label for progress output
    pub fn display_name(&self) -> String {
        if let Some(ref name) = self.name {
            return name.clone();
        }
        if let Some(ref id) = self.id {
            return id.clone();
        }
        match &self.kind {
            StepKind::Run { run, .. } => {
                let first = run.lines().next().unwrap_or_default();
                format!("run: {}", first)
            }
            StepKind::Uses { uses, .. } => uses.to_string(),
            StepKind::Cache { cache } => format!("cache: {}", cache.manifest.join(", ")),
        }
    }

    /// Runner kind used to execute this step
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            StepKind::Run { .. } => "run",
            StepKind::Uses { .. } => "uses",
            StepKind::Cache { .. } => "cache",
        }
    }
}

/// Step variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepKind {
    /// Shell command
    Run {
        run: String,

        /// Shell to use (bash, sh, etc.)
        #[serde(default = "default_shell")]
        shell: String,
    },

    /// Built-in action invocation
    Uses {
        uses: ActionRef,

        #[serde(
            default,
            rename = "with",
            deserialize_with = "deserialize_params",
            skip_serializing_if = "BTreeMap::is_empty"
        )]
        params: BTreeMap<String, String>,
    },

    /// Dependency cache keyed on a manifest
    Cache { cache: CacheSpec },
}

/// Shell used for `run:` steps, lock commands and checkout hooks
pub const DEFAULT_SHELL: &str = "bash";

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

/// Accept any scalar for action parameters and keep it as a string
fn deserialize_params<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, value)
        })
        .collect())
}

/// Reference to an action: `name@version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionRef {
    pub name: String,
    pub version: Option<String>,
}

impl FromStr for ActionRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, version) = match s.split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (s, None),
        };

        if name.is_empty() {
            return Err(format!("Action reference '{}' has no name", s));
        }
        if version.is_some_and(str::is_empty) {
            return Err(format!("Action reference '{}' has an empty version", s));
        }

        Ok(Self {
            name: name.to_string(),
            version: version.map(str::to_string),
        })
    }
}

impl TryFrom<String> for ActionRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ActionRef> for String {
    fn from(value: ActionRef) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for ActionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.version {
            Some(ref v) => write!(f, "{}@{}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Cache step configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSpec {
    /// Manifest globs hashed into the key (e.g. `**/Cargo.lock`)
    pub manifest: Vec<String>,

    /// Command that materializes the manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<String>,

    /// Shell that runs `lock`
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Directories restored before and saved after the job
    pub paths: Vec<String>,

    /// Key prefix
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    "deps".to_string()
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable caching
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache directory
    #[serde(default = "default_cache_dir")]
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_cache_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".jobflow/cache")
}
