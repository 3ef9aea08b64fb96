// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Built-in actions
//!
//! `uses:` steps resolve `name@version` against an [`ActionRegistry`] and
//! invoke the action with its interpolated `with:` parameters.

mod artifact;
mod checkout;
mod pages;

pub use artifact::{DownloadArtifact, UploadArtifact};
pub use checkout::Checkout;
pub use pages::{DeployPages, WriteRedirect};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{JobEnvironment, StepOutcome, StepRunner};
use crate::errors::JobflowError;
use crate::pipeline::{ActionRef, Permission, Step, StepKind};

/// Action parameters after interpolation
pub type Params = BTreeMap<String, String>;

/// A named, versioned step implementation
#[async_trait]
pub trait Action: Send + Sync {
    /// Name used in `uses:`
    fn name(&self) -> &'static str;

    /// Versions this implementation answers to
    fn versions(&self) -> &'static [&'static str] {
        &["v1"]
    }

    /// Parameters that must be present in `with:`
    fn required_params(&self) -> &'static [&'static str] {
        &[]
    }

    /// Permissions the invoking job must hold
    fn required_permissions(&self) -> &'static [Permission] {
        &[]
    }

    /// Run the action in `dir` (the step's working directory)
    async fn invoke(
        &self,
        params: &Params,
        env: &mut JobEnvironment,
        dir: &Path,
    ) -> Result<StepOutcome, JobflowError>;
}

/// Lookup table of actions by name
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Registry with every built-in action
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Checkout));
        registry.register(Arc::new(UploadArtifact));
        registry.register(Arc::new(DownloadArtifact));
        registry.register(Arc::new(WriteRedirect));
        registry.register(Arc::new(DeployPages));
        registry
    }

    /// Register an action under its own name
    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.name().to_string(), action);
    }

    /// Resolve a reference, checking the pinned version
    pub fn resolve(&self, reference: &ActionRef) -> Result<Arc<dyn Action>, JobflowError> {
        let action = self
            .actions
            .get(&reference.name)
            .ok_or_else(|| JobflowError::UnknownAction {
                action: reference.name.clone(),
            })?;

        if let Some(ref version) = reference.version {
            if !action.versions().contains(&version.as_str()) {
                return Err(JobflowError::UnsupportedActionVersion {
                    action: reference.name.clone(),
                    version: version.clone(),
                    supported: action.versions().join(", "),
                });
            }
        }

        Ok(action.clone())
    }

    /// Names of registered actions, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Runner for `uses:` steps
pub struct ActionRunner {
    registry: Arc<ActionRegistry>,
}

impl ActionRunner {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve `reference` and invoke it with already-interpolated params
    pub async fn invoke(
        &self,
        reference: &ActionRef,
        params: &Params,
        env: &mut JobEnvironment,
        dir: &Path,
    ) -> Result<StepOutcome, JobflowError> {
        let action = self.registry.resolve(reference)?;

        for permission in action.required_permissions() {
            env.require(*permission)?;
        }

        for param in action.required_params() {
            if params.get(*param).map_or(true, |v| v.is_empty()) {
                return Err(JobflowError::MissingParameter {
                    action: reference.name.clone(),
                    param: param.to_string(),
                });
            }
        }

        debug!(job = %env.job, action = %reference, "invoking action");
        action.invoke(params, env, dir).await
    }
}

#[async_trait]
impl StepRunner for ActionRunner {
    async fn run(&self, step: &Step, env: &mut JobEnvironment) -> Result<StepOutcome, JobflowError> {
        let StepKind::Uses { uses, params } = &step.kind else {
            return Err(JobflowError::InvalidStep {
                job: env.job.clone(),
                step: step.display_name(),
                reason: "Expected an action step".to_string(),
            });
        };

        let mut resolved = Params::new();
        for (k, v) in params {
            resolved.insert(k.clone(), env.expr().interpolate(v)?);
        }

        let dir = env.step_dir(step);
        self.invoke(uses, &resolved, env, &dir).await
    }

    fn validate_step(&self, job: &str, step: &Step) -> Result<(), JobflowError> {
        let StepKind::Uses { uses, params } = &step.kind else {
            return Err(JobflowError::InvalidStep {
                job: job.to_string(),
                step: step.display_name(),
                reason: "Not an action step".to_string(),
            });
        };

        let action = self.registry.resolve(uses)?;

        for param in action.required_params() {
            if !params.contains_key(*param) {
                return Err(JobflowError::MissingParameter {
                    action: uses.name.clone(),
                    param: param.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Parameter lookup with a default
fn param<'a>(params: &'a Params, key: &str, default: &'a str) -> &'a str {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

/// Truthy parameter values
fn flag(params: &Params, key: &str) -> bool {
    matches!(
        params.get(key).map(|v| v.to_lowercase()).as_deref(),
        Some("true" | "yes" | "1" | "recursive")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runners::testing::{job_env, step};

    #[test]
    fn test_registry_resolution() {
        let registry = ActionRegistry::builtin();

        assert_eq!(
            registry.names(),
            vec![
                "checkout",
                "deploy-pages",
                "download-artifact",
                "upload-artifact",
                "write-redirect"
            ]
        );
        assert!(registry.resolve(&"checkout@v1".parse().unwrap()).is_ok());
        assert!(registry.resolve(&"checkout".parse().unwrap()).is_ok());
        assert!(matches!(
            registry.resolve(&"checkout@v9".parse().unwrap()),
            Err(JobflowError::UnsupportedActionVersion { .. })
        ));
        assert!(matches!(
            registry.resolve(&"setup-node@v4".parse().unwrap()),
            Err(JobflowError::UnknownAction { .. })
        ));
    }

    #[test]
    fn test_validate_missing_param() {
        let runner = ActionRunner::new(Arc::new(ActionRegistry::builtin()));
        let s = step("uses: upload-artifact@v1\nwith:\n  name: pages\n");

        assert!(matches!(
            runner.validate_step("build", &s),
            Err(JobflowError::MissingParameter { .. })
        ));
    }

    #[tokio::test]
    async fn test_permissions_checked_before_invoke() {
        let mut job = job_env("deploy");
        let runner = ActionRunner::new(Arc::new(ActionRegistry::builtin()));

        let result = runner.run(&step("uses: deploy-pages@v1"), &mut job.env).await;
        assert!(matches!(result, Err(JobflowError::PermissionDenied { .. })));
    }

    #[test]
    fn test_flag_values() {
        let mut params = Params::new();
        params.insert("submodules".into(), "True".into());
        params.insert("lfs".into(), "false".into());

        assert!(flag(&params, "submodules"));
        assert!(!flag(&params, "lfs"));
        assert!(!flag(&params, "missing"));
        assert_eq!(param(&params, "path", "."), ".");
    }
}
