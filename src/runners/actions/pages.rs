// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Static site actions: redirect index generation and pages deployment

use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use super::{param, Action, Params};
use crate::errors::JobflowError;
use crate::pipeline::Permission;
use crate::runners::{JobEnvironment, StepOutcome};
use crate::utils::fs::replace_atomically;

/// `write-redirect@v1`: write `<root>/index.html` that forwards to `target`
pub struct WriteRedirect;

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn redirect_page(target: &str) -> String {
    let target = escape_attr(target);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta http-equiv=\"refresh\" content=\"0; url={target}\">\n\
         <link rel=\"canonical\" href=\"{target}\">\n</head>\n\
         <body><a href=\"{target}\">{target}</a></body>\n</html>\n"
    )
}

#[async_trait]
impl Action for WriteRedirect {
    fn name(&self) -> &'static str {
        "write-redirect"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["root", "target"]
    }

    async fn invoke(
        &self,
        params: &Params,
        _env: &mut JobEnvironment,
        dir: &Path,
    ) -> Result<StepOutcome, JobflowError> {
        let start = Instant::now();
        let root = JobEnvironment::resolve(dir, param(params, "root", ""));
        let target = param(params, "target", "");

        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| JobflowError::write(&root, e))?;

        let index = root.join("index.html");
        tokio::fs::write(&index, redirect_page(target))
            .await
            .map_err(|e| JobflowError::write(&index, e))?;

        Ok(StepOutcome::success(
            format!("Wrote redirect {} -> {}", index.display(), target),
            start.elapsed(),
        ))
    }
}

/// `deploy-pages@v1`: publish an upstream artifact to the pages directory
pub struct DeployPages;

#[async_trait]
impl Action for DeployPages {
    fn name(&self) -> &'static str {
        "deploy-pages"
    }

    fn required_permissions(&self) -> &'static [Permission] {
        &[Permission::PagesWrite, Permission::IdTokenWrite]
    }

    async fn invoke(
        &self,
        params: &Params,
        env: &mut JobEnvironment,
        _dir: &Path,
    ) -> Result<StepOutcome, JobflowError> {
        let start = Instant::now();
        let name = param(params, "artifact", "pages");

        let target = match params.get("directory").filter(|d| !d.is_empty()) {
            Some(dir) => JobEnvironment::resolve(&env.source_dir, dir),
            None => env.source_dir.join(".jobflow").join("pages"),
        };

        let handle = env
            .artifacts
            .resolve(name, env.upstream.iter().map(String::as_str))
            .await?;
        let location = env.artifacts.fetch(&handle).await?;

        replace_atomically(&location, &target)?;

        let base = match params.get("base_url").filter(|u| !u.is_empty()) {
            Some(url) => url.clone(),
            None => format!("file://{}", target.display()),
        };
        let page_url = format!("{}/", base.trim_end_matches('/'));

        info!(job = %env.job, artifact = %handle, url = %page_url, "deployed pages");

        Ok(StepOutcome::success(
            format!("Deployed {} to {}", handle, target.display()),
            start.elapsed(),
        )
        .with_output("page_url", page_url))
    }
}
