// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Artifact upload and download actions

use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use super::{param, Action, Params};
use crate::artifacts::ArtifactSource;
use crate::errors::JobflowError;
use crate::runners::{JobEnvironment, StepOutcome};
use crate::utils::fs::copy_tree;

/// `upload-artifact@v1`: stage `with.path` as artifact `with.name`
pub struct UploadArtifact;

#[async_trait]
impl Action for UploadArtifact {
    fn name(&self) -> &'static str {
        "upload-artifact"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["name", "path"]
    }

    async fn invoke(
        &self,
        params: &Params,
        env: &mut JobEnvironment,
        dir: &Path,
    ) -> Result<StepOutcome, JobflowError> {
        let start = Instant::now();
        let name = param(params, "name", "");
        let path = JobEnvironment::resolve(dir, param(params, "path", ""));

        if !path.exists() {
            return Err(JobflowError::FileNotFound {
                path: path.clone(),
                help: Some(format!("Nothing to upload as artifact '{}'", name)),
            });
        }

        let handle = env
            .artifacts
            .publish(&env.job, name, ArtifactSource::Path(path.clone()))
            .await?;

        info!(artifact = %handle, "uploaded artifact");

        Ok(StepOutcome::success(
            format!("Uploaded {} as {}", path.display(), handle),
            start.elapsed(),
        )
        .with_output("artifact", handle.to_string()))
    }
}

/// `download-artifact@v1`: copy an upstream artifact into the workspace
pub struct DownloadArtifact;

#[async_trait]
impl Action for DownloadArtifact {
    fn name(&self) -> &'static str {
        "download-artifact"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn invoke(
        &self,
        params: &Params,
        env: &mut JobEnvironment,
        dir: &Path,
    ) -> Result<StepOutcome, JobflowError> {
        let start = Instant::now();
        let name = param(params, "name", "");
        let dest = JobEnvironment::resolve(dir, param(params, "path", "."));

        let handle = env
            .artifacts
            .resolve(name, env.upstream.iter().map(String::as_str))
            .await?;
        let location = env.artifacts.fetch(&handle).await?;

        // A file artifact lands under its own name inside the destination
        let target = if location.is_file() {
            dest.join(name)
        } else {
            dest.clone()
        };
        copy_tree(&location, &target, &[])?;

        info!(job = %env.job, artifact = %handle, "downloaded artifact");

        Ok(StepOutcome::success(
            format!("Downloaded {} into {}", handle, target.display()),
            start.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runners::testing::job_env;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_upload_stages_until_finalized() {
        let mut job = job_env("build");
        let site = job.env.workspace.join("target/doc");
        std::fs::create_dir_all(&site).unwrap();
        std::fs::write(site.join("index.html"), "<html/>").unwrap();

        let workspace = job.env.workspace.clone();
        UploadArtifact
            .invoke(
                &params(&[("name", "pages"), ("path", "target/doc")]),
                &mut job.env,
                &workspace,
            )
            .await
            .unwrap();

        let handle = job
            .env
            .artifacts
            .resolve("pages", ["build"])
            .await
            .unwrap();
        assert!(matches!(
            job.env.artifacts.fetch(&handle).await,
            Err(JobflowError::ArtifactNotAvailable { .. })
        ));

        job.env.artifacts.finalize_job("build").await.unwrap();
        let location = job.env.artifacts.fetch(&handle).await.unwrap();
        assert!(location.join("index.html").exists());
    }

    #[tokio::test]
    async fn test_upload_missing_path() {
        let mut job = job_env("build");
        let workspace = job.env.workspace.clone();

        let result = UploadArtifact
            .invoke(
                &params(&[("name", "pages"), ("path", "target/doc")]),
                &mut job.env,
                &workspace,
            )
            .await;
        assert!(matches!(result, Err(JobflowError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn test_download_only_sees_upstream() {
        let mut job = job_env("deploy");
        let artifacts = job.env.artifacts.clone();
        artifacts
            .publish("build", "pages", ArtifactSource::Bytes(b"<html/>".to_vec()))
            .await
            .unwrap();
        artifacts.finalize_job("build").await.unwrap();

        let workspace = job.env.workspace.clone();
        let p = params(&[("name", "pages"), ("path", "site")]);

        let hidden = DownloadArtifact.invoke(&p, &mut job.env, &workspace).await;
        assert!(matches!(hidden, Err(JobflowError::ArtifactNotFound { .. })));

        job.env.upstream.insert("build".into());
        DownloadArtifact
            .invoke(&p, &mut job.env, &workspace)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(workspace.join("site/pages")).unwrap(),
            "<html/>"
        );
    }
}
