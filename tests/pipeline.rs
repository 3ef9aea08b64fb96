// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! End-to-end pipeline runs through the library API

use std::path::Path;
use std::sync::Arc;

use jobflow::cache::{Cache, FilesystemCache};
use jobflow::pipeline::{
    ExecutionOptions, JobStatus, Pipeline, PipelineExecutor, PipelineStatus, SkipReason,
    TriggerContext,
};
use tempfile::TempDir;

const DOCS: &str = r#"
name: docs
on:
  push:
    branches: [main, "feature/x"]
  pull_request:
    branches: [main]
jobs:
  - name: build
    steps:
      - uses: checkout@v1
      - name: Build docs
        run: |
          mkdir -p site/demo
          cp README.md site/demo/index.html
      - name: Test
        run: "${{ env.TEST_CMD }}"
      - uses: write-redirect@v1
        with:
          root: site
          target: demo/index.html
      - uses: upload-artifact@v1
        with:
          name: pages
          path: site
  - name: deploy
    needs: [build]
    if:
      branch: main
    permissions: [pages-write, id-token-write]
    outputs:
      page_url: "${{ steps.deployment.outputs.page_url }}"
    steps:
      - id: deployment
        uses: deploy-pages@v1
        with:
          directory: public
"#;

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("README.md"), "<h1>demo</h1>").unwrap();
    temp
}

fn docs(test_cmd: &str) -> Pipeline {
    let mut pipeline = Pipeline::from_yaml(DOCS).unwrap();
    pipeline.env.insert("TEST_CMD".into(), test_cmd.into());
    pipeline
}

async fn run(
    executor: &PipelineExecutor,
    pipeline: &Pipeline,
    trigger: TriggerContext,
    dir: &Path,
) -> jobflow::pipeline::PipelineResult {
    let options = ExecutionOptions {
        source_dir: Some(dir.to_path_buf()),
        ..Default::default()
    };
    executor
        .execute(pipeline, &trigger, dir, &options)
        .await
        .unwrap()
}

#[tokio::test]
async fn trunk_push_deploys_and_reports_page_url() {
    let temp = project();
    let result = run(
        &PipelineExecutor::new(),
        &docs("true"),
        TriggerContext::push("main"),
        temp.path(),
    )
    .await;

    assert_eq!(result.status, PipelineStatus::Succeeded);
    assert_eq!(result.job_status("deploy"), Some(JobStatus::Succeeded));

    let public = temp.path().join("public");
    assert_eq!(
        result.outputs["deploy.page_url"],
        format!("file://{}/", public.display())
    );
    assert_eq!(
        std::fs::read_to_string(public.join("demo/index.html")).unwrap(),
        "<h1>demo</h1>"
    );
    let redirect = std::fs::read_to_string(public.join("index.html")).unwrap();
    assert!(redirect.contains("url=demo/index.html"));
}

#[tokio::test]
async fn non_trunk_push_skips_deploy() {
    let temp = project();
    let result = run(
        &PipelineExecutor::new(),
        &docs("true"),
        TriggerContext::push("feature/x"),
        temp.path(),
    )
    .await;

    assert_eq!(result.status, PipelineStatus::Succeeded);
    assert_eq!(result.job_status("build"), Some(JobStatus::Succeeded));
    assert_eq!(
        result.jobs["deploy"].skip_reason,
        Some(SkipReason::GuardFalse)
    );
    assert!(result.outputs.is_empty());
    assert!(!temp.path().join("public").exists());
}

#[tokio::test]
async fn pull_request_builds_but_never_deploys() {
    let temp = project();
    let pipeline = docs("true");
    let trigger = TriggerContext::pull_request(7, "main");
    assert!(pipeline.is_triggered_by(&trigger));

    let result = run(&PipelineExecutor::new(), &pipeline, trigger, temp.path()).await;

    assert_eq!(result.job_status("build"), Some(JobStatus::Succeeded));
    assert_eq!(result.job_status("deploy"), Some(JobStatus::Skipped));
}

#[tokio::test]
async fn failing_test_blocks_deploy_and_discards_artifact() {
    let temp = project();
    let result = run(
        &PipelineExecutor::new(),
        &docs("exit 1"),
        TriggerContext::push("main"),
        temp.path(),
    )
    .await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.job_status("build"), Some(JobStatus::Failed));
    assert_eq!(
        result.jobs["deploy"].skip_reason,
        Some(SkipReason::UpstreamNotSucceeded {
            job: "build".into(),
            status: JobStatus::Failed
        })
    );

    // Steps after the failure never ran, so nothing was published
    assert_eq!(result.jobs["build"].steps.len(), 3);
    assert!(!result.run_dir.join("artifacts/build/pages").exists());
    assert!(!temp.path().join("public").exists());
}

#[tokio::test]
async fn failed_job_discards_staged_artifacts() {
    let temp = project();
    let pipeline = Pipeline::from_yaml(
        r#"
name: late-failure
jobs:
  - name: build
    steps:
      - run: mkdir -p out && echo partial > out/file
      - uses: upload-artifact@v1
        with: { name: out, path: out }
      - run: exit 2
  - name: consume
    needs: [build]
    steps:
      - uses: download-artifact@v1
        with: { name: out }
"#,
    )
    .unwrap();

    let result = run(
        &PipelineExecutor::new(),
        &pipeline,
        TriggerContext::push("main"),
        temp.path(),
    )
    .await;

    assert_eq!(result.job_status("consume"), Some(JobStatus::Skipped));
    assert!(!result.run_dir.join("artifacts/build/out").exists());
    assert!(!result.run_dir.join("artifacts/.staging/build/out").exists());
}

#[tokio::test]
async fn second_run_restores_dependency_cache() {
    let temp = project();
    let pipeline = Pipeline::from_yaml(
        r#"
name: cached
jobs:
  - name: build
    outputs:
      hit: "${{ steps.deps.outputs.cache-hit }}"
    steps:
      - id: deps
        cache:
          manifest: [deps.lock]
          lock: echo "serde 1.0" > deps.lock
          paths: [vendor]
      - run: |
          test -f vendor/serde.rs || { mkdir -p vendor && echo fetched > vendor/serde.rs; }
"#,
    )
    .unwrap();

    let cache: Arc<dyn Cache> =
        Arc::new(FilesystemCache::new(temp.path().join(".jobflow/cache")).unwrap());

    let executor = PipelineExecutor::new().with_cache(cache.clone());
    let first = run(&executor, &pipeline, TriggerContext::push("main"), temp.path()).await;
    assert_eq!(first.outputs["build.hit"], "false");
    assert_eq!(cache.entries().await.unwrap().len(), 1);

    let second = run(&executor, &pipeline, TriggerContext::push("main"), temp.path()).await;
    assert_eq!(second.outputs["build.hit"], "true");
    assert!(second.jobs["build"].steps[0].cache_hit);
}

#[tokio::test]
async fn missing_manifest_without_lock_fails_the_job() {
    let temp = project();
    let pipeline = Pipeline::from_yaml(
        r#"
name: unlocked
jobs:
  - name: build
    steps:
      - cache:
          manifest: [Cargo.lock]
          paths: [target]
"#,
    )
    .unwrap();

    let result = run(
        &PipelineExecutor::new(),
        &pipeline,
        TriggerContext::push("main"),
        temp.path(),
    )
    .await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert!(result.jobs["build"].steps[0].stderr.contains("Cargo.lock"));
}

#[tokio::test]
async fn cancellation_stops_at_step_boundary() {
    let temp = project();
    let pipeline = Pipeline::from_yaml(
        r#"
name: slow
jobs:
  - name: first
    steps:
      - run: sleep 1
      - run: touch second-step-ran
  - name: later
    needs: [first]
    steps:
      - run: "true"
"#,
    )
    .unwrap();

    let executor = PipelineExecutor::new();
    let cancel = executor.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let result = run(&executor, &pipeline, TriggerContext::push("main"), temp.path()).await;

    assert_eq!(result.status, PipelineStatus::Cancelled);
    assert_eq!(result.job_status("first"), Some(JobStatus::Cancelled));
    assert_eq!(result.job_status("later"), Some(JobStatus::Cancelled));
    assert_eq!(result.jobs["first"].steps.len(), 1);
    assert!(result.jobs["first"].steps[0].success);
}
