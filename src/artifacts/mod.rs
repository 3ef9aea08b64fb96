// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Artifact channel
//!
//! Jobs publish named outputs here. A published artifact sits in a staging
//! area owned by its producer until that job succeeds; finalization renames
//! it into place, so a consumer never observes a partial artifact. Once
//! finalized an artifact is immutable.

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::JobflowError;
use crate::utils::fs::{copy_tree, remove_path};

/// Identifies one artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArtifactHandle {
    pub producer: String,
    pub name: String,
}

impl std::fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.producer, self.name)
    }
}

/// Content handed to `publish`
#[derive(Debug, Clone)]
pub enum ArtifactSource {
    /// A file or directory to copy
    Path(PathBuf),
    /// Raw bytes stored as a single file
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactState {
    Staged,
    Finalized,
}

#[derive(Debug, Clone)]
struct ArtifactRecord {
    state: ArtifactState,
    staged_at: PathBuf,
    location: PathBuf,
}

/// Filesystem-backed artifact store for one pipeline run
pub struct ArtifactStore {
    root: PathBuf,
    records: RwLock<HashMap<ArtifactHandle, ArtifactRecord>>,
}

impl ArtifactStore {
    /// Create a store rooted at `root`
    pub fn new(root: PathBuf) -> Result<Self, JobflowError> {
        std::fs::create_dir_all(root.join(".staging"))
            .map_err(|e| JobflowError::write(&root, e))?;

        Ok(Self {
            root,
            records: RwLock::new(HashMap::new()),
        })
    }

    /// Stage an artifact for `producer`; it stays invisible until
    /// [`finalize_job`](Self::finalize_job) is called for that job.
    pub async fn publish(
        &self,
        producer: &str,
        name: &str,
        source: ArtifactSource,
    ) -> Result<ArtifactHandle, JobflowError> {
        validate_name(name)?;

        let handle = ArtifactHandle {
            producer: producer.to_string(),
            name: name.to_string(),
        };

        let mut records = self.records.write().await;
        if records.contains_key(&handle) {
            return Err(JobflowError::ArtifactExists {
                producer: producer.to_string(),
                name: name.to_string(),
            });
        }

        let staged_at = self.root.join(".staging").join(producer).join(name);
        let location = self.root.join(producer).join(name);

        match source {
            ArtifactSource::Path(ref path) => {
                copy_tree(path, &staged_at, &[])?;
            }
            ArtifactSource::Bytes(ref bytes) => {
                if let Some(parent) = staged_at.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| JobflowError::write(parent, e))?;
                }
                tokio::fs::write(&staged_at, bytes)
                    .await
                    .map_err(|e| JobflowError::write(&staged_at, e))?;
            }
        }

        debug!(artifact = %handle, "staged artifact");

        records.insert(
            handle.clone(),
            ArtifactRecord {
                state: ArtifactState::Staged,
                staged_at,
                location,
            },
        );

        Ok(handle)
    }

    /// Make every artifact staged by `producer` visible.
    ///
    /// The producer's staging directory is renamed into place in one step,
    /// so either all of its artifacts become visible or none do.
    pub async fn finalize_job(&self, producer: &str) -> Result<Vec<ArtifactHandle>, JobflowError> {
        let mut records = self.records.write().await;
        let mut finalized: Vec<ArtifactHandle> = records
            .iter()
            .filter(|(h, r)| h.producer == producer && r.state == ArtifactState::Staged)
            .map(|(h, _)| h.clone())
            .collect();

        if finalized.is_empty() {
            return Ok(finalized);
        }

        let staging = self.root.join(".staging").join(producer);
        let target = self.root.join(producer);
        if target.exists() {
            return Err(JobflowError::write(
                &target,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "artifacts for this job were already finalized",
                ),
            ));
        }
        std::fs::rename(&staging, &target).map_err(|e| JobflowError::write(&target, e))?;

        for handle in &finalized {
            if let Some(record) = records.get_mut(handle) {
                record.state = ArtifactState::Finalized;
            }
        }

        finalized.sort_by(|a, b| a.name.cmp(&b.name));
        info!(job = producer, count = finalized.len(), "artifacts finalized");

        Ok(finalized)
    }

    /// Drop everything `producer` published (its job did not succeed)
    pub async fn discard_job(&self, producer: &str) -> Result<(), JobflowError> {
        let mut records = self.records.write().await;
        let owned: Vec<ArtifactHandle> = records
            .keys()
            .filter(|h| h.producer == producer)
            .cloned()
            .collect();

        for handle in owned {
            if let Some(record) = records.remove(&handle) {
                let path = match record.state {
                    ArtifactState::Staged => &record.staged_at,
                    ArtifactState::Finalized => &record.location,
                };
                remove_path(path)?;
                debug!(artifact = %handle, "discarded artifact");
            }
        }

        Ok(())
    }

    /// Find artifact `name` among the producers visible to a consumer.
    ///
    /// Staged artifacts resolve too, so that `fetch` can report them as
    /// not yet available rather than missing.
    pub async fn resolve<'a, I>(&self, name: &str, producers: I) -> Result<ArtifactHandle, JobflowError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let records = self.records.read().await;
        let mut candidates: Vec<&ArtifactHandle> = Vec::new();

        for producer in producers {
            let handle = ArtifactHandle {
                producer: producer.to_string(),
                name: name.to_string(),
            };
            if let Some((h, _)) = records.get_key_value(&handle) {
                candidates.push(h);
            }
        }

        match candidates.as_slice() {
            [] => Err(JobflowError::ArtifactNotFound {
                name: name.to_string(),
            }),
            [one] => Ok((*one).clone()),
            many => Err(JobflowError::ExecutionFailed {
                message: format!(
                    "Artifact '{}' is published by several upstream jobs: {}",
                    name,
                    many.iter()
                        .map(|h| h.producer.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                help: Some("Give each upstream artifact a distinct name".into()),
            }),
        }
    }

    /// Location of a finalized artifact
    pub async fn fetch(&self, handle: &ArtifactHandle) -> Result<PathBuf, JobflowError> {
        let records = self.records.read().await;
        match records.get(handle) {
            None => Err(JobflowError::ArtifactNotFound {
                name: handle.name.clone(),
            }),
            Some(record) if record.state == ArtifactState::Staged => {
                Err(JobflowError::ArtifactNotAvailable {
                    producer: handle.producer.clone(),
                    name: handle.name.clone(),
                })
            }
            Some(record) => Ok(record.location.clone()),
        }
    }

    /// All finalized artifacts
    pub async fn finalized(&self) -> Vec<ArtifactHandle> {
        let records = self.records.read().await;
        let mut handles: Vec<ArtifactHandle> = records
            .iter()
            .filter(|(_, r)| r.state == ArtifactState::Finalized)
            .map(|(h, _)| h.clone())
            .collect();
        handles.sort_by(|a, b| (&a.producer, &a.name).cmp(&(&b.producer, &b.name)));
        handles
    }
}

fn validate_name(name: &str) -> Result<(), JobflowError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name == "..";
    if bad {
        return Err(JobflowError::ExecutionFailed {
            message: format!("Invalid artifact name: '{}'", name),
            help: Some("Artifact names are single path components, e.g. 'pages'".into()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, ArtifactStore) {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("artifacts")).unwrap();
        (temp, store)
    }

    #[tokio::test]
    async fn test_not_available_before_finalize() {
        let (_temp, store) = store().await;

        let handle = store
            .publish("build", "report", ArtifactSource::Bytes(b"ok".to_vec()))
            .await
            .unwrap();

        assert!(matches!(
            store.fetch(&handle).await,
            Err(JobflowError::ArtifactNotAvailable { .. })
        ));

        store.finalize_job("build").await.unwrap();

        let path = store.fetch(&handle).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_publish_directory() {
        let (temp, store) = store().await;
        let docs = temp.path().join("doc");
        std::fs::create_dir_all(docs.join("demo")).unwrap();
        std::fs::write(docs.join("index.html"), "<html>").unwrap();
        std::fs::write(docs.join("demo/index.html"), "<demo>").unwrap();

        let handle = store
            .publish("build", "pages", ArtifactSource::Path(docs))
            .await
            .unwrap();
        store.finalize_job("build").await.unwrap();

        let path = store.fetch(&handle).await.unwrap();
        assert!(path.join("demo/index.html").exists());
        assert_eq!(store.finalized().await, vec![handle]);
    }

    #[tokio::test]
    async fn test_artifacts_are_immutable() {
        let (_temp, store) = store().await;

        store
            .publish("build", "pages", ArtifactSource::Bytes(vec![1]))
            .await
            .unwrap();

        assert!(matches!(
            store
                .publish("build", "pages", ArtifactSource::Bytes(vec![2]))
                .await,
            Err(JobflowError::ArtifactExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_discard_removes_staged() {
        let (_temp, store) = store().await;

        let handle = store
            .publish("build", "pages", ArtifactSource::Bytes(vec![1]))
            .await
            .unwrap();
        store.discard_job("build").await.unwrap();

        assert!(matches!(
            store.fetch(&handle).await,
            Err(JobflowError::ArtifactNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_finalize_exposes_nothing() {
        let (temp, store) = store().await;

        let a = store
            .publish("build", "a", ArtifactSource::Bytes(b"a".to_vec()))
            .await
            .unwrap();
        let b = store
            .publish("build", "b", ArtifactSource::Bytes(b"b".to_vec()))
            .await
            .unwrap();

        // Something already occupies the job's artifact directory
        let blocker = temp.path().join("artifacts/build");
        std::fs::write(&blocker, "in the way").unwrap();

        assert!(store.finalize_job("build").await.is_err());
        for handle in [&a, &b] {
            assert!(matches!(
                store.fetch(handle).await,
                Err(JobflowError::ArtifactNotAvailable { .. })
            ));
        }

        store.discard_job("build").await.unwrap();
        for handle in [&a, &b] {
            assert!(matches!(
                store.fetch(handle).await,
                Err(JobflowError::ArtifactNotFound { .. })
            ));
        }
        assert!(store.finalized().await.is_empty());
        assert_eq!(std::fs::read_to_string(&blocker).unwrap(), "in the way");
    }

    #[tokio::test]
    async fn test_discard_after_finalize_hides_artifacts() {
        let (_temp, store) = store().await;

        let handle = store
            .publish("build", "pages", ArtifactSource::Bytes(vec![1]))
            .await
            .unwrap();
        store.finalize_job("build").await.unwrap();
        let location = store.fetch(&handle).await.unwrap();

        store.discard_job("build").await.unwrap();
        assert!(!location.exists());
        assert!(store.fetch(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_respects_visibility() {
        let (_temp, store) = store().await;

        store
            .publish("build", "pages", ArtifactSource::Bytes(vec![1]))
            .await
            .unwrap();
        store.finalize_job("build").await.unwrap();

        assert!(store.resolve("pages", ["build"]).await.is_ok());
        assert!(matches!(
            store.resolve("pages", ["lint"]).await,
            Err(JobflowError::ArtifactNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_names() {
        let (_temp, store) = store().await;

        for bad in ["", "../escape", "a/b", ".hidden"] {
            assert!(store
                .publish("build", bad, ArtifactSource::Bytes(vec![]))
                .await
                .is_err());
        }
    }
}
