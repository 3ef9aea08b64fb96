// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Filesystem-based cache implementation
//!
//! Each entry lives in `<dir>/<h[..2]>/<h>/` where `h` is the BLAKE3 hash of
//! the key: an `entry.json` plus one `data/<n>` copy per saved path. Entries
//! are written to a staging directory and renamed into place.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use super::{Cache, CacheKey, CacheStats, CachedEntry};
use crate::errors::JobflowError;
use crate::utils::fs::{copy_tree, dir_size, staging_path, swap_into_place};

const ENTRY_FILE: &str = "entry.json";
const DATA_DIR: &str = "data";

/// Filesystem-based cache
pub struct FilesystemCache {
    cache_dir: PathBuf,
}

impl FilesystemCache {
    /// Create a new filesystem cache
    pub fn new(cache_dir: PathBuf) -> Result<Self, JobflowError> {
        if !cache_dir.exists() {
            std::fs::create_dir_all(&cache_dir).map_err(|e| {
                JobflowError::cache(format!("Failed to create cache directory: {}", e))
            })?;
        }

        Ok(Self { cache_dir })
    }

    pub fn directory(&self) -> &Path {
        &self.cache_dir
    }

    /// Get directory for a cache entry
    fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        // Keys carry user prefixes; hash them into safe directory names
        let hashed = blake3::hash(key.as_str().as_bytes()).to_hex().to_string();
        let (prefix, _) = hashed.split_at(2);
        self.cache_dir.join(prefix).join(&hashed)
    }

    fn read_entry(dir: &Path) -> Result<Option<CachedEntry>, JobflowError> {
        let entry_file = dir.join(ENTRY_FILE);
        if !entry_file.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&entry_file)
            .map_err(|e| JobflowError::cache(format!("Failed to read cache entry: {}", e)))?;
        let entry = serde_json::from_str(&content)
            .map_err(|e| JobflowError::cache(format!("Failed to parse cache entry: {}", e)))?;
        Ok(Some(entry))
    }
}

#[async_trait]
impl Cache for FilesystemCache {
    async fn restore(
        &self,
        key: &CacheKey,
        dest: &Path,
    ) -> Result<Option<Vec<PathBuf>>, JobflowError> {
        let dir = self.entry_dir(key);
        let Some(entry) = Self::read_entry(&dir)? else {
            return Ok(None);
        };

        if entry.key != *key {
            return Ok(None);
        }

        for (i, path) in entry.paths.iter().enumerate() {
            let data = dir.join(DATA_DIR).join(i.to_string());
            if data.exists() {
                copy_tree(&data, &dest.join(path), &[])?;
            }
        }

        debug!(key = %key, paths = entry.paths.len(), "cache restored");
        Ok(Some(entry.paths))
    }

    async fn save(&self, key: &CacheKey, root: &Path, paths: &[PathBuf]) -> Result<(), JobflowError> {
        let dir = self.entry_dir(key);
        if let Some(parent) = dir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| JobflowError::cache(format!("Failed to create cache directory: {}", e)))?;
        }

        let staged = staging_path(&dir);
        tokio::fs::create_dir_all(staged.join(DATA_DIR))
            .await
            .map_err(|e| JobflowError::cache(format!("Failed to stage cache entry: {}", e)))?;

        for (i, path) in paths.iter().enumerate() {
            let src = root.join(path);
            if src.exists() {
                copy_tree(&src, &staged.join(DATA_DIR).join(i.to_string()), &[])?;
            }
        }

        let entry = CachedEntry {
            timestamp: SystemTime::now(),
            key: key.clone(),
            paths: paths.to_vec(),
        };

        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| JobflowError::cache(format!("Failed to serialize cache entry: {}", e)))?;

        tokio::fs::write(staged.join(ENTRY_FILE), json)
            .await
            .map_err(|e| JobflowError::cache(format!("Failed to write cache entry: {}", e)))?;

        swap_into_place(&staged, &dir)?;

        debug!(key = %key, paths = paths.len(), "cache saved");
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<CachedEntry>, JobflowError> {
        let mut entries = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(entries);
        }

        for prefix_dir in std::fs::read_dir(&self.cache_dir)
            .map_err(|e| JobflowError::cache(format!("Failed to read cache directory: {}", e)))?
        {
            let prefix_dir = prefix_dir
                .map_err(|e| JobflowError::cache(format!("Failed to read cache entry: {}", e)))?
                .path();

            if !prefix_dir.is_dir() {
                continue;
            }

            for entry_dir in std::fs::read_dir(&prefix_dir).map_err(|e| {
                JobflowError::cache(format!("Failed to read cache subdirectory: {}", e))
            })? {
                let entry_dir = entry_dir
                    .map_err(|e| JobflowError::cache(format!("Failed to read cache entry: {}", e)))?
                    .path();

                // Skip staging directories and unreadable entries
                let hidden = entry_dir
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with('.'));
                if hidden || !entry_dir.is_dir() {
                    continue;
                }

                if let Ok(Some(entry)) = Self::read_entry(&entry_dir) {
                    entries.push(entry);
                }
            }
        }

        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    async fn clear(&self) -> Result<(), JobflowError> {
        if self.cache_dir.exists() {
            tokio::fs::remove_dir_all(&self.cache_dir)
                .await
                .map_err(|e| JobflowError::cache(format!("Failed to clear cache: {}", e)))?;

            tokio::fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
                JobflowError::cache(format!("Failed to recreate cache directory: {}", e))
            })?;
        }

        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, JobflowError> {
        let entries = self.entries().await?;

        let mut stats = CacheStats {
            entries: entries.len(),
            size_bytes: 0,
            oldest_entry: entries.iter().map(|e| e.timestamp).min(),
            newest_entry: entries.iter().map(|e| e.timestamp).max(),
        };

        if self.cache_dir.exists() {
            stats.size_bytes = dir_size(&self.cache_dir)?;
        }

        Ok(stats)
    }
}
