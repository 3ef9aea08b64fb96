// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Content hashing for cache keys
//!
//! Uses BLAKE3 for fast, secure content hashing. A [`CacheKey`] can only be
//! derived from a [`MaterializedManifest`], and a manifest is only
//! materialized once every pattern matches an existing file.

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::JobflowError;
use crate::utils::fs::resolve_globs;

/// Manifest files proven to exist, in stable order
#[derive(Debug, Clone)]
pub struct MaterializedManifest {
    base: PathBuf,
    files: Vec<PathBuf>,
}

impl MaterializedManifest {
    /// Locate the manifest files; every pattern must match at least one file
    pub fn locate(patterns: &[String], base: &Path) -> Result<Self, JobflowError> {
        let mut files = Vec::new();

        for pattern in patterns {
            let matches = resolve_globs(std::slice::from_ref(pattern), base)?;
            let matches: Vec<PathBuf> = matches.into_iter().filter(|p| p.is_file()).collect();
            if matches.is_empty() {
                return Err(JobflowError::ManifestMissing {
                    pattern: pattern.clone(),
                });
            }
            files.extend(matches);
        }

        files.sort();
        files.dedup();

        Ok(Self {
            base: base.to_path_buf(),
            files,
        })
    }
}

/// Cache key: `<prefix>-<hash>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key from the content of a materialized manifest
    pub fn derive(prefix: &str, manifest: &MaterializedManifest) -> Result<Self, JobflowError> {
        let mut hasher = ContentHasher::new();

        for file in &manifest.files {
            // Relative path keeps keys stable across workspaces
            let rel = file.strip_prefix(&manifest.base).unwrap_or(file);
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update(&[0]);
            hasher.hash_file(file)?;
        }

        Ok(Self(format!("{}-{}", prefix, hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental BLAKE3 hasher
pub struct ContentHasher {
    hasher: Hasher,
}

impl ContentHasher {
    /// Create a new content hasher
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Hash a single file's contents
    pub fn hash_file(&mut self, path: &Path) -> Result<(), JobflowError> {
        let content = std::fs::read(path).map_err(|e| JobflowError::read(path, e))?;
        self.hasher.update(&content);
        Ok(())
    }

    /// Hash arbitrary bytes
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finalize and get the hash
    pub fn finalize(self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}
