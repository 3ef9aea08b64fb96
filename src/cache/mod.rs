// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Dependency cache
//!
//! Maps a content-derived key to a set of directories so that jobs can skip
//! redundant recomputation across runs. A miss is never an error.

mod filesystem;
mod hash;

pub use filesystem::FilesystemCache;
pub use hash::{CacheKey, ContentHasher, MaterializedManifest};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errors::JobflowError;

/// Trait for cache implementations
#[async_trait]
pub trait Cache: Send + Sync {
    /// Restore the entry for `key` under `dest`, returning the saved paths.
    /// `Ok(None)` on a miss.
    async fn restore(&self, key: &CacheKey, dest: &Path)
        -> Result<Option<Vec<PathBuf>>, JobflowError>;

    /// Save `paths` (relative to `root`, or absolute) under `key`,
    /// replacing any previous entry
    async fn save(&self, key: &CacheKey, root: &Path, paths: &[PathBuf])
        -> Result<(), JobflowError>;

    /// List stored entries
    async fn entries(&self) -> Result<Vec<CachedEntry>, JobflowError>;

    /// Clear all cached entries
    async fn clear(&self) -> Result<(), JobflowError>;

    /// Get cache statistics
    async fn stats(&self) -> Result<CacheStats, JobflowError>;
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cached entries
    pub entries: usize,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Oldest entry timestamp
    pub oldest_entry: Option<SystemTime>,
    /// Newest entry timestamp
    pub newest_entry: Option<SystemTime>,
}

impl CacheStats {
    /// Format size for display
    pub fn formatted_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if self.size_bytes >= GB {
            format!("{:.2} GB", self.size_bytes as f64 / GB as f64)
        } else if self.size_bytes >= MB {
            format!("{:.2} MB", self.size_bytes as f64 / MB as f64)
        } else if self.size_bytes >= KB {
            format!("{:.2} KB", self.size_bytes as f64 / KB as f64)
        } else {
            format!("{} bytes", self.size_bytes)
        }
    }
}

/// Metadata stored beside each entry's data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    /// When the entry was saved
    pub timestamp: SystemTime,
    /// Cache key
    pub key: CacheKey,
    /// Saved paths, in save order
    pub paths: Vec<PathBuf>,
}
