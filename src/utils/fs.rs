// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Filesystem helpers shared by workspaces, caches and artifacts

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::JobflowError;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A sibling path that is unique within this process
pub fn staging_path(target: &Path) -> PathBuf {
    let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = target
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "entry".to_string());
    target.with_file_name(format!(".{}.{}-{}.tmp", name, std::process::id(), n))
}

/// Copy a file or directory tree, skipping top-level names in `exclude`
pub fn copy_tree(src: &Path, dst: &Path, exclude: &[&str]) -> Result<u64, JobflowError> {
    let meta = std::fs::metadata(src).map_err(|e| JobflowError::read(src, e))?;

    if meta.is_file() {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JobflowError::write(parent, e))?;
        }
        return std::fs::copy(src, dst).map_err(|e| JobflowError::write(dst, e));
    }

    std::fs::create_dir_all(dst).map_err(|e| JobflowError::write(dst, e))?;
    let mut copied = 0;

    for entry in std::fs::read_dir(src).map_err(|e| JobflowError::read(src, e))? {
        let entry = entry.map_err(|e| JobflowError::read(src, e))?;
        let name = entry.file_name();

        if exclude.iter().any(|x| name.to_string_lossy() == *x) {
            continue;
        }

        let from = entry.path();
        let to = dst.join(&name);
        let file_type = entry.file_type().map_err(|e| JobflowError::read(&from, e))?;

        if file_type.is_dir() {
            copied += copy_tree(&from, &to, &[])?;
        } else if file_type.is_file() {
            copied += std::fs::copy(&from, &to).map_err(|e| JobflowError::write(&to, e))?;
        }
        // Symlinks and special files are not carried across workspaces
    }

    Ok(copied)
}

/// Copy `src` into a staging sibling of `dst`, then rename it into place.
///
/// Readers see either the previous `dst` or the complete new one.
pub fn replace_atomically(src: &Path, dst: &Path) -> Result<(), JobflowError> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| JobflowError::write(parent, e))?;
    }

    let staged = staging_path(dst);
    copy_tree(src, &staged, &[])?;
    swap_into_place(&staged, dst)
}

/// Rename an already-complete `staged` tree onto `dst`
pub fn swap_into_place(staged: &Path, dst: &Path) -> Result<(), JobflowError> {
    if dst.exists() {
        let retired = staging_path(dst);
        std::fs::rename(dst, &retired).map_err(|e| JobflowError::write(dst, e))?;
        std::fs::rename(staged, dst).map_err(|e| JobflowError::write(dst, e))?;
        remove_path(&retired)?;
    } else {
        std::fs::rename(staged, dst).map_err(|e| JobflowError::write(dst, e))?;
    }
    Ok(())
}

/// Remove a file or directory if it exists
pub fn remove_path(path: &Path) -> Result<(), JobflowError> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else if path.exists() {
        std::fs::remove_file(path)
    } else {
        return Ok(());
    };
    result.map_err(|e| JobflowError::write(path, e))
}

/// Calculate directory size recursively
pub fn dir_size(path: &Path) -> Result<u64, JobflowError> {
    if path.is_file() {
        return Ok(path.metadata().map(|m| m.len()).unwrap_or(0));
    }

    let mut size = 0;
    for entry in std::fs::read_dir(path).map_err(|e| JobflowError::read(path, e))? {
        let entry = entry.map_err(|e| JobflowError::read(path, e))?;
        let path = entry.path();
        if path.is_dir() {
            size += dir_size(&path)?;
        } else {
            size += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }

    Ok(size)
}

/// Resolve glob patterns relative to `base`, sorted for stable ordering
pub fn resolve_globs(patterns: &[String], base: &Path) -> Result<Vec<PathBuf>, JobflowError> {
    let mut files = Vec::new();

    for pattern in patterns {
        let full_pattern = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            base.join(pattern).to_string_lossy().to_string()
        };

        files.extend(glob::glob(&full_pattern)?.filter_map(Result::ok));
    }

    files.sort();
    files.dedup();
    Ok(files)
}
