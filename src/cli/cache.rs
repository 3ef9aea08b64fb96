// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Cache command - manage the dependency cache

use colored::Colorize;
use miette::Result;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::CacheAction;
use crate::cache::{Cache, FilesystemCache};
use crate::pipeline::{CacheConfig, Pipeline};
use crate::utils::print_header;

/// Cache directory from the pipeline, or the default when there is none
fn cache_dir(pipeline_path: &Path, working_dir: &Path) -> Result<PathBuf> {
    let config = if pipeline_path.exists() {
        Pipeline::from_file(pipeline_path)?.cache
    } else {
        CacheConfig::default()
    };
    Ok(working_dir.join(config.directory))
}

/// Run the cache command
pub async fn run(pipeline_path: PathBuf, action: CacheAction, _verbose: bool) -> Result<()> {
    let working_dir = std::env::current_dir()
        .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;

    let cache_dir = cache_dir(&pipeline_path, &working_dir)?;
    let cache = FilesystemCache::new(cache_dir.clone())?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats().await?;

            print_header("Cache Statistics");
            println!("  Location: {}", cache_dir.display());
            println!("  Entries:  {}", stats.entries);
            println!("  Size:     {}", stats.formatted_size());

            if let Some(oldest) = stats.oldest_entry {
                if let Ok(duration) = oldest.elapsed() {
                    println!("  Oldest:   {} ago", format_duration(duration));
                }
            }

            if let Some(newest) = stats.newest_entry {
                if let Ok(duration) = newest.elapsed() {
                    println!("  Newest:   {} ago", format_duration(duration));
                }
            }

            Ok(())
        }

        CacheAction::Clear { yes } => {
            let stats = cache.stats().await?;

            if stats.entries == 0 {
                println!("{}", "Cache is already empty.".dimmed());
                return Ok(());
            }

            if !yes {
                print!(
                    "Clear {} cache entries ({})? [y/N] ",
                    stats.entries,
                    stats.formatted_size()
                );
                io::stdout().flush().ok();

                let mut input = String::new();
                io::stdin().read_line(&mut input).ok();

                if !input.trim().eq_ignore_ascii_case("y") {
                    println!("{}", "Cancelled.".dimmed());
                    return Ok(());
                }
            }

            cache.clear().await?;
            println!("{}", "Cache cleared.".green());

            Ok(())
        }

        CacheAction::List => {
            let entries = cache.entries().await?;

            print_header("Cached Entries");

            if entries.is_empty() {
                println!("{}", "  No cached entries.".dimmed());
                return Ok(());
            }

            for entry in entries.iter().rev() {
                let age = entry
                    .timestamp
                    .elapsed()
                    .map(|d| format!("{} ago", format_duration(d)))
                    .unwrap_or_else(|_| "just now".to_string());
                let paths: Vec<String> =
                    entry.paths.iter().map(|p| p.display().to_string()).collect();

                println!(
                    "  {} {} {}",
                    entry.key.as_str().cyan(),
                    paths.join(", "),
                    format!("({})", age).dimmed()
                );
            }

            Ok(())
        }
    }
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}
