// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! Utility modules
//!
//! Terminal colors for the CLI and filesystem helpers shared by
//! workspaces, caches and artifacts.

pub mod colors;
pub mod fs;

pub use colors::*;
