// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Built-in tool implementations
//!
//! One module per tool in the vocabulary. Each exposes its JSON-schema
//! `definition()` and an async entry point returning `Ok(output)` or
//! `Err(reason)`; the executor turns either into a `ToolResult`.

pub mod file_delete;
pub mod file_edit;
pub mod file_read;
pub mod file_write;
pub mod git;
pub mod glob;
pub mod grep;
pub mod ls;
pub mod shell;

use std::path::PathBuf;

use crate::tools::FileDiff;

/// Outcome of a write, edit or delete that went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMutation {
    pub path: PathBuf,
    /// Path as shown to the model
    pub display_path: String,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub message: String,
    pub lines_changed: usize,
}

impl FileMutation {
    pub fn diff(&self) -> FileDiff {
        FileDiff {
            file_path: self.display_path.clone(),
            old_content: self.old_content.clone().unwrap_or_default(),
            new_content: self.new_content.clone().unwrap_or_default(),
        }
    }
}

/// Content of `path` before a mutation. `Ok(None)` means it does not exist.
pub(crate) fn capture_previous(path: &std::path::Path) -> Result<Option<String>, String> {
    if !path.exists() {
        return Ok(None);
    }
    if path.is_dir() {
        return Err(format!("Path is a directory: {}", path.display()));
    }
    std::fs::read_to_string(path)
        .map(Some)
        .map_err(|e| format!("Cannot read {} to record undo state: {}", path.display(), e))
}
