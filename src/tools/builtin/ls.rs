// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Directory listing tool

use crate::tools::definition::{SchemaBuilder, ToolDefinition};
use crate::tools::ToolContext;

const ENTRY_LIMIT: usize = 500;

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "ls",
        "List the entries of a directory. Directories are shown with a trailing '/'.",
        SchemaBuilder::new()
            .string(
                "path",
                "Directory to list (default: working directory)",
                false,
            )
            .build(),
    )
}

pub async fn execute(context: &ToolContext, path: &str) -> Result<String, String> {
    let path = if path.trim().is_empty() { "." } else { path.trim() };
    let resolved = context.resolve_path(path);
    if !resolved.exists() {
        return Err(format!("Directory not found: {}", path));
    }
    if !resolved.is_dir() {
        return Err(format!("Not a directory: {} (use read to view it)", path));
    }

    let reader =
        std::fs::read_dir(&resolved).map_err(|e| format!("Failed to list {}: {}", path, e))?;
    let mut entries: Vec<String> = reader
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                format!("{}/", name)
            } else {
                name
            }
        })
        .collect();
    entries.sort();

    if entries.is_empty() {
        return Ok(format!("{} is empty", path));
    }

    let total = entries.len();
    let mut output = entries
        .into_iter()
        .take(ENTRY_LIMIT)
        .collect::<Vec<_>>()
        .join("\n");
    if total > ENTRY_LIMIT {
        output.push_str(&format!("\n... ({} more entries)", total - ENTRY_LIMIT));
    }
    Ok(output)
}
