// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File write tool
//!
//! Creates or overwrites a file. The previous content is recorded in the
//! undo ledger before anything touches the disk.

use super::{capture_previous, FileMutation};
use crate::tools::changes::{Change, ChangeKind, SharedLedger};
use crate::tools::definition::{SchemaBuilder, ToolDefinition};
use crate::tools::ToolContext;

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "write",
        "Create a new file or completely overwrite an existing file. Parent directories are created as needed.",
        SchemaBuilder::new()
            .string("path", "The path to the file to write", true)
            .string("content", "The full content to write", true)
            .build(),
    )
}

pub async fn execute(
    context: &ToolContext,
    ledger: &SharedLedger,
    path: &str,
    content: &str,
) -> Result<FileMutation, String> {
    if path.trim().is_empty() {
        return Err("path is required".to_string());
    }
    let resolved = context.resolve_path(path);
    let previous = capture_previous(&resolved)?;
    let created = previous.is_none();

    let change = Change::new(
        ChangeKind::Write,
        resolved.clone(),
        previous.clone(),
        Some(content.to_string()),
        if created {
            format!("create {}", path)
        } else {
            format!("overwrite {}", path)
        },
    );
    ledger.lock().await.record(change, || {
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directory {}: {}", parent.display(), e))?;
        }
        std::fs::write(&resolved, content).map_err(|e| format!("Failed to write {}: {}", path, e))
    })?;

    let lines = content.lines().count();
    let message = if created {
        format!("Created {} ({} lines)", path, lines)
    } else {
        format!("Overwrote {} ({} lines)", path, lines)
    };

    Ok(FileMutation {
        display_path: context.make_relative(&resolved),
        path: resolved,
        old_content: previous,
        new_content: Some(content.to_string()),
        message,
        lines_changed: lines,
    })
}
