// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File edit tool
//!
//! Edits existing files using exact string replacement. The old text must
//! occur exactly once; there is no fuzzy matching.

use super::FileMutation;
use crate::tools::changes::{Change, ChangeKind, SharedLedger};
use crate::tools::definition::{SchemaBuilder, ToolDefinition};
use crate::tools::ToolContext;

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "edit",
        "Edit an existing file by replacing an exact snippet with new text. old_text must match exactly once, including whitespace and indentation. Read the file first to see the exact content.",
        SchemaBuilder::new()
            .string("path", "The path to the file to edit", true)
            .string("old_text", "The exact text to find (must be unique in the file)", true)
            .string("new_text", "The replacement text", true)
            .build(),
    )
}

pub async fn execute(
    context: &ToolContext,
    ledger: &SharedLedger,
    path: &str,
    old_text: &str,
    new_text: &str,
) -> Result<FileMutation, String> {
    if path.trim().is_empty() {
        return Err("path is required".to_string());
    }
    if old_text.is_empty() {
        return Err("old_text must not be empty".to_string());
    }

    let resolved = context.resolve_path(path);
    let content = match std::fs::read_to_string(&resolved) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(format!("File not found: {}", path));
        }
        Err(e) => return Err(format!("Failed to read {}: {}", path, e)),
    };

    let occurrences = content.matches(old_text).count();
    if occurrences == 0 {
        return Err(format!(
            "Needle not found: old_text does not occur in {}. Read the file and copy the exact text.",
            path
        ));
    }
    if occurrences > 1 {
        return Err(format!(
            "old_text occurs {} times in {}. Include more surrounding context so it matches exactly once.",
            occurrences, path
        ));
    }

    let updated = content.replacen(old_text, new_text, 1);

    let change = Change::new(
        ChangeKind::Edit,
        resolved.clone(),
        Some(content.clone()),
        Some(updated.clone()),
        format!("edit {}", path),
    );
    ledger.lock().await.record(change, || {
        std::fs::write(&resolved, &updated).map_err(|e| format!("Failed to write {}: {}", path, e))
    })?;

    let lines_changed = old_text.lines().count().max(new_text.lines().count()).max(1);
    Ok(FileMutation {
        display_path: context.make_relative(&resolved),
        path: resolved,
        old_content: Some(content),
        new_content: Some(updated),
        message: format!("Edited {} ({} lines changed)", path, lines_changed),
        lines_changed,
    })
}
