// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File delete tool

use super::{capture_previous, FileMutation};
use crate::tools::changes::{Change, ChangeKind, SharedLedger};
use crate::tools::definition::{SchemaBuilder, ToolDefinition};
use crate::tools::ToolContext;

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "delete",
        "Delete a file. Directories are not removed.",
        SchemaBuilder::new()
            .string("path", "The path to the file to delete", true)
            .build(),
    )
}

pub async fn execute(
    context: &ToolContext,
    ledger: &SharedLedger,
    path: &str,
) -> Result<FileMutation, String> {
    if path.trim().is_empty() {
        return Err("path is required".to_string());
    }
    let resolved = context.resolve_path(path);
    let Some(previous) = capture_previous(&resolved)? else {
        return Err(format!("File not found: {}", path));
    };

    let change = Change::new(
        ChangeKind::Delete,
        resolved.clone(),
        Some(previous.clone()),
        None,
        format!("delete {}", path),
    );
    ledger.lock().await.record(change, || {
        std::fs::remove_file(&resolved).map_err(|e| format!("Failed to delete {}: {}", path, e))
    })?;

    let lines = previous.lines().count();
    Ok(FileMutation {
        display_path: context.make_relative(&resolved),
        path: resolved,
        old_content: Some(previous),
        new_content: None,
        message: format!("Deleted {} ({} lines)", path, lines),
        lines_changed: lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::changes::shared_ledger;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_delete_records_content_then_removes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone.txt");
        std::fs::write(&path, "a\nb\n").unwrap();
        let context = ToolContext::new(temp_dir.path().to_path_buf());
        let ledger = shared_ledger(10);

        let mutation = execute(&context, &ledger, "gone.txt").await.unwrap();
        assert!(!path.exists());
        assert_eq!(mutation.lines_changed, 2);
        let ledger = ledger.lock().await;
        let entry = ledger.last().unwrap();
        assert_eq!(entry.kind, ChangeKind::Delete);
        assert_eq!(entry.previous_content.as_deref(), Some("a\nb\n"));
        assert!(entry.new_content.is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let context = ToolContext::new(temp_dir.path().to_path_buf());
        let ledger = shared_ledger(10);
        let err = execute(&context, &ledger, "missing").await.unwrap_err();
        assert!(err.contains("File not found"));
        assert!(ledger.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("d")).unwrap();
        let context = ToolContext::new(temp_dir.path().to_path_buf());
        let ledger = shared_ledger(10);
        assert!(execute(&context, &ledger, "d").await.is_err());
    }
}
