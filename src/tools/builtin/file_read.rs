// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File read tool

use crate::tools::definition::{SchemaBuilder, ToolDefinition};
use crate::tools::{truncate_output, ToolContext};

const MAX_READ_BYTES: usize = 30_000;

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "read",
        "Read the contents of a file. Paths are relative to the working directory.",
        SchemaBuilder::new()
            .string("path", "The path to the file to read", true)
            .build(),
    )
}

pub async fn execute(context: &ToolContext, path: &str) -> Result<String, String> {
    if path.trim().is_empty() {
        return Err("path is required".to_string());
    }
    let resolved = context.resolve_path(path);

    if resolved.is_dir() {
        return Err(format!(
            "Path is a directory, not a file: {} (use ls to list it)",
            path
        ));
    }

    match std::fs::read_to_string(&resolved) {
        Ok(content) => Ok(truncate_output(&content, MAX_READ_BYTES)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("File not found: {}", path))
        }
        Err(e) => Err(format!("Failed to read {}: {}", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), "Line 1\nLine 2").unwrap();
        let context = ToolContext::new(temp_dir.path().to_path_buf());

        let content = execute(&context, "a.txt").await.unwrap();
        assert_eq!(content, "Line 1\nLine 2");
    }

    #[tokio::test]
    async fn test_read_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let context = ToolContext::new(temp_dir.path().to_path_buf());
        let err = execute(&context, "missing.txt").await.unwrap_err();
        assert!(err.contains("File not found"));
    }

    #[tokio::test]
    async fn test_read_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let context = ToolContext::new(temp_dir.path().to_path_buf());
        let err = execute(&context, ".").await.unwrap_err();
        assert!(err.contains("directory"));
    }
}
