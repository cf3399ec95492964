// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Glob pattern matching tool

use glob::glob as glob_match;

use crate::tools::definition::{SchemaBuilder, ToolDefinition};
use crate::tools::ToolContext;

const RESULT_LIMIT: usize = 100;

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "glob",
        "Find files matching a glob pattern (e.g., '**/*.rs', 'src/**/*.ts'). Returns matching file paths.",
        SchemaBuilder::new()
            .string("pattern", "Glob pattern to match", true)
            .string(
                "path",
                "Base directory to search in (default: working directory)",
                false,
            )
            .build(),
    )
}

pub async fn execute(
    context: &ToolContext,
    pattern: &str,
    path: Option<&str>,
) -> Result<String, String> {
    if pattern.trim().is_empty() {
        return Err("pattern is required".to_string());
    }
    let base_path = match path {
        Some(p) if !p.trim().is_empty() => context.resolve_path(p.trim()),
        _ => context.working_directory.clone(),
    };

    let full_pattern = base_path.join(pattern.trim());
    let entries = glob_match(&full_pattern.to_string_lossy())
        .map_err(|e| format!("Invalid glob pattern: {}", e))?;

    let mut results = Vec::new();
    let mut errors = 0;
    for entry in entries {
        match entry {
            Ok(found) => results.push(context.make_relative(&found)),
            Err(_) => errors += 1,
        }
    }
    results.sort();
    let total = results.len();
    results.truncate(RESULT_LIMIT);

    let mut output = format!("Found {} files matching '{}'", total, pattern.trim());
    if total > RESULT_LIMIT {
        output.push_str(&format!(" (showing first {})", RESULT_LIMIT));
    }
    if errors > 0 {
        output.push_str(&format!(" ({} paths had errors)", errors));
    }
    output.push_str(":\n\n");
    for found in &results {
        output.push_str(found);
        output.push('\n');
    }
    Ok(output)
}
