// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Grep/search tool
//!
//! Searches for a regex in files under a directory.

use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::tools::definition::{SchemaBuilder, ToolDefinition};
use crate::tools::{truncate_output, ToolContext};

const MATCH_LIMIT: usize = 100;
const MAX_OUTPUT_BYTES: usize = 30_000;

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "grep",
        "Search for a regex pattern in files. Returns matching lines with file paths and line numbers.",
        SchemaBuilder::new()
            .string("pattern", "Regex pattern to search for", true)
            .string(
                "path",
                "File or directory to search in (default: working directory)",
                false,
            )
            .build(),
    )
}

#[derive(Debug)]
struct SearchMatch {
    path: PathBuf,
    line_number: usize,
    line: String,
}

pub async fn execute(
    context: &ToolContext,
    pattern: &str,
    path: Option<&str>,
) -> Result<String, String> {
    if pattern.is_empty() {
        return Err("pattern is required".to_string());
    }
    let regex = Regex::new(pattern).map_err(|e| format!("Invalid regex pattern: {}", e))?;

    let search_path = match path {
        Some(p) if !p.trim().is_empty() => context.resolve_path(p.trim()),
        _ => context.working_directory.clone(),
    };
    if !search_path.exists() {
        return Err(format!("Path not found: {}", search_path.display()));
    }

    let mut matches: Vec<SearchMatch> = Vec::new();
    let mut files_searched = 0;
    let mut files_with_matches = 0;

    if search_path.is_file() {
        files_searched = 1;
        let found = search_file(&search_path, &regex, MATCH_LIMIT);
        if !found.is_empty() {
            files_with_matches = 1;
            matches.extend(found);
        }
    } else {
        for entry in WalkDir::new(&search_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden_or_ignored(e.file_name()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let file = entry.path();
            if is_likely_binary(file) {
                continue;
            }
            files_searched += 1;
            let found = search_file(file, &regex, MATCH_LIMIT - matches.len());
            if !found.is_empty() {
                files_with_matches += 1;
                matches.extend(found);
            }
            if matches.len() >= MATCH_LIMIT {
                break;
            }
        }
    }

    let mut output = format!(
        "Found {} matches in {} files (searched {} files):\n\n",
        matches.len(),
        files_with_matches,
        files_searched
    );

    let mut current_file: Option<String> = None;
    for m in &matches {
        let file_display = context.make_relative(&m.path);
        if current_file.as_ref() != Some(&file_display) {
            if current_file.is_some() {
                output.push('\n');
            }
            output.push_str(&format!("{}:\n", file_display));
            current_file = Some(file_display);
        }
        output.push_str(&format!("  {:>5}: {}\n", m.line_number, m.line.trim()));
    }

    if matches.len() >= MATCH_LIMIT {
        output.push_str(&format!("\n(limited to {} matches)\n", MATCH_LIMIT));
    }

    Ok(truncate_output(&output, MAX_OUTPUT_BYTES))
}

fn search_file(path: &Path, regex: &Regex, limit: usize) -> Vec<SearchMatch> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| regex.is_match(line))
        .take(limit)
        .map(|(i, line)| SearchMatch {
            path: path.to_path_buf(),
            line_number: i + 1,
            line: line.to_string(),
        })
        .collect()
}

fn is_likely_binary(path: &Path) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy().to_lowercase();
    matches!(
        ext.as_str(),
        "png"
            | "jpg"
            | "jpeg"
            | "gif"
            | "ico"
            | "woff"
            | "woff2"
            | "ttf"
            | "zip"
            | "tar"
            | "gz"
            | "7z"
            | "exe"
            | "dll"
            | "so"
            | "dylib"
            | "pdf"
            | "o"
            | "a"
            | "rlib"
            | "wasm"
            | "class"
            | "pyc"
            | "db"
            | "sqlite"
    )
}

fn is_hidden_or_ignored(name: &std::ffi::OsStr) -> bool {
    let name = name.to_string_lossy();
    name.starts_with('.')
        || matches!(
            name.as_ref(),
            "node_modules" | "target" | "__pycache__" | "venv" | "dist" | "build" | "vendor"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, ToolContext) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("target")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() {\n    hello();\n}\n").unwrap();
        std::fs::write(root.join("src/lib.rs"), "pub fn hello() {}\n").unwrap();
        std::fs::write(root.join("target/out.rs"), "fn hello() {}\n").unwrap();
        std::fs::write(root.join(".git/config"), "hello\n").unwrap();
        let context = ToolContext::new(root.to_path_buf());
        (temp_dir, context)
    }

    #[tokio::test]
    async fn test_grep_finds_matches_with_line_numbers() {
        let (_temp_dir, context) = fixture();
        let output = execute(&context, "hello", None).await.unwrap();
        assert!(output.starts_with("Found 2 matches in 2 files"));
        assert!(output.contains("src/lib.rs:"));
        assert!(output.contains("    2: hello();"));
    }

    #[tokio::test]
    async fn test_grep_skips_ignored_directories() {
        let (_temp_dir, context) = fixture();
        let output = execute(&context, "hello", None).await.unwrap();
        assert!(!output.contains("target/"));
        assert!(!output.contains(".git"));
    }

    #[tokio::test]
    async fn test_grep_single_file_path() {
        let (_temp_dir, context) = fixture();
        let output = execute(&context, "fn", Some("src/lib.rs")).await.unwrap();
        assert!(output.starts_with("Found 1 matches in 1 files (searched 1 files)"));
    }

    #[tokio::test]
    async fn test_grep_invalid_regex() {
        let (_temp_dir, context) = fixture();
        let err = execute(&context, "(unclosed", None).await.unwrap_err();
        assert!(err.contains("Invalid regex"));
    }

    #[test]
    fn test_is_likely_binary() {
        assert!(is_likely_binary(Path::new("logo.PNG")));
        assert!(!is_likely_binary(Path::new("main.rs")));
        assert!(!is_likely_binary(Path::new("Makefile")));
    }
}
