// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool call extraction from a finished turn
//!
//! Three sources, tried in order and never mixed:
//! 1. `<tool:NAME>ARGS</tool>` tags in the assistant text
//! 2. native tool calls streamed by the provider
//! 3. fenced `bash`/`python` code blocks, for models that ignore both

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::llm::provider::ToolCallData;
use crate::tools::{InvocationSource, ScriptLanguage, ToolInvocation, ToolName, ToolRequest};

static TOOL_TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tool:([A-Za-z_][\w-]*)>(.*?)</tool>").unwrap());

static FENCED_BLOCK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(bash|sh|shell|python|py)[ \t]*\r?\n(.*?)```").unwrap()
});

const EDIT_OPEN: &str = "<<<";
const EDIT_SPLIT: &str = ">>>";

/// Extract every tool call from one turn.
///
/// `native_calls` are the assembled `tool_call` tokens of the same turn; they
/// are only used when the text carries no tags.
pub fn extract_invocations(text: &str, native_calls: &[ToolCallData]) -> Vec<ToolInvocation> {
    let tagged: Vec<ToolInvocation> = parse_tagged(text)
        .into_iter()
        .map(|request| ToolInvocation::new(generate_id(), request, InvocationSource::Tagged))
        .collect();
    if !tagged.is_empty() {
        if !native_calls.is_empty() {
            tracing::debug!(
                target: "quill.tools",
                ignored = native_calls.len(),
                "Tagged tool calls present, ignoring native calls"
            );
        }
        return tagged;
    }

    if !native_calls.is_empty() {
        return native_calls
            .iter()
            .map(|call| {
                let id = if call.id.is_empty() {
                    generate_id()
                } else {
                    call.id.clone()
                };
                ToolInvocation::new(id, request_from_native(call), InvocationSource::Native)
            })
            .collect();
    }

    parse_fenced(text)
        .into_iter()
        .map(|request| ToolInvocation::new(generate_id(), request, InvocationSource::Fenced))
        .collect()
}

fn generate_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// All `<tool:NAME>ARGS</tool>` spans, in text order
pub fn parse_tagged(text: &str) -> Vec<ToolRequest> {
    TOOL_TAG_PATTERN
        .captures_iter(text)
        .map(|caps| {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let args = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            request_from_tag(name, args)
        })
        .collect()
}

/// Decode one tag body according to the tool's argument grammar.
pub fn request_from_tag(name: &str, args: &str) -> ToolRequest {
    let tool = ToolName::parse(name);
    match &tool {
        ToolName::Unknown(name) => ToolRequest::Unknown { name: name.clone() },
        ToolName::Write => parse_write_args(args),
        ToolName::Edit => parse_edit_args(args),
        ToolName::Grep | ToolName::Glob => {
            let mut lines = args.trim().lines();
            let pattern = lines.next().unwrap_or_default().trim().to_string();
            let path = lines
                .next()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty());
            if pattern.is_empty() {
                return invalid(tool.clone(), "a search pattern is required on the first line");
            }
            if tool == ToolName::Grep {
                ToolRequest::Grep { pattern, path }
            } else {
                ToolRequest::Glob { pattern, path }
            }
        }
        ToolName::Ls => {
            let path = args.trim();
            ToolRequest::Ls {
                path: if path.is_empty() { "." } else { path }.to_string(),
            }
        }
        ToolName::Read | ToolName::Delete | ToolName::Bash | ToolName::Git => {
            let value = args.trim();
            if value.is_empty() {
                return invalid(tool.clone(), "arguments are required");
            }
            let value = value.to_string();
            match tool {
                ToolName::Read => ToolRequest::Read { path: value },
                ToolName::Delete => ToolRequest::Delete { path: value },
                ToolName::Bash => ToolRequest::Bash { command: value },
                _ => ToolRequest::Git { args: value },
            }
        }
    }
}

fn invalid(tool: ToolName, reason: impl Into<String>) -> ToolRequest {
    ToolRequest::Invalid {
        tool,
        reason: reason.into(),
    }
}

/// `path\ncontent...`
fn parse_write_args(args: &str) -> ToolRequest {
    let args = args.strip_prefix('\n').unwrap_or(args);
    let (path, content) = match args.split_once('\n') {
        Some((path, content)) => (path.trim(), content),
        None => (args.trim(), ""),
    };
    if path.is_empty() {
        return invalid(ToolName::Write, "the file path must be on the first line");
    }
    ToolRequest::Write {
        path: path.to_string(),
        content: content.to_string(),
    }
}

/// `path\n<<<\nold\n>>>\nnew`
fn parse_edit_args(args: &str) -> ToolRequest {
    let args = args.strip_prefix('\n').unwrap_or(args);
    let Some((path, body)) = args.split_once('\n') else {
        return invalid(
            ToolName::Edit,
            "expected: path, then <<<, the old text, >>>, and the new text",
        );
    };
    let path = path.trim();
    if path.is_empty() {
        return invalid(ToolName::Edit, "the file path must be on the first line");
    }

    let Some(body) = body.strip_prefix(EDIT_OPEN) else {
        return invalid(ToolName::Edit, "the line after the path must be <<<");
    };
    let body = body.strip_prefix('\n').unwrap_or(body);

    let split = format!("\n{}", EDIT_SPLIT);
    let (old_text, new_text) = match body.find(&split) {
        Some(idx) => (&body[..idx], &body[idx + split.len()..]),
        None => match body.strip_prefix(EDIT_SPLIT) {
            Some(rest) => ("", rest),
            None => return invalid(ToolName::Edit, "missing >>> between old and new text"),
        },
    };
    let new_text = new_text.strip_prefix('\n').unwrap_or(new_text);
    let new_text = new_text.strip_suffix('\n').unwrap_or(new_text);

    if old_text.is_empty() {
        return invalid(ToolName::Edit, "the old text between <<< and >>> is empty");
    }

    ToolRequest::Edit {
        path: path.to_string(),
        old_text: old_text.to_string(),
        new_text: new_text.to_string(),
    }
}

/// Decode a provider-native call. Names go through the alias table and
/// argument keys accept the spellings models commonly use.
pub fn request_from_native(call: &ToolCallData) -> ToolRequest {
    let tool = ToolName::from_alias(&call.name);
    if let ToolName::Unknown(name) = &tool {
        return ToolRequest::Unknown { name: name.clone() };
    }

    let raw = call.arguments.trim();
    let input: Value = if raw.is_empty() {
        Value::Object(Default::default())
    } else {
        match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => return invalid(tool.clone(), format!("arguments are not valid JSON: {}", e)),
        }
    };

    let field = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|k| match input.get(*k) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    };
    let path = || field(&["path", "file_path", "file", "filename", "filepath"]);
    let required = |value: Option<String>, name: &str| -> Result<String, ToolRequest> {
        match value {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(invalid(tool.clone(), format!("{} is required", name))),
        }
    };

    let request = match &tool {
        ToolName::Read => required(path(), "path").map(|path| ToolRequest::Read { path }),
        ToolName::Delete => required(path(), "path").map(|path| ToolRequest::Delete { path }),
        ToolName::Write => required(path(), "path").map(|path| ToolRequest::Write {
            path,
            content: field(&["content", "contents", "text", "data"]).unwrap_or_default(),
        }),
        ToolName::Edit => required(path(), "path").and_then(|path| {
            let old_text = required(
                field(&["old_text", "old_string", "old", "search", "find"]),
                "old_text",
            )?;
            Ok(ToolRequest::Edit {
                path,
                old_text,
                new_text: field(&["new_text", "new_string", "new", "replace", "replacement"])
                    .unwrap_or_default(),
            })
        }),
        ToolName::Bash => required(field(&["command", "cmd", "script", "code"]), "command")
            .map(|command| ToolRequest::Bash { command }),
        ToolName::Grep => required(field(&["pattern", "query", "regex", "search"]), "pattern")
            .map(|pattern| ToolRequest::Grep {
                pattern,
                path: path().or_else(|| field(&["dir", "directory"])),
            }),
        ToolName::Glob => required(field(&["pattern", "glob", "query"]), "pattern").map(|pattern| {
            ToolRequest::Glob {
                pattern,
                path: path().or_else(|| field(&["dir", "directory", "base"])),
            }
        }),
        ToolName::Ls => Ok(ToolRequest::Ls {
            path: path()
                .or_else(|| field(&["dir", "directory"]))
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| ".".to_string()),
        }),
        ToolName::Git => required(field(&["args", "arguments", "command", "cmd"]), "args")
            .map(|args| ToolRequest::Git { args }),
        ToolName::Unknown(name) => Ok(ToolRequest::Unknown { name: name.clone() }),
    };
    request.unwrap_or_else(|invalid| invalid)
}

/// Fenced shell and python blocks, in text order
pub fn parse_fenced(text: &str) -> Vec<ToolRequest> {
    FENCED_BLOCK_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let lang = caps.get(1)?.as_str();
            let code = caps.get(2)?.as_str().trim();
            if code.is_empty() {
                return None;
            }
            Some(match lang {
                "python" | "py" => ToolRequest::Script {
                    language: ScriptLanguage::Python,
                    code: code.to_string(),
                },
                _ => ToolRequest::Bash {
                    command: code.to_string(),
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(name: &str, arguments: &str) -> ToolCallData {
        ToolCallData::new("call_1", name, arguments)
    }

    #[test]
    fn test_tagged_simple_tools() {
        let text = "Let me look.\n<tool:read>src/main.rs</tool>\n<tool:bash> ls -la </tool>";
        let requests = parse_tagged(text);
        assert_eq!(
            requests,
            vec![
                ToolRequest::Read {
                    path: "src/main.rs".to_string()
                },
                ToolRequest::Bash {
                    command: "ls -la".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_tagged_write_path_then_content() {
        let requests = parse_tagged("<tool:write>notes.txt\nline one\nline two\n</tool>");
        assert_eq!(
            requests,
            vec![ToolRequest::Write {
                path: "notes.txt".to_string(),
                content: "line one\nline two\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_tagged_write_without_path_is_invalid() {
        let requests = parse_tagged("<tool:write>\n\nbody</tool>");
        assert!(matches!(
            &requests[0],
            ToolRequest::Invalid { tool: ToolName::Write, .. }
        ));
    }

    #[test]
    fn test_tagged_edit_grammar() {
        let text = "<tool:edit>src/lib.rs\n<<<\nfn old() {}\n>>>\nfn new() {}\n</tool>";
        assert_eq!(
            parse_tagged(text),
            vec![ToolRequest::Edit {
                path: "src/lib.rs".to_string(),
                old_text: "fn old() {}".to_string(),
                new_text: "fn new() {}".to_string(),
            }]
        );
    }

    #[test]
    fn test_tagged_edit_multiline_and_empty_new() {
        let text = "<tool:edit>\na.py\n<<<\nx = 1\ny = 2\n>>>\n</tool>";
        assert_eq!(
            parse_tagged(text),
            vec![ToolRequest::Edit {
                path: "a.py".to_string(),
                old_text: "x = 1\ny = 2".to_string(),
                new_text: String::new(),
            }]
        );
    }

    #[test]
    fn test_tagged_edit_missing_markers_is_invalid() {
        let requests = parse_tagged("<tool:edit>a.rs\nold\nnew</tool>");
        assert!(matches!(
            &requests[0],
            ToolRequest::Invalid { tool: ToolName::Edit, .. }
        ));
    }

    #[test]
    fn test_tagged_grep_optional_path() {
        assert_eq!(
            parse_tagged("<tool:grep>fn main\nsrc</tool><tool:glob>*.rs</tool>"),
            vec![
                ToolRequest::Grep {
                    pattern: "fn main".to_string(),
                    path: Some("src".to_string()),
                },
                ToolRequest::Glob {
                    pattern: "*.rs".to_string(),
                    path: None,
                },
            ]
        );
    }

    #[test]
    fn test_tagged_ls_defaults_to_current_dir() {
        assert_eq!(
            parse_tagged("<tool:ls></tool>"),
            vec![ToolRequest::Ls {
                path: ".".to_string()
            }]
        );
    }

    #[test]
    fn test_tagged_unknown_tool() {
        assert_eq!(
            parse_tagged("<tool:teleport>mars</tool>"),
            vec![ToolRequest::Unknown {
                name: "teleport".to_string()
            }]
        );
    }

    #[test]
    fn test_tags_win_over_native_calls() {
        let invocations = extract_invocations(
            "<tool:ls>.</tool>",
            &[native("bash", r#"{"command":"pwd"}"#)],
        );
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].source, InvocationSource::Tagged);
        assert_eq!(invocations[0].tool(), ToolName::Ls);
    }

    #[test]
    fn test_native_calls_used_without_tags() {
        let invocations = extract_invocations(
            "Running it now.",
            &[native("shell", r#"{"cmd":"cargo test"}"#)],
        );
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].id, "call_1");
        assert_eq!(invocations[0].source, InvocationSource::Native);
        assert_eq!(
            invocations[0].request,
            ToolRequest::Bash {
                command: "cargo test".to_string()
            }
        );
    }

    #[test]
    fn test_native_key_aliases() {
        let request = request_from_native(&native(
            "str_replace",
            r#"{"file_path":"a.rs","old_string":"x","new_string":"y"}"#,
        ));
        assert_eq!(
            request,
            ToolRequest::Edit {
                path: "a.rs".to_string(),
                old_text: "x".to_string(),
                new_text: "y".to_string(),
            }
        );
    }

    #[test]
    fn test_native_empty_arguments() {
        assert_eq!(
            request_from_native(&native("ls", "")),
            ToolRequest::Ls {
                path: ".".to_string()
            }
        );
        assert!(matches!(
            request_from_native(&native("read", "")),
            ToolRequest::Invalid { tool: ToolName::Read, .. }
        ));
    }

    #[test]
    fn test_native_bad_json_is_invalid() {
        assert!(matches!(
            request_from_native(&native("bash", "{not json")),
            ToolRequest::Invalid { tool: ToolName::Bash, .. }
        ));
    }

    #[test]
    fn test_native_git_array_args() {
        assert_eq!(
            request_from_native(&native("git", r#"{"args":["log","-n","3"]}"#)),
            ToolRequest::Git {
                args: "log -n 3".to_string()
            }
        );
    }

    #[test]
    fn test_fenced_fallback() {
        let text = "Try this:\n```bash\necho hi\n```\nand\n```python\nprint(2)\n```\n```rust\nfn x() {}\n```";
        let invocations = extract_invocations(text, &[]);
        assert_eq!(invocations.len(), 2);
        assert!(invocations.iter().all(|i| i.source == InvocationSource::Fenced));
        assert_eq!(
            invocations[0].request,
            ToolRequest::Bash {
                command: "echo hi".to_string()
            }
        );
        assert_eq!(
            invocations[1].request,
            ToolRequest::Script {
                language: ScriptLanguage::Python,
                code: "print(2)".to_string()
            }
        );
    }

    #[test]
    fn test_plain_text_has_no_invocations() {
        assert!(extract_invocations("All done, the tests pass.", &[]).is_empty());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let invocations = extract_invocations("<tool:ls>.</tool><tool:ls>src</tool>", &[]);
        assert_ne!(invocations[0].id, invocations[1].id);
    }
}
