// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Google Gemini `streamGenerateContent` dialect

use serde::Deserialize;
use serde_json::json;

use super::common::provider_error;
use super::WireAdapter;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::llm::message::{Message, Role};
use crate::llm::provider::{StreamToken, ToolCallData, Usage};
use crate::llm::sse::SseEvent;
use crate::tools::definition::ToolDefinition;

/// SSE streaming endpoint for `model`. The API key is appended by the
/// client as a `key` query parameter.
pub fn endpoint_url(base_url: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
        base_url.trim_end_matches('/'),
        model
    )
}

/// Build a `streamGenerateContent` request body
pub fn build_request_body(
    config: &ClientConfig,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> serde_json::Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let contents: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::Assistant => "model",
                _ => "user",
            };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "maxOutputTokens": config.max_tokens,
            "temperature": config.temperature,
        },
    });

    if !system.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
    }

    if config.tools_enabled && !tools.is_empty() {
        let declarations: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    body
}

/// Adapter for the Gemini stream grammar
///
/// Function calls arrive whole, so nothing is accumulated except usage.
#[derive(Debug, Default)]
pub struct GeminiAdapter {
    usage: Option<Usage>,
    finished: bool,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WireAdapter for GeminiAdapter {
    fn process(&mut self, event: &SseEvent) -> Result<Vec<StreamToken>> {
        if self.finished {
            return Ok(Vec::new());
        }

        let value: serde_json::Value = match serde_json::from_str(&event.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(target: "quill.llm.adapter", error = %e, "Skipping malformed chunk");
                return Ok(Vec::new());
            }
        };
        if let Some(err) = provider_error(&value) {
            return Err(err.into());
        }
        let chunk: GeminiChunk = match serde_json::from_value(value) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(target: "quill.llm.adapter", error = %e, "Skipping unexpected chunk shape");
                return Ok(Vec::new());
            }
        };

        if let Some(metadata) = chunk.usage_metadata {
            self.usage = Some(metadata.into());
        }

        let mut tokens = Vec::new();
        for candidate in chunk.candidates {
            let Some(content) = candidate.content else {
                continue;
            };
            for part in content.parts {
                if let Some(call) = part.function_call {
                    let arguments = call
                        .args
                        .map(|args| args.to_string())
                        .unwrap_or_else(|| "{}".to_string());
                    tokens.push(StreamToken::ToolCall(ToolCallData {
                        id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                        name: call.name,
                        arguments,
                    }));
                } else if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                    if part.thought {
                        tokens.push(StreamToken::Reasoning(text));
                    } else {
                        tokens.push(StreamToken::Content(text));
                    }
                }
            }
        }

        Ok(tokens)
    }

    fn finish(&mut self) -> Vec<StreamToken> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        self.usage
            .take()
            .filter(|u| !u.is_empty())
            .map(StreamToken::Usage)
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    cached_content_token_count: Option<u32>,
}

impl From<GeminiUsageMetadata> for Usage {
    fn from(metadata: GeminiUsageMetadata) -> Self {
        Usage {
            input_tokens: metadata.prompt_token_count,
            output_tokens: metadata.candidates_token_count,
            cache_read_input_tokens: metadata.cached_content_token_count,
        }
    }
}
