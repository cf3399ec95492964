// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Anthropic messages dialect
//!
//! Block-structured events: `content_block_start` opens a text, thinking or
//! `tool_use` block, deltas extend it, `content_block_stop` closes it.

use serde_json::json;
use std::collections::BTreeMap;

use super::common::provider_error;
use super::WireAdapter;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::llm::message::{Message, Role};
use crate::llm::provider::{StreamToken, ToolCallData, Usage};
use crate::llm::sse::SseEvent;
use crate::tools::definition::ToolDefinition;

/// Value sent in the `anthropic-version` header
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages endpoint under a base URL such as `https://api.anthropic.com`
pub fn endpoint_url(base_url: &str) -> String {
    format!("{}/v1/messages", base_url.trim_end_matches('/'))
}

/// Build a streaming messages request body.
///
/// System messages are lifted into the top-level `system` field.
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

    let messages: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": config.model,
        "messages": messages,
        "max_tokens": config.max_tokens,
        "temperature": config.temperature,
        "stream": true,
    });

    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }

    if config.tools_enabled && !tools.is_empty() {
        let tools: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();
        body["tools"] = serde_json::Value::Array(tools);
    }

    body
}

#[derive(Debug)]
struct ToolBlock {
    id: String,
    name: String,
    input: String,
}

impl ToolBlock {
    fn into_token(self) -> StreamToken {
        let arguments = if self.input.trim().is_empty() {
            "{}".to_string()
        } else {
            self.input
        };
        StreamToken::ToolCall(ToolCallData {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

/// Adapter for the Anthropic stream grammar
#[derive(Debug, Default)]
pub struct AnthropicAdapter {
    tool_blocks: BTreeMap<u64, ToolBlock>,
    usage: Usage,
    finished: bool,
}

impl AnthropicAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn merge_usage(&mut self, usage: &serde_json::Value) {
        let field = |name: &str| {
            usage
                .get(name)
                .and_then(|v| v.as_u64())
                .and_then(|v| u32::try_from(v).ok())
        };
        self.usage.merge(&Usage {
            input_tokens: field("input_tokens"),
            output_tokens: field("output_tokens"),
            cache_read_input_tokens: field("cache_read_input_tokens"),
        });
    }

    fn block_start(&mut self, parsed: &serde_json::Value) -> Option<Vec<StreamToken>> {
        let index = parsed["index"].as_u64()?;
        let block = &parsed["content_block"];

        match block["type"].as_str()? {
            "tool_use" => {
                self.tool_blocks.insert(
                    index,
                    ToolBlock {
                        id: block["id"].as_str()?.to_string(),
                        name: block["name"].as_str()?.to_string(),
                        input: String::new(),
                    },
                );
                Some(Vec::new())
            }
            "text" => Some(
                block["text"]
                    .as_str()
                    .filter(|t| !t.is_empty())
                    .map(|t| StreamToken::Content(t.to_string()))
                    .into_iter()
                    .collect(),
            ),
            "thinking" => Some(
                block["thinking"]
                    .as_str()
                    .filter(|t| !t.is_empty())
                    .map(|t| StreamToken::Reasoning(t.to_string()))
                    .into_iter()
                    .collect(),
            ),
            _ => Some(Vec::new()),
        }
    }

    fn block_delta(&mut self, parsed: &serde_json::Value) -> Option<Vec<StreamToken>> {
        let index = parsed["index"].as_u64()?;
        let delta = &parsed["delta"];

        match delta["type"].as_str()? {
            "text_delta" => Some(vec![StreamToken::Content(
                delta["text"].as_str()?.to_string(),
            )]),
            "thinking_delta" => Some(vec![StreamToken::Reasoning(
                delta["thinking"].as_str()?.to_string(),
            )]),
            "input_json_delta" => {
                let fragment = delta["partial_json"].as_str()?;
                match self.tool_blocks.get_mut(&index) {
                    Some(block) => block.input.push_str(fragment),
                    None => tracing::debug!(
                        target: "quill.llm.adapter",
                        index,
                        "input_json_delta for unknown block"
                    ),
                }
                Some(Vec::new())
            }
            // signature_delta and future subtypes
            _ => Some(Vec::new()),
        }
    }
}

impl WireAdapter for AnthropicAdapter {
    fn process(&mut self, event: &SseEvent) -> Result<Vec<StreamToken>> {
        if self.finished {
            return Ok(Vec::new());
        }

        let parsed: serde_json::Value = match serde_json::from_str(&event.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(target: "quill.llm.adapter", error = %e, "Skipping malformed event");
                return Ok(Vec::new());
            }
        };

        let event_type = event
            .event
            .clone()
            .or_else(|| parsed["type"].as_str().map(str::to_string))
            .unwrap_or_default();

        let tokens = match event_type.as_str() {
            "message_start" => {
                self.merge_usage(&parsed["message"]["usage"]);
                Some(Vec::new())
            }
            "content_block_start" => self.block_start(&parsed),
            "content_block_delta" => self.block_delta(&parsed),
            "content_block_stop" => parsed["index"].as_u64().map(|index| {
                self.tool_blocks
                    .remove(&index)
                    .map(ToolBlock::into_token)
                    .into_iter()
                    .collect()
            }),
            "message_delta" => {
                self.merge_usage(&parsed["usage"]);
                Some(Vec::new())
            }
            "message_stop" => Some(self.finish()),
            "ping" => Some(Vec::new()),
            "error" => {
                if let Some(err) = provider_error(&parsed) {
                    return Err(err.into());
                }
                None
            }
            _ => None,
        };

        Ok(tokens.unwrap_or_else(|| {
            tracing::debug!(
                target: "quill.llm.adapter",
                event_type = %event_type,
                "Skipping unrecognized event"
            );
            Vec::new()
        }))
    }

    fn finish(&mut self) -> Vec<StreamToken> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut tokens: Vec<StreamToken> = std::mem::take(&mut self.tool_blocks)
            .into_values()
            .map(ToolBlock::into_token)
            .collect();
        if !self.usage.is_empty() {
            tokens.push(StreamToken::Usage(self.usage));
        }
        tokens
    }
}
