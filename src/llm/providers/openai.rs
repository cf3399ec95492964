// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible chat-completions dialect
//!
//! Covers every backend that speaks `data: {json}` chunk deltas with a
//! `[DONE]` sentinel: OpenAI, OpenRouter, DeepSeek, Ollama and friends.
//! Some of these backends inline their reasoning in the content field
//! between `<think>` and `</think>`; [`ThinkTagSplitter`] reclassifies it.

use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

use super::common::provider_error;
use super::WireAdapter;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::llm::message::Message;
use crate::llm::provider::{StreamToken, ToolCallData, Usage};
use crate::llm::sse::SseEvent;
use crate::tools::definition::ToolDefinition;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";
const DONE_SENTINEL: &str = "[DONE]";

/// Chat-completions endpoint under a base URL such as `https://api.openai.com/v1`
pub fn endpoint_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Build a streaming chat-completions request body
pub fn build_request_body(
    config: &ClientConfig,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": config.model,
        "messages": messages,
        "stream": true,
        "stream_options": { "include_usage": true },
        "max_tokens": config.max_tokens,
        "temperature": config.temperature,
    });

    if config.tools_enabled && !tools.is_empty() {
        let tools: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::Value::Array(tools);
    }

    body
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Adapter for the OpenAI-compatible stream grammar
#[derive(Debug, Default)]
pub struct OpenAiAdapter {
    think: ThinkTagSplitter,
    pending_calls: BTreeMap<u32, PendingCall>,
    usage: Usage,
    finished: bool,
}

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn accumulate_call(&mut self, index: u32, call: StreamToolCall) {
        let entry = self.pending_calls.entry(index).or_default();
        if let Some(id) = call.id.filter(|id| !id.is_empty()) {
            entry.id = id;
        }
        if let Some(function) = call.function {
            if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                if entry.name.is_empty() {
                    entry.name = name;
                } else if entry.name != name {
                    entry.name.push_str(&name);
                }
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    fn flush_calls(&mut self) -> Vec<StreamToken> {
        std::mem::take(&mut self.pending_calls)
            .into_iter()
            .filter_map(|(index, call)| {
                if call.name.is_empty() {
                    tracing::debug!(
                        target: "quill.llm.adapter",
                        index,
                        "Dropping tool call delta without a function name"
                    );
                    return None;
                }
                let id = if call.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    call.id
                };
                Some(StreamToken::ToolCall(ToolCallData {
                    id,
                    name: call.name,
                    arguments: call.arguments,
                }))
            })
            .collect()
    }
}

impl WireAdapter for OpenAiAdapter {
    fn process(&mut self, event: &SseEvent) -> Result<Vec<StreamToken>> {
        if self.finished {
            return Ok(Vec::new());
        }

        let data = event.data.trim();
        if data == DONE_SENTINEL {
            return Ok(self.finish());
        }

        let value: serde_json::Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(target: "quill.llm.adapter", error = %e, "Skipping malformed chunk");
                return Ok(Vec::new());
            }
        };
        if let Some(err) = provider_error(&value) {
            return Err(err.into());
        }
        let chunk: StreamChunk = match serde_json::from_value(value) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(target: "quill.llm.adapter", error = %e, "Skipping unexpected chunk shape");
                return Ok(Vec::new());
            }
        };

        if let Some(usage) = chunk.usage {
            self.usage.merge(&usage.into());
        }

        let mut tokens = Vec::new();
        for choice in chunk.choices {
            let delta = choice.delta;

            if let Some(reasoning) = delta.reasoning_content.or(delta.reasoning) {
                if !reasoning.is_empty() {
                    tokens.push(StreamToken::Reasoning(reasoning));
                }
            }

            if let Some(content) = delta.content {
                tokens.extend(self.think.push(&content));
            }

            if let Some(calls) = delta.tool_calls {
                for (position, call) in calls.into_iter().enumerate() {
                    let index = call.index.unwrap_or(position as u32);
                    self.accumulate_call(index, call);
                }
            }

            if choice.finish_reason.is_some() {
                tokens.extend(self.flush_calls());
            }
        }

        Ok(tokens)
    }

    fn finish(&mut self) -> Vec<StreamToken> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut tokens: Vec<StreamToken> = self.think.flush().into_iter().collect();
        tokens.extend(self.flush_calls());
        if !self.usage.is_empty() {
            tokens.push(StreamToken::Usage(self.usage));
        }
        tokens
    }
}

/// Two-state machine separating `<think>` spans from visible content.
///
/// A suffix that could still grow into the next marker is held back until
/// the following chunk decides it.
#[derive(Debug, Default)]
pub(crate) struct ThinkTagSplitter {
    inside: bool,
    pending: String,
}

impl ThinkTagSplitter {
    pub(crate) fn push(&mut self, text: &str) -> Vec<StreamToken> {
        self.pending.push_str(text);
        let mut tokens = Vec::new();

        loop {
            let marker = if self.inside { THINK_CLOSE } else { THINK_OPEN };
            if let Some(pos) = self.pending.find(marker) {
                let before: String = self.pending.drain(..pos).collect();
                self.emit(before, &mut tokens);
                self.pending.drain(..marker.len());
                self.inside = !self.inside;
                continue;
            }

            let keep = partial_marker_suffix(&self.pending, marker);
            let ready = self.pending.len() - keep;
            if ready > 0 {
                let text: String = self.pending.drain(..ready).collect();
                self.emit(text, &mut tokens);
            }
            return tokens;
        }
    }

    /// Release whatever is held back, classified by the current state.
    pub(crate) fn flush(&mut self) -> Option<StreamToken> {
        let rest = std::mem::take(&mut self.pending);
        let mut tokens = Vec::new();
        self.emit(rest, &mut tokens);
        tokens.pop()
    }

    fn emit(&self, text: String, tokens: &mut Vec<StreamToken>) {
        if text.is_empty() {
            return;
        }
        if self.inside {
            tokens.push(StreamToken::Reasoning(text));
        } else {
            tokens.push(StreamToken::Content(text));
        }
    }
}

/// Length of the longest proper prefix of `marker` that `text` ends with.
fn partial_marker_suffix(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&len| {
            text.len() >= len
                && text.is_char_boundary(text.len() - len)
                && marker.starts_with(&text[text.len() - len..])
        })
        .unwrap_or(0)
}

// Streaming types
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: Option<u32>,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    cached_tokens: Option<u32>,
}

impl From<StreamUsage> for Usage {
    fn from(usage: StreamUsage) -> Self {
        Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cache_read_input_tokens: usage.prompt_tokens_details.and_then(|d| d.cached_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderFamily;
    use crate::error::{ApiError, QuillError};

    fn data(json: serde_json::Value) -> SseEvent {
        SseEvent::data(json.to_string())
    }

    fn content_chunk(text: &str) -> SseEvent {
        data(json!({"choices": [{"delta": {"content": text}, "finish_reason": null}]}))
    }

    fn run(adapter: &mut OpenAiAdapter, events: &[SseEvent]) -> Vec<StreamToken> {
        let mut tokens = Vec::new();
        for event in events {
            tokens.extend(adapter.process(event).unwrap());
        }
        tokens.extend(adapter.finish());
        tokens
    }

    #[test]
    fn test_content_deltas() {
        let mut adapter = OpenAiAdapter::new();
        let tokens = run(
            &mut adapter,
            &[content_chunk("Hel"), content_chunk("lo"), SseEvent::data("[DONE]")],
        );
        assert_eq!(
            tokens,
            vec![
                StreamToken::Content("Hel".to_string()),
                StreamToken::Content("lo".to_string())
            ]
        );
    }

    #[test]
    fn test_reasoning_content_field() {
        let mut adapter = OpenAiAdapter::new();
        let tokens = adapter
            .process(&data(json!({"choices": [{"delta": {"reasoning_content": "hmm"}}]})))
            .unwrap();
        assert_eq!(tokens, vec![StreamToken::Reasoning("hmm".to_string())]);
    }

    #[test]
    fn test_think_span_split_across_three_chunks() {
        let mut adapter = OpenAiAdapter::new();
        let tokens = run(
            &mut adapter,
            &[
                content_chunk("<think>"),
                content_chunk("planning the edit"),
                content_chunk("</think>"),
                content_chunk("Done."),
            ],
        );
        assert_eq!(
            tokens,
            vec![
                StreamToken::Reasoning("planning the edit".to_string()),
                StreamToken::Content("Done.".to_string())
            ]
        );
    }

    #[test]
    fn test_think_marker_split_mid_sentinel() {
        let mut adapter = OpenAiAdapter::new();
        let tokens = run(
            &mut adapter,
            &[
                content_chunk("Hi <th"),
                content_chunk("ink>deep</thi"),
                content_chunk("nk> there"),
            ],
        );
        let reasoning: String = tokens
            .iter()
            .filter_map(|t| match t {
                StreamToken::Reasoning(r) => Some(r.as_str()),
                _ => None,
            })
            .collect();
        let content: String = tokens
            .iter()
            .filter_map(|t| match t {
                StreamToken::Content(c) => Some(c.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(reasoning, "deep");
        assert_eq!(content, "Hi  there");
    }

    #[test]
    fn test_lone_angle_bracket_released_at_finish() {
        let mut adapter = OpenAiAdapter::new();
        let tokens = run(&mut adapter, &[content_chunk("a <")]);
        let content: String = tokens
            .iter()
            .filter_map(|t| match t {
                StreamToken::Content(c) => Some(c.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(content, "a <");
    }

    #[test]
    fn test_tool_call_accumulated_and_flushed_on_finish_reason() {
        let mut adapter = OpenAiAdapter::new();
        let first = adapter
            .process(&data(json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_abc", "function": {"name": "bash", "arguments": "{\"comm"}}
            ]}}]})))
            .unwrap();
        assert!(first.is_empty());

        let second = adapter
            .process(&data(json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "and\":\"ls\"}"}}
            ]}}]})))
            .unwrap();
        assert!(second.is_empty());

        let done = adapter
            .process(&data(json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]})))
            .unwrap();
        assert_eq!(
            done,
            vec![StreamToken::ToolCall(ToolCallData::new(
                "call_abc",
                "bash",
                "{\"command\":\"ls\"}"
            ))]
        );
        assert!(adapter.finish().is_empty());
    }

    #[test]
    fn test_trailing_tool_call_flushed_when_stream_ends() {
        let mut adapter = OpenAiAdapter::new();
        adapter
            .process(&data(json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "c1", "function": {"name": "read", "arguments": "{\"path\":\"a\"}"}}
            ]}}]})))
            .unwrap();
        let tokens = adapter.finish();
        assert_eq!(tokens.len(), 1);
        assert!(matches!(&tokens[0], StreamToken::ToolCall(call) if call.name == "read"));
    }

    #[test]
    fn test_parallel_tool_calls_flushed_in_index_order() {
        let mut adapter = OpenAiAdapter::new();
        adapter
            .process(&data(json!({"choices": [{"delta": {"tool_calls": [
                {"index": 1, "id": "b", "function": {"name": "grep", "arguments": "{}"}},
                {"index": 0, "id": "a", "function": {"name": "ls", "arguments": "{}"}}
            ]}}]})))
            .unwrap();
        let tokens = adapter.finish();
        let ids: Vec<&str> = tokens
            .iter()
            .filter_map(|t| match t {
                StreamToken::ToolCall(call) => Some(call.id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_nameless_call_is_dropped() {
        let mut adapter = OpenAiAdapter::new();
        adapter
            .process(&data(json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{}"}}
            ]}}]})))
            .unwrap();
        assert!(adapter.finish().is_empty());
    }

    #[test]
    fn test_usage_emitted_once_at_end() {
        let mut adapter = OpenAiAdapter::new();
        let tokens = run(
            &mut adapter,
            &[
                content_chunk("x"),
                data(json!({"choices": [], "usage": {"prompt_tokens": 12, "completion_tokens": 3}})),
                SseEvent::data("[DONE]"),
            ],
        );
        assert_eq!(tokens.last(), Some(&StreamToken::Usage(Usage::new(12, 3))));
        let usage_count = tokens
            .iter()
            .filter(|t| matches!(t, StreamToken::Usage(_)))
            .count();
        assert_eq!(usage_count, 1);
    }

    #[test]
    fn test_malformed_chunk_skipped() {
        let mut adapter = OpenAiAdapter::new();
        let tokens = run(
            &mut adapter,
            &[content_chunk("a"), SseEvent::data("{not json"), content_chunk("b")],
        );
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_error_object_becomes_provider_error() {
        let mut adapter = OpenAiAdapter::new();
        let err = adapter
            .process(&data(json!({"error": {"message": "Rate limit", "type": "rate_limit"}})))
            .unwrap_err();
        assert!(matches!(
            err,
            QuillError::Api(ApiError::Provider { ref error_type, .. }) if error_type == "rate_limit"
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let config = ClientConfig::new(ProviderFamily::OpenAiCompatible, "http://x/v1", "gpt-4o");
        let tools = vec![ToolDefinition::new(
            "read",
            "Read a file",
            json!({"type": "object", "properties": {}, "required": []}),
        )];
        let body = build_request_body(
            &config,
            &[Message::system("sys"), Message::user("hi")],
            &tools,
        );
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "read");
    }

    #[test]
    fn test_request_body_without_tools() {
        let config = ClientConfig::new(ProviderFamily::OpenAiCompatible, "http://x/v1", "m")
            .with_tools(false);
        let tools = vec![ToolDefinition::new("read", "Read", json!({}))];
        let body = build_request_body(&config, &[Message::user("hi")], &tools);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_partial_marker_suffix() {
        assert_eq!(partial_marker_suffix("abc<thi", THINK_OPEN), 4);
        assert_eq!(partial_marker_suffix("abc", THINK_OPEN), 0);
        assert_eq!(partial_marker_suffix("x</", THINK_CLOSE), 2);
    }
}
