// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Wire adapters, one per provider family
//!
//! Each adapter owns one provider's event grammar and reduces it to
//! [`StreamToken`]s. Adapters are fed complete SSE records by
//! [`crate::llm::sse::SseDecoder`] and are flushed once when the body ends.

pub mod anthropic;
pub mod common;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

use crate::config::{ClientConfig, ProviderFamily};
use crate::error::Result;
use crate::llm::message::Message;
use crate::llm::provider::StreamToken;
use crate::llm::sse::SseEvent;
use crate::tools::definition::ToolDefinition;

/// Translate one provider's SSE records into normalized tokens.
///
/// Malformed records are skipped inside `process`; `Err` is reserved for
/// errors the provider itself reports mid-stream.
pub trait WireAdapter: Send {
    /// Consume one record.
    fn process(&mut self, event: &SseEvent) -> Result<Vec<StreamToken>>;

    /// The body ended. Flush anything still accumulated.
    fn finish(&mut self) -> Vec<StreamToken>;
}

/// Fresh adapter for a provider family
pub fn adapter_for(family: ProviderFamily) -> Box<dyn WireAdapter> {
    match family {
        ProviderFamily::OpenAiCompatible => Box::new(OpenAiAdapter::new()),
        ProviderFamily::Anthropic => Box::new(AnthropicAdapter::new()),
        ProviderFamily::Gemini => Box::new(GeminiAdapter::new()),
    }
}

/// Streaming endpoint for a resolved configuration
pub fn endpoint_url(config: &ClientConfig) -> String {
    match config.family {
        ProviderFamily::OpenAiCompatible => openai::endpoint_url(&config.base_url),
        ProviderFamily::Anthropic => anthropic::endpoint_url(&config.base_url),
        ProviderFamily::Gemini => gemini::endpoint_url(&config.base_url, &config.model),
    }
}

/// JSON request body in the family's dialect
pub fn build_request_body(
    config: &ClientConfig,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> serde_json::Value {
    match config.family {
        ProviderFamily::OpenAiCompatible => openai::build_request_body(config, messages, tools),
        ProviderFamily::Anthropic => anthropic::build_request_body(config, messages, tools),
        ProviderFamily::Gemini => gemini::build_request_body(config, messages, tools),
    }
}
