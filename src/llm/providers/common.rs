// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::config::ProviderFamily;
use crate::error::ApiError;

/// Largest slice of an error body carried into an error value.
pub const MAX_ERROR_EXCERPT_BYTES: usize = 512;

/// How a provider family expects its credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// A custom header carrying the bare key
    Header(&'static str),
    /// A URL query parameter carrying the key
    QueryParam(&'static str),
}

impl AuthScheme {
    pub fn for_family(family: ProviderFamily) -> Self {
        match family {
            ProviderFamily::OpenAiCompatible => AuthScheme::Bearer,
            ProviderFamily::Anthropic => AuthScheme::Header("x-api-key"),
            ProviderFamily::Gemini => AuthScheme::QueryParam("key"),
        }
    }

    /// Attach `api_key` to the request in this scheme's shape.
    pub fn apply(self, request: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
        match self {
            AuthScheme::Bearer => request.bearer_auth(api_key),
            AuthScheme::Header(name) => request.header(name, api_key),
            AuthScheme::QueryParam(name) => request.query(&[(name, api_key)]),
        }
    }
}

/// Cut `text` to at most `max_bytes`, backing off to a char boundary.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Build the error for a non-success response, keeping only a bounded
/// excerpt of the body.
pub fn http_status_error(status: u16, body: &str) -> ApiError {
    let trimmed = body.trim();
    let mut excerpt = truncate_utf8(trimmed, MAX_ERROR_EXCERPT_BYTES).to_string();
    if excerpt.len() < trimmed.len() {
        excerpt.push_str("...");
    }
    ApiError::HttpStatus { status, excerpt }
}

/// Parse numeric Retry-After header (seconds).
pub(crate) fn parse_retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Pull a provider error object (`{"error": {...}}` or a bare
/// `{"type": "error", ...}`) out of an event payload.
pub(crate) fn provider_error(value: &serde_json::Value) -> Option<ApiError> {
    let error = value.get("error").filter(|e| !e.is_null())?;
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .or_else(|| error.as_str().map(str::to_string))
        .unwrap_or_else(|| error.to_string());
    let error_type = error
        .get("type")
        .or_else(|| error.get("code"))
        .or_else(|| error.get("status"))
        .map(|t| match t.as_str() {
            Some(s) => s.to_string(),
            None => t.to_string(),
        })
        .unwrap_or_else(|| "error".to_string());
    Some(ApiError::Provider {
        error_type,
        message,
    })
}
