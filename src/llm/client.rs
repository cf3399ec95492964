// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming client
//!
//! One HTTP client for every provider family. The family picks the endpoint,
//! the request dialect, the authentication shape and the wire adapter; the
//! rest (retries before the first token, SSE framing, cancellation) is shared.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, ProviderFamily};
use crate::error::{ApiError, QuillError, Result};
use crate::llm::message::Message;
use crate::llm::provider::{LlmProvider, TokenStream};
use crate::llm::providers::common::{
    http_status_error, parse_retry_after_seconds, AuthScheme, MAX_ERROR_EXCERPT_BYTES,
};
use crate::llm::providers::{self, anthropic};
use crate::llm::sse::SseDecoder;
use crate::tools::definition::{all_definitions, ToolDefinition};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Bytes of an error body read before giving up on the rest
const ERROR_BODY_READ_LIMIT: usize = MAX_ERROR_EXCERPT_BYTES * 2;

/// Streaming client for any configured provider family
#[derive(Clone)]
pub struct StreamingClient {
    config: ClientConfig,
    http: reqwest::Client,
    tools: Vec<ToolDefinition>,
}

impl StreamingClient {
    /// Create a client for a resolved configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_http_client(config, http))
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_http_client(config: ClientConfig, http: reqwest::Client) -> Self {
        let tools = if config.tools_enabled {
            all_definitions()
        } else {
            Vec::new()
        };
        Self {
            config,
            http,
            tools,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build_request(&self, messages: &[Message]) -> reqwest::RequestBuilder {
        let url = providers::endpoint_url(&self.config);
        let body = providers::build_request_body(&self.config, messages, &self.tools);

        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body);

        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = AuthScheme::for_family(self.config.family).apply(request, key);
        }
        if self.config.family == ProviderFamily::Anthropic {
            request = request.header("anthropic-version", anthropic::ANTHROPIC_VERSION);
        }
        request
    }

    /// Backoff before retry number `attempt` (0-based)
    fn retry_delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(secs) = retry_after_secs {
            return Duration::from_secs(secs).min(MAX_RETRY_DELAY);
        }
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.config.base_retry_delay_ms.saturating_mul(factor))
            .min(MAX_RETRY_DELAY)
    }

    /// Send the request until it returns 2xx, retrying transient failures.
    ///
    /// Nothing has been yielded yet at this point, so retrying is safe.
    async fn send_with_retry(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let mut attempt: u32 = 0;
        loop {
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(QuillError::Cancelled),
                sent = self.build_request(messages).send() => sent,
            };

            let (error, retry_after) = match sent {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = parse_retry_after_seconds(response.headers());
                    let body = read_error_body(response, cancel).await?;
                    (http_status_error(status, &body), retry_after)
                }
                Err(e) if e.is_timeout() => (ApiError::Timeout, None),
                Err(e) => (ApiError::Network(e.to_string()), None),
            };

            if !error.is_retryable() || attempt >= self.config.max_retries {
                tracing::debug!(
                    target: "quill.llm.client",
                    provider = %self.config.provider,
                    attempt,
                    error = %error,
                    "Request failed"
                );
                return Err(error.into());
            }

            let delay = self.retry_delay(attempt, retry_after);
            tracing::warn!(
                target: "quill.llm.client",
                provider = %self.config.provider,
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying request"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(QuillError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

/// Read the head of a non-success body. Stops at [`ERROR_BODY_READ_LIMIT`]
/// bytes, at the end of the body, or on a transport error, and gives up
/// when `cancel` fires.
async fn read_error_body(
    response: reqwest::Response,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut body = Box::pin(response.bytes_stream());
    let mut head: Vec<u8> = Vec::new();
    while head.len() < ERROR_BODY_READ_LIMIT {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QuillError::Cancelled),
            chunk = body.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => head.extend_from_slice(&bytes),
            Some(Err(e)) => {
                tracing::debug!(target: "quill.llm.client", error = %e, "Error body read failed");
                break;
            }
            None => break,
        }
    }
    head.truncate(ERROR_BODY_READ_LIMIT);
    Ok(String::from_utf8_lossy(&head).into_owned())
}

#[async_trait]
impl LlmProvider for StreamingClient {
    fn name(&self) -> &str {
        &self.config.provider
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream(&self, messages: &[Message], cancel: CancellationToken) -> Result<TokenStream> {
        tracing::debug!(
            target: "quill.llm.client",
            provider = %self.config.provider,
            model = %self.config.model,
            messages = messages.len(),
            "Opening stream"
        );

        let response = self.send_with_retry(messages, &cancel).await?;
        let mut body = Box::pin(response.bytes_stream());
        let mut adapter = providers::adapter_for(self.config.family);

        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();

            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(target: "quill.llm.client", "Stream cancelled");
                        return;
                    }
                    chunk = body.next() => chunk,
                };

                match chunk {
                    Some(Ok(bytes)) => {
                        for event in decoder.feed(&bytes) {
                            match adapter.process(&event) {
                                Ok(tokens) => {
                                    for token in tokens {
                                        if cancel.is_cancelled() {
                                            return;
                                        }
                                        yield Ok(token);
                                    }
                                }
                                Err(e) => {
                                    yield Err(e);
                                    return;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(QuillError::Api(ApiError::Stream(e.to_string())));
                        return;
                    }
                    None => break,
                }
            }

            if let Some(event) = decoder.finish() {
                match adapter.process(&event) {
                    Ok(tokens) => {
                        for token in tokens {
                            yield Ok(token);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            for token in adapter.finish() {
                yield Ok(token);
            }
        };

        Ok(Box::pin(stream))
    }
}
