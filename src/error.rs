// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Quill
//!
//! Transport and configuration failures are errors. Tool failures and loop
//! exits are ordinary values and never travel through this module.

use thiserror::Error;

/// Main error type for Quill operations
#[derive(Error, Debug)]
pub enum QuillError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Tool execution errors that could not be turned into a tool result
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The caller's cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Non-success HTTP status. `excerpt` is a bounded prefix of the body.
    #[error("HTTP {status}: {excerpt}")]
    HttpStatus { status: u16, excerpt: String },

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Streaming error (body read failed mid-stream)
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Provider reported an error inside an otherwise healthy stream
    #[error("Provider error ({error_type}): {message}")]
    Provider { error_type: String, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,
}

impl ApiError {
    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure is an authentication rejection
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// Whether a fresh attempt of the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            ApiError::Network(_) | ApiError::Timeout => true,
            _ => false,
        }
    }
}

/// Result type alias for Quill operations
pub type Result<T> = std::result::Result<T, QuillError>;
