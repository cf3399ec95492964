// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool definition types
//!
//! JSON-schema descriptions of the tool vocabulary, sent with requests when
//! native function calling is enabled. Each wire adapter reshapes them into
//! its own dialect.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::builtin;

/// Definition of a tool for the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Definitions for the full tool vocabulary, in a stable order
pub fn all_definitions() -> Vec<ToolDefinition> {
    vec![
        builtin::file_read::definition(),
        builtin::file_write::definition(),
        builtin::file_edit::definition(),
        builtin::file_delete::definition(),
        builtin::shell::definition(),
        builtin::grep::definition(),
        builtin::glob::definition(),
        builtin::ls::definition(),
        builtin::git::definition(),
    ]
}

/// Helper to create a tool input schema
pub struct SchemaBuilder {
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl SchemaBuilder {
    /// Create a new schema builder
    pub fn new() -> Self {
        Self {
            properties: serde_json::Map::new(),
            required: vec![],
        }
    }

    /// Add a string property
    pub fn string(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            serde_json::json!({
                "type": "string",
                "description": description
            }),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Build the schema
    pub fn build(self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": Value::Object(self.properties),
            "required": self.required,
        })
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
