// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Quill
//!
//! Handles loading and saving settings from ~/.quill/settings.json and
//! resolving a provider entry into the concrete [`ClientConfig`] the
//! streaming client consumes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{QuillError, Result};
use crate::tools::permission::PermissionMode;

/// Main settings structure, stored in ~/.quill/settings.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Provider used when none is given on the command line
    #[serde(default = "default_provider_name")]
    pub default_provider: String,

    /// Provider entries keyed by name. Missing presets are filled in on load.
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Generation defaults for new sessions
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Orchestration loop limits
    #[serde(default)]
    pub agent: AgentSettings,

    /// Permission gate settings
    #[serde(default)]
    pub permissions: PermissionSettings,

    /// Retry settings for API calls
    #[serde(default)]
    pub resilience: ResilienceSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_provider: default_provider_name(),
            providers: default_providers(),
            defaults: DefaultsConfig::default(),
            agent: AgentSettings::default(),
            permissions: PermissionSettings::default(),
            resilience: ResilienceSettings::default(),
        }
    }
}

/// Wire dialect spoken by a provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    /// `data: {json}` chat-completions dialect (OpenAI, OpenRouter, DeepSeek, Ollama, ...)
    #[serde(rename = "openai")]
    OpenAiCompatible,
    /// Anthropic messages API
    Anthropic,
    /// Google Gemini `streamGenerateContent`
    Gemini,
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderFamily::OpenAiCompatible => write!(f, "openai"),
            ProviderFamily::Anthropic => write!(f, "anthropic"),
            ProviderFamily::Gemini => write!(f, "gemini"),
        }
    }
}

/// Configuration of one provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Wire dialect
    pub family: ProviderFamily,

    /// Base URL for the API (override for proxies and self-hosted servers)
    pub base_url: String,

    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Default model to use
    pub default_model: String,

    /// Whether requests without a credential should be refused up front
    #[serde(default = "default_true")]
    pub requires_key: bool,
}

impl ProviderConfig {
    fn preset(
        family: ProviderFamily,
        base_url: &str,
        api_key_env: Option<&str>,
        default_model: &str,
    ) -> Self {
        Self {
            family,
            base_url: base_url.to_string(),
            api_key: None,
            api_key_env: api_key_env.map(str::to_string),
            default_model: default_model.to_string(),
            requires_key: api_key_env.is_some(),
        }
    }

    /// Resolve the credential from the inline key, then the environment.
    /// Empty values count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        self.api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
    }
}

/// Default settings for new sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Send native tool definitions with each request
    #[serde(default = "default_true")]
    pub tools_enabled: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            tools_enabled: true,
        }
    }
}

/// Orchestration loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum streaming rounds per user submission
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Rounds in a row where every tool call failed before giving up
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Per-command shell timeout
    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,

    /// Undo ledger capacity
    #[serde(default = "default_undo_capacity")]
    pub undo_capacity: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_consecutive_failures: default_max_consecutive_failures(),
            shell_timeout_secs: default_shell_timeout_secs(),
            undo_capacity: default_undo_capacity(),
        }
    }
}

/// Permission gate settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PermissionSettings {
    /// Mode the gate starts in
    #[serde(default)]
    pub mode: PermissionMode,
}

/// Retry settings for API calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceSettings {
    /// Retries after the first attempt, before any token was received
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
        }
    }
}

/// Everything the streaming client needs for one provider/model pair
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Provider entry name (for logs)
    pub provider: String,
    pub family: ProviderFamily,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tools_enabled: bool,
    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
}

impl ClientConfig {
    /// Minimal config for a family with library defaults
    pub fn new(
        family: ProviderFamily,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let resilience = ResilienceSettings::default();
        let defaults = DefaultsConfig::default();
        Self {
            provider: family.to_string(),
            family,
            model: model.into(),
            base_url: base_url.into(),
            api_key: None,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            tools_enabled: defaults.tools_enabled,
            max_retries: resilience.max_retries,
            base_retry_delay_ms: resilience.base_retry_delay_ms,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.base_retry_delay_ms = base_delay_ms;
        self
    }
}

impl Settings {
    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::quill_home().join("settings.json")
    }

    /// Get the quill home directory (~/.quill or $QUILL_HOME).
    pub fn quill_home() -> PathBuf {
        if let Ok(home) = std::env::var("QUILL_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".quill")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let mut settings: Settings = serde_json::from_str(&content)?;

        // User entries win; presets only fill gaps.
        for (name, preset) in default_providers() {
            settings.providers.entry(name).or_insert(preset);
        }
        Ok(settings)
    }

    /// Save settings to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve a provider entry (default provider when `None`) and an
    /// optional model override into a [`ClientConfig`].
    pub fn resolve_client(&self, provider: Option<&str>, model: Option<&str>) -> Result<ClientConfig> {
        let name = provider.unwrap_or(&self.default_provider);
        let entry = self.providers.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
            QuillError::Config(format!(
                "Unknown provider '{}'. Configured providers: {}",
                name,
                known.join(", ")
            ))
        })?;

        let api_key = entry.resolve_api_key();
        if entry.requires_key && api_key.is_none() {
            let hint = entry
                .api_key_env
                .as_deref()
                .map(|var| format!(" Set {} or add api_key to the provider entry.", var))
                .unwrap_or_default();
            return Err(QuillError::Config(format!(
                "No API key configured for provider '{}'.{}",
                name, hint
            )));
        }

        Ok(ClientConfig {
            provider: name.to_string(),
            family: entry.family,
            model: model.unwrap_or(&entry.default_model).to_string(),
            base_url: entry.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_tokens: self.defaults.max_tokens,
            temperature: self.defaults.temperature,
            tools_enabled: self.defaults.tools_enabled,
            max_retries: self.resilience.max_retries,
            base_retry_delay_ms: self.resilience.base_retry_delay_ms,
        })
    }
}

/// Built-in provider presets
pub fn default_providers() -> BTreeMap<String, ProviderConfig> {
    use ProviderFamily::*;

    let mut providers = BTreeMap::new();
    providers.insert(
        "openai".to_string(),
        ProviderConfig::preset(
            OpenAiCompatible,
            "https://api.openai.com/v1",
            Some("OPENAI_API_KEY"),
            "gpt-4o-mini",
        ),
    );
    providers.insert(
        "openrouter".to_string(),
        ProviderConfig::preset(
            OpenAiCompatible,
            "https://openrouter.ai/api/v1",
            Some("OPENROUTER_API_KEY"),
            "anthropic/claude-3.5-sonnet",
        ),
    );
    providers.insert(
        "deepseek".to_string(),
        ProviderConfig::preset(
            OpenAiCompatible,
            "https://api.deepseek.com/v1",
            Some("DEEPSEEK_API_KEY"),
            "deepseek-chat",
        ),
    );
    providers.insert(
        "ollama".to_string(),
        ProviderConfig::preset(
            OpenAiCompatible,
            "http://localhost:11434/v1",
            None,
            "qwen2.5-coder:7b",
        ),
    );
    providers.insert(
        "anthropic".to_string(),
        ProviderConfig::preset(
            Anthropic,
            "https://api.anthropic.com",
            Some("ANTHROPIC_API_KEY"),
            "claude-sonnet-4-20250514",
        ),
    );
    providers.insert(
        "gemini".to_string(),
        ProviderConfig::preset(
            Gemini,
            "https://generativelanguage.googleapis.com",
            Some("GEMINI_API_KEY"),
            "gemini-2.0-flash",
        ),
    );
    providers
}

fn default_provider_name() -> String {
    "openai".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_turns() -> u32 {
    10
}

fn default_max_consecutive_failures() -> u32 {
    4
}

fn default_shell_timeout_secs() -> u64 {
    30
}

fn default_undo_capacity() -> usize {
    50
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_retry_delay_ms() -> u64 {
    500
}
