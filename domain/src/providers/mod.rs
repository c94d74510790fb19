//! Provider configuration types (provider-neutral, serde-free).
//!
//! These types define the shape of provider settings without depending
//! on any serialization format (TOML, JSON, etc.).

pub mod catalog;

use std::fmt;

/// The OpenAI-compatible backends a session can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    DeepSeek,
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::DeepSeek, ProviderKind::OpenRouter];

    /// Lower-case name used in model strings and config sections.
    pub fn key(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "DeepSeek",
            ProviderKind::OpenRouter => "OpenRouter",
        }
    }

    /// Resolve a provider name case-insensitively.
    pub fn from_key(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key().eq_ignore_ascii_case(name))
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "DEEPSEEK_API_KEY",
            ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "https://api.deepseek.com",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Settings for a single provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Direct API key (takes precedence over `api_key_env`).
    pub api_key: Option<String>,
    /// Base URL; `/chat/completions` is appended.
    pub base_url: String,
}

impl ProviderSettings {
    pub fn defaults_for(kind: ProviderKind) -> Self {
        Self {
            api_key_env: kind.default_api_key_env().to_string(),
            api_key: None,
            base_url: kind.default_base_url().to_string(),
        }
    }
}

/// Top-level provider configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub deepseek: ProviderSettings,
    pub openrouter: ProviderSettings,
    /// Application name sent to providers that attribute traffic (OpenRouter `X-Title`).
    pub app_title: String,
    /// Retries after the first attempt for transient HTTP failures.
    pub max_retries: u32,
    /// Backoff before the first retry; doubled on each further retry.
    pub initial_backoff_ms: u64,
}

impl ProviderConfig {
    pub fn settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::DeepSeek => &self.deepseek,
            ProviderKind::OpenRouter => &self.openrouter,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            deepseek: ProviderSettings::defaults_for(ProviderKind::DeepSeek),
            openrouter: ProviderSettings::defaults_for(ProviderKind::OpenRouter),
            app_title: "Corsie".to_string(),
            max_retries: 3,
            initial_backoff_ms: 1000,
        }
    }
}
