//! Provider configuration from TOML (`[providers]` section)

use corsie_domain::{ConfigIssue, ConfigIssueCode, ProviderConfig, ProviderKind, ProviderSettings};
use serde::{Deserialize, Serialize};

/// DeepSeek API provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileDeepSeekConfig {
    /// Environment variable name for the API key (default: "DEEPSEEK_API_KEY").
    pub api_key_env: String,
    /// Direct API key (prefer the env var).
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for FileDeepSeekConfig {
    fn default() -> Self {
        let settings = ProviderSettings::defaults_for(ProviderKind::DeepSeek);
        Self {
            api_key_env: settings.api_key_env,
            api_key: None,
            base_url: settings.base_url,
        }
    }
}

/// OpenRouter API provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOpenRouterConfig {
    /// Environment variable name for the API key (default: "OPENROUTER_API_KEY").
    pub api_key_env: String,
    /// Direct API key (prefer the env var).
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for FileOpenRouterConfig {
    fn default() -> Self {
        let settings = ProviderSettings::defaults_for(ProviderKind::OpenRouter);
        Self {
            api_key_env: settings.api_key_env,
            api_key: None,
            base_url: settings.base_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProvidersConfig {
    pub deepseek: FileDeepSeekConfig,
    pub openrouter: FileOpenRouterConfig,
    /// Sent to OpenRouter as `X-Title`
    pub app_title: String,
    /// Retries for connection errors and 429/5xx responses
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for FileProvidersConfig {
    fn default() -> Self {
        let config = ProviderConfig::default();
        Self {
            deepseek: FileDeepSeekConfig::default(),
            openrouter: FileOpenRouterConfig::default(),
            app_title: config.app_title,
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
        }
    }
}

impl FileProvidersConfig {
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            deepseek: ProviderSettings {
                api_key_env: self.deepseek.api_key_env.clone(),
                api_key: self.deepseek.api_key.clone(),
                base_url: self.deepseek.base_url.clone(),
            },
            openrouter: ProviderSettings {
                api_key_env: self.openrouter.api_key_env.clone(),
                api_key: self.openrouter.api_key.clone(),
                base_url: self.openrouter.base_url.clone(),
            },
            app_title: self.app_title.clone(),
            max_retries: self.max_retries,
            initial_backoff_ms: self.initial_backoff_ms,
        }
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        for (field, value) in [
            ("providers.deepseek.base_url", &self.deepseek.base_url),
            ("providers.openrouter.base_url", &self.openrouter.base_url),
        ] {
            if value.trim().is_empty() {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::EmptyValue {
                        field: field.to_string(),
                    },
                    format!("{field} cannot be empty"),
                ));
            }
        }
        issues
    }
}
