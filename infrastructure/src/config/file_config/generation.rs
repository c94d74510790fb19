//! Generation configuration from TOML (`[generation]` section)

use corsie_application::GenerationParams;
use corsie_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileGenerationConfig {
    /// Model for new sessions, as `provider/model`
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Trailing user/assistant messages sent as history
    pub context_messages: usize,
    /// Minimum spacing of streaming display updates
    pub update_interval_ms: u64,
    /// Wait after the first exchange before naming the session
    pub title_delay_ms: u64,
    pub title_temperature: f32,
    pub title_max_tokens: u32,
}

impl Default for FileGenerationConfig {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            default_model: params.default_model,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            context_messages: params.context_messages,
            update_interval_ms: params.update_interval.as_millis() as u64,
            title_delay_ms: params.title_delay.as_millis() as u64,
            title_temperature: params.title_temperature,
            title_max_tokens: params.title_max_tokens,
        }
    }
}

impl FileGenerationConfig {
    pub fn to_generation_params(&self) -> GenerationParams {
        GenerationParams {
            default_model: self.default_model.trim().to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            context_messages: self.context_messages,
            update_interval: Duration::from_millis(self.update_interval_ms),
            title_delay: Duration::from_millis(self.title_delay_ms),
            title_temperature: self.title_temperature,
            title_max_tokens: self.title_max_tokens,
        }
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.default_model.trim().is_empty() {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::EmptyValue {
                    field: "generation.default_model".to_string(),
                },
                "generation.default_model is empty, new sessions will use deepseek/deepseek-chat",
            ));
        }

        for (field, value) in [
            ("generation.max_tokens", self.max_tokens),
            ("generation.title_max_tokens", self.title_max_tokens),
        ] {
            if value == 0 {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::NotPositive {
                        field: field.to_string(),
                    },
                    format!("{field} must be greater than 0"),
                ));
            }
        }

        if self.context_messages == 0 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::NotPositive {
                    field: "generation.context_messages".to_string(),
                },
                "generation.context_messages is 0, only the system prompt will be sent",
            ));
        }

        for (field, value) in [
            ("generation.temperature", self.temperature),
            ("generation.title_temperature", self.title_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::TemperatureOutOfRange {
                        field: field.to_string(),
                        value,
                    },
                    format!("{field} = {value} is outside [0, 2]"),
                ));
            }
        }

        issues
    }
}
