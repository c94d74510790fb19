//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! Every section has its own defaults, so a partial file is always valid.

mod generation;
mod providers;
mod storage;

pub use generation::FileGenerationConfig;
pub use providers::{FileDeepSeekConfig, FileOpenRouterConfig, FileProvidersConfig};
pub use storage::FileStorageConfig;

use corsie_application::GenerationParams;
use corsie_domain::{ConfigIssue, ConfigIssueCode, ModelRef, ProviderConfig, ProviderKind};
use serde::{Deserialize, Serialize};

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Generation and title parameters
    pub generation: FileGenerationConfig,
    /// Provider endpoints and credentials
    pub providers: FileProvidersConfig,
    /// Conversation persistence
    pub storage: FileStorageConfig,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        issues.extend(self.generation.validate());
        issues.extend(self.providers.validate());

        // Default model must name a provider we can build a client for
        let default_model = self.generation.default_model.trim();
        if !default_model.is_empty() {
            let model_ref = ModelRef::parse(default_model);
            if ProviderKind::from_key(&model_ref.provider).is_none() {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::UnknownProvider {
                        provider: model_ref.provider.clone(),
                    },
                    format!(
                        "generation.default_model: unknown provider '{}' (expected deepseek or openrouter)",
                        model_ref.provider
                    ),
                ));
            }
        }

        issues
    }

    pub fn to_generation_params(&self) -> GenerationParams {
        let params = self.generation.to_generation_params();
        if params.default_model.is_empty() {
            return params.with_default_model(ModelRef::default().as_model_string());
        }
        params
    }

    pub fn to_provider_config(&self) -> ProviderConfig {
        self.providers.to_provider_config()
    }
}
