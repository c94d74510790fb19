//! Credential resolution from provider configuration.

use corsie_application::SecretStore;
use corsie_domain::{ProviderConfig, ProviderKind};

/// Resolves API keys from the provider config: the direct `api_key` wins,
/// otherwise the variable named by `api_key_env` is read.
///
/// Blank values count as absent.
pub struct ConfigSecretStore {
    config: ProviderConfig,
    env: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl ConfigSecretStore {
    /// Read environment variables from the process environment.
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_env(config, |name| std::env::var(name).ok())
    }

    /// Use a custom environment lookup.
    pub fn with_env(
        config: ProviderConfig,
        env: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            env: Box::new(env),
        }
    }

    fn resolve(&self, kind: ProviderKind) -> Option<String> {
        let settings = self.config.settings(kind);
        non_blank(settings.api_key.clone())
            .or_else(|| non_blank((self.env)(&settings.api_key_env)))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SecretStore for ConfigSecretStore {
    fn get_credential(&self, provider: &str) -> Option<String> {
        ProviderKind::from_key(provider).and_then(|kind| self.resolve(kind))
    }

    fn configured_providers(&self) -> Vec<String> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.resolve(*kind).is_some())
            .map(|kind| kind.key().to_string())
            .collect()
    }
}
