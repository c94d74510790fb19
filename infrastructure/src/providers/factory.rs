//! Builds HTTP provider clients for the client registry.

use super::openai_compatible::OpenAiCompatibleClient;
use super::transport::{HttpTransport, RetryPolicy};
use corsie_application::{ClientFactory, GatewayError, ProviderClient};
use corsie_domain::{ModelDescriptor, ProviderConfig, ProviderKind, models_for};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Creates [`OpenAiCompatibleClient`]s for the supported providers.
///
/// All clients share one connection pool and retry policy.
pub struct HttpClientFactory {
    config: ProviderConfig,
    transport: Arc<HttpTransport>,
}

impl HttpClientFactory {
    pub fn new(config: ProviderConfig) -> Result<Self, GatewayError> {
        let policy = RetryPolicy::new(
            config.max_retries,
            Duration::from_millis(config.initial_backoff_ms),
        );
        Ok(Self {
            transport: Arc::new(HttpTransport::new(policy)?),
            config,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(
        &self,
        provider: &str,
        model: &str,
        credential: &str,
    ) -> Option<Arc<dyn ProviderClient>> {
        let kind = ProviderKind::from_key(provider)?;
        let client = OpenAiCompatibleClient::new(
            kind,
            model,
            credential,
            self.config.settings(kind),
            Arc::clone(&self.transport),
        );
        let client = match kind {
            ProviderKind::OpenRouter => client.with_app_title(self.config.app_title.clone()),
            ProviderKind::DeepSeek => client,
        };
        debug!(provider = kind.key(), model, endpoint = client.endpoint(), "Created provider client");
        Some(Arc::new(client))
    }

    fn models(&self, provider: &str) -> Vec<ModelDescriptor> {
        ProviderKind::from_key(provider)
            .map(models_for)
            .unwrap_or_default()
    }
}
