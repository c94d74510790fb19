//! Client registry.
//!
//! Caches one [`ProviderClient`] per `provider/model` pair. Clients are
//! built lazily from the [`SecretStore`] credential through a
//! [`ClientFactory`]; a missing credential means no client, not an error.

use crate::ports::llm_gateway::{ClientFactory, ProviderClient};
use crate::ports::secret_store::SecretStore;
use corsie_domain::ModelDescriptor;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub struct ClientRegistry {
    factory: Arc<dyn ClientFactory>,
    secrets: Arc<dyn SecretStore>,
    clients: Mutex<HashMap<String, Arc<dyn ProviderClient>>>,
}

impl ClientRegistry {
    pub fn new(factory: Arc<dyn ClientFactory>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            factory,
            secrets,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(provider: &str, model: &str) -> String {
        format!("{}/{}", provider.to_ascii_lowercase(), model)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn ProviderClient>>> {
        // The map stays consistent even if a holder panicked
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get the client for `provider`/`model`, building it on first use.
    ///
    /// The cache lock is held across construction, so concurrent first
    /// requests for one key build a single client.
    pub fn get(&self, provider: &str, model: &str) -> Option<Arc<dyn ProviderClient>> {
        let key = Self::cache_key(provider, model);
        let mut clients = self.lock();
        if let Some(client) = clients.get(&key) {
            return Some(client.clone());
        }

        let Some(credential) = self.secrets.get_credential(provider) else {
            debug!("No credential for provider '{}'", provider);
            return None;
        };
        let client = self.factory.create(provider, model, &credential)?;

        debug!("Created client for {}", key);
        clients.insert(key, client.clone());
        Some(client)
    }

    /// Drop every cached client (after credentials change).
    pub fn clear(&self) {
        let mut clients = self.lock();
        debug!("Clearing {} cached clients", clients.len());
        clients.clear();
    }

    pub fn cached_count(&self) -> usize {
        self.lock().len()
    }

    /// Catalog entries of every provider that has a credential.
    pub fn available_models(&self) -> Vec<ModelDescriptor> {
        self.secrets
            .configured_providers()
            .iter()
            .flat_map(|provider| self.factory.models(provider))
            .collect()
    }
}
