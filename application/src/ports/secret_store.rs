//! Secret store port
//!
//! Resolves API credentials by provider name.

/// Source of provider credentials.
pub trait SecretStore: Send + Sync {
    /// The credential for a provider (case-insensitive name), if one is set.
    fn get_credential(&self, provider: &str) -> Option<String>;

    /// Lower-case names of every provider with a credential.
    fn configured_providers(&self) -> Vec<String>;
}

/// Secret store with no credentials at all.
pub struct NoSecrets;

impl SecretStore for NoSecrets {
    fn get_credential(&self, _provider: &str) -> Option<String> {
        None
    }

    fn configured_providers(&self) -> Vec<String> {
        Vec::new()
    }
}
