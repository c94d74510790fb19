//! Infrastructure layer for corsie
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: HTTP provider clients, the conversation
//! store, credential lookup, the JSONL transcript and configuration
//! file loading.

pub mod config;
pub mod logging;
pub mod providers;
pub mod secrets;
pub mod store;

// Re-export commonly used types
pub use config::{ConfigError, ConfigLoader, FileConfig};
pub use logging::JsonlTranscript;
pub use providers::{HttpClientFactory, HttpTransport, OpenAiCompatibleClient, RetryPolicy};
pub use secrets::ConfigSecretStore;
pub use store::InMemoryConversationStore;
