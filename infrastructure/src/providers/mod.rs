//! Provider clients for OpenAI-compatible chat APIs.

pub mod factory;
pub mod openai_compatible;
pub mod sse;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_server;

pub use factory::HttpClientFactory;
pub use openai_compatible::OpenAiCompatibleClient;
pub use transport::{HttpTransport, RetryPolicy};
