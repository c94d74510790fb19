//! Provider client port
//!
//! Defines the interface for talking to a chat-completion backend, and the
//! factory the [`ClientRegistry`](crate::use_cases::client_registry::ClientRegistry)
//! uses to build clients on demand.

use async_trait::async_trait;
use corsie_domain::{ChatMessage, CompletionResponse, ModelDescriptor, TokenUsage};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur while talking to a provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("No API key configured for provider '{0}'")]
    CredentialMissing(String),

    #[error("Connection error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Provider error: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("Malformed response: {0}")]
    MalformedStream(String),
}

impl GatewayError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        GatewayError::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Whether the HTTP layer may retry the request that produced this error.
    ///
    /// Only transport-class failures qualify. Semantic errors (bad model,
    /// bad key, unparseable payload) surface immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::RateLimited(_))
    }

    /// Short machine-readable tag used in transcripts.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::CredentialMissing(_) => "credential_missing",
            GatewayError::Transport(_) => "transport",
            GatewayError::Authentication(_) => "authentication",
            GatewayError::RateLimited(_) => "rate_limited",
            GatewayError::Upstream { .. } => "upstream",
            GatewayError::MalformedStream(_) => "malformed_stream",
        }
    }
}

/// Sampling parameters for a single request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionOptions {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self::new(0.7, 2048)
    }
}

/// An event in a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A text fragment, in generation order.
    Delta(String),
    /// The provider signalled the end of the response.
    Completed {
        finish_reason: Option<String>,
        usage: Option<TokenUsage>,
    },
    /// The stream ended abnormally. No further events follow.
    Error(GatewayError),
}

/// Handle for receiving streaming events from a provider.
///
/// Wraps an `mpsc::Receiver<StreamEvent>`. Dropping the handle stops the
/// producer at its next send.
pub struct StreamHandle {
    pub receiver: mpsc::Receiver<StreamEvent>,
}

impl StreamHandle {
    pub fn new(receiver: mpsc::Receiver<StreamEvent>) -> Self {
        Self { receiver }
    }

    /// Build a handle that replays a fixed list of events.
    pub fn from_events(events: Vec<StreamEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            // Capacity covers every event
            let _ = tx.try_send(event);
        }
        Self::new(rx)
    }

    /// Consume the stream and reassemble the full response.
    pub async fn collect(mut self) -> Result<CompletionResponse, GatewayError> {
        let mut response = CompletionResponse::default();
        while let Some(event) = self.receiver.recv().await {
            match event {
                StreamEvent::Delta(chunk) => response.content.push_str(&chunk),
                StreamEvent::Completed {
                    finish_reason,
                    usage,
                } => {
                    response.finish_reason = finish_reason;
                    response.usage = usage;
                    break;
                }
                StreamEvent::Error(e) => return Err(e),
            }
        }
        // Channel closed without Completed: return what we have
        Ok(response)
    }

    /// Consume the stream and collect all text into a single string.
    pub async fn collect_text(self) -> Result<String, GatewayError> {
        self.collect().await.map(|response| response.content)
    }
}

/// A chat-completion client bound to one provider and model.
///
/// Each call is independent: concurrent `stream` calls on the same client
/// never share fragments.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Metadata about the model this client talks to.
    fn describe(&self) -> ModelDescriptor;

    /// Open a streaming completion.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<StreamHandle, GatewayError>;

    /// Full, non-streaming completion.
    ///
    /// Default implementation drains [`stream`](Self::stream), so clients
    /// that only stream still satisfy the contract.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, GatewayError> {
        let handle = self.stream(messages, options).await?;
        let mut response = handle.collect().await?;
        response.model.get_or_insert_with(|| self.describe().model_id);
        Ok(response)
    }
}

/// Builds provider clients for the registry.
pub trait ClientFactory: Send + Sync {
    /// Create a client, or `None` if the provider is not supported.
    fn create(
        &self,
        provider: &str,
        model: &str,
        credential: &str,
    ) -> Option<Arc<dyn ProviderClient>>;

    /// The static model catalog of a provider (empty if unsupported).
    fn models(&self, provider: &str) -> Vec<ModelDescriptor>;
}
