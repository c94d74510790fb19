//! Chat-completion client for OpenAI-compatible HTTP APIs.
//!
//! DeepSeek and OpenRouter both expose `POST {base_url}/chat/completions`
//! with bearer auth. OpenRouter additionally receives an `X-Title` header
//! naming the application.

use super::sse::{SseDecoder, WireError, WireUsage, parse_chunk};
use super::transport::HttpTransport;
use async_trait::async_trait;
use corsie_application::{
    CompletionOptions, GatewayError, ProviderClient, StreamEvent, StreamHandle,
};
use corsie_domain::{
    ChatMessage, CompletionResponse, ModelDescriptor, ProviderKind, ProviderSettings, TokenUsage,
    profile_for,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Buffered stream events between the reader task and the consumer.
const STREAM_BUFFER: usize = 64;

/// A client bound to one provider endpoint, model and API key.
pub struct OpenAiCompatibleClient {
    kind: ProviderKind,
    model: String,
    api_key: String,
    endpoint: String,
    headers: Vec<(&'static str, String)>,
    transport: Arc<HttpTransport>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        kind: ProviderKind,
        model: impl Into<String>,
        api_key: impl Into<String>,
        settings: &ProviderSettings,
        transport: Arc<HttpTransport>,
    ) -> Self {
        Self {
            kind,
            model: model.into(),
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            headers: Vec::new(),
            transport,
        }
    }

    /// Attribute requests to an application (sent as `X-Title`).
    pub fn with_app_title(mut self, title: impl Into<String>) -> Self {
        self.headers.push(("X-Title", title.into()));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        stream: bool,
    ) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatibleClient {
    /// Provider-level figures; catalog details are served by
    /// [`ClientFactory::models`](corsie_application::ClientFactory::models).
    fn describe(&self) -> ModelDescriptor {
        let profile = profile_for(self.kind);
        ModelDescriptor {
            provider: self.kind.display_name().to_string(),
            model_id: self.model.clone(),
            display_name: self.model.clone(),
            max_context: profile.max_context,
            supports_streaming: true,
            cost_per_token: Some(profile.cost_per_token),
        }
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<StreamHandle, GatewayError> {
        let body = self.request_body(messages, options, true);
        debug!(
            provider = self.kind.key(),
            model = %self.model,
            messages = messages.len(),
            "Opening completion stream"
        );
        let response = self
            .transport
            .post_json(&self.endpoint, &self.api_key, &self.headers, &body)
            .await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(read_event_stream(response, tx));
        Ok(StreamHandle::new(rx))
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, GatewayError> {
        let body = self.request_body(messages, options, false);
        let response = self
            .transport
            .post_json(&self.endpoint, &self.api_key, &self.headers, &body)
            .await?;
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let completion: WireCompletion = serde_json::from_str(&text)
            .map_err(|e| GatewayError::MalformedStream(e.to_string()))?;
        completion.into_response(&self.model)
    }
}

// ==================== Streaming ====================

/// Whether the reader should keep going after a payload.
enum Flow {
    Continue,
    Stop,
}

#[derive(Default)]
struct StreamTail {
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
}

/// Reader task: turns the response body into [`StreamEvent`]s.
///
/// Ends on `[DONE]`, on the first error, at end of body, or as soon as the
/// receiving side is dropped.
async fn read_event_stream(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut tail = StreamTail::default();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Completion stream interrupted");
                let _ = tx
                    .send(StreamEvent::Error(GatewayError::Transport(e.to_string())))
                    .await;
                return;
            }
        };
        for payload in decoder.push(&bytes) {
            if let Flow::Stop = forward(&payload, &mut tail, &tx).await {
                return;
            }
        }
    }

    if let Some(payload) = decoder.finish()
        && let Flow::Stop = forward(&payload, &mut tail, &tx).await
    {
        return;
    }

    // Body ended without [DONE]
    let _ = tx
        .send(StreamEvent::Completed {
            finish_reason: tail.finish_reason,
            usage: tail.usage,
        })
        .await;
}

async fn forward(payload: &str, tail: &mut StreamTail, tx: &mpsc::Sender<StreamEvent>) -> Flow {
    let update = match parse_chunk(payload) {
        Ok(update) => update,
        Err(e) => {
            let _ = tx.send(StreamEvent::Error(e)).await;
            return Flow::Stop;
        }
    };

    if let Some(content) = update.content
        && tx.send(StreamEvent::Delta(content)).await.is_err()
    {
        return Flow::Stop;
    }
    if update.finish_reason.is_some() {
        tail.finish_reason = update.finish_reason;
    }
    if update.usage.is_some() {
        tail.usage = update.usage;
    }

    if update.done {
        let _ = tx
            .send(StreamEvent::Completed {
                finish_reason: tail.finish_reason.take(),
                usage: tail.usage.take(),
            })
            .await;
        return Flow::Stop;
    }
    Flow::Continue
}

// ==================== Non-streaming ====================

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCompletion {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

impl WireCompletion {
    fn into_response(self, requested_model: &str) -> Result<CompletionResponse, GatewayError> {
        if let Some(error) = self.error {
            return Err(error.into_gateway_error(None));
        }
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::MalformedStream("response has no choices".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            model: Some(self.model.unwrap_or_else(|| requested_model.to_string())),
            finish_reason: choice.finish_reason,
            usage: self.usage.map(TokenUsage::from),
        })
    }
}
