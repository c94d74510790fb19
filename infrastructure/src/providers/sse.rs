//! Server-sent event decoding for OpenAI-compatible chat streams.
//!
//! A stream body looks like:
//!
//! ```text
//! : keep-alive
//! data: {"choices":[{"delta":{"content":"Hi"}}]}
//!
//! data: {"choices":[{"delta":{},"finish_reason":"stop"}]}
//!
//! data: [DONE]
//! ```

use corsie_application::GatewayError;
use corsie_domain::TokenUsage;
use serde::Deserialize;

/// Splits a byte stream into SSE `data:` payloads.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning the payloads of every completed line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&String::from_utf8_lossy(&line)) {
                payloads.push(data.to_string());
            }
        }
        payloads
    }

    /// Flush a final line that had no trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&String::from_utf8_lossy(&rest)).map(str::to_string)
    }
}

/// The payload of a `data:` line, or `None` for comments, blank lines and
/// other fields.
fn data_payload(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    (!data.is_empty()).then_some(data)
}

// ==================== Wire types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl WireError {
    pub(crate) fn into_gateway_error(self, status: Option<u16>) -> GatewayError {
        let status = status.or_else(|| {
            self.code
                .as_ref()
                .and_then(|c| c.as_u64())
                .and_then(|c| u16::try_from(c).ok())
        });
        let message = self
            .message
            .unwrap_or_else(|| "unknown provider error".to_string());
        GatewayError::upstream(status, message)
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    #[serde(default)]
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

/// What one `data:` payload contributed to the response.
#[derive(Debug, Default, PartialEq)]
pub struct ChunkUpdate {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    /// The `[DONE]` sentinel was seen
    pub done: bool,
}

/// Interpret a single `data:` payload.
///
/// An in-band `error` object becomes [`GatewayError::Upstream`]; anything
/// that is not valid chunk JSON becomes [`GatewayError::MalformedStream`].
pub fn parse_chunk(data: &str) -> Result<ChunkUpdate, GatewayError> {
    if data.trim() == "[DONE]" {
        return Ok(ChunkUpdate {
            done: true,
            ..ChunkUpdate::default()
        });
    }

    let chunk: WireStreamChunk = serde_json::from_str(data)
        .map_err(|e| GatewayError::MalformedStream(format!("{e}: {data}")))?;
    if let Some(error) = chunk.error {
        return Err(error.into_gateway_error(None));
    }

    let mut update = ChunkUpdate {
        usage: chunk.usage.map(TokenUsage::from),
        ..ChunkUpdate::default()
    };
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            update.content.get_or_insert_with(String::new).push_str(&content);
        }
        if choice.finish_reason.is_some() {
            update.finish_reason = choice.finish_reason;
        }
    }
    Ok(update)
}
