//! Model references and descriptors.
//!
//! A session stores its model as a single `provider/model` string. The
//! [`ModelRef`] value object splits that string back into its parts, and
//! [`ModelDescriptor`] describes what a provider says about a model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider used when a model string cannot be parsed.
pub const DEFAULT_PROVIDER: &str = "deepseek";

/// Model used when a model string cannot be parsed.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Provider whose model ids may themselves contain `/`.
pub const MULTI_SEGMENT_PROVIDER: &str = "openrouter";

/// A resolved `(provider, model)` pair (Value Object)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parse a `provider/model` composite string.
    ///
    /// Strings with fewer than two segments fall back to the default pair.
    /// For the multi-segment provider every segment after the first is part
    /// of the model id (`openrouter/anthropic/claude-3.5-sonnet`); for any
    /// other provider the model id is exactly the second segment.
    pub fn parse(model_string: &str) -> Self {
        let parts: Vec<&str> = model_string.split('/').collect();
        if parts.len() < 2 {
            return Self::default();
        }

        let provider = parts[0];
        let model = if provider.eq_ignore_ascii_case(MULTI_SEGMENT_PROVIDER) && parts.len() > 2 {
            parts[1..].join("/")
        } else {
            parts[1].to_string()
        };

        Self::new(provider, model)
    }

    /// The composite string stored on a session.
    pub fn as_model_string(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }

    /// Lower-cased provider name, used as a lookup key.
    pub fn provider_key(&self) -> String {
        self.provider.to_ascii_lowercase()
    }
}

impl Default for ModelRef {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDER, DEFAULT_MODEL)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// What a provider reports about one of its models (Value Object)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Display name of the provider (e.g. "DeepSeek")
    pub provider: String,
    /// Model id as sent on the wire
    pub model_id: String,
    /// Human readable name
    pub display_name: String,
    /// Maximum context size in tokens
    pub max_context: u32,
    pub supports_streaming: bool,
    /// Optional per-token cost
    pub cost_per_token: Option<f64>,
}

impl ModelDescriptor {
    /// The `provider/model` string a session would store to select this model.
    pub fn model_string(&self) -> String {
        format!("{}/{}", self.provider.to_ascii_lowercase(), self.model_id)
    }
}
