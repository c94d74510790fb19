//! Generation parameters.
//!
//! [`GenerationParams`] groups the static parameters that control the
//! [`GenerationOrchestrator`](crate::use_cases::generate_response::GenerationOrchestrator)
//! and title synthesis. These are application-layer concerns, not domain policy.

use crate::ports::llm_gateway::CompletionOptions;
use corsie_domain::{DEFAULT_MODEL, DEFAULT_PROVIDER};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Model string given to new sessions.
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Trailing user/assistant messages sent as history.
    pub context_messages: usize,
    /// Minimum spacing of streaming content updates.
    pub update_interval: Duration,
    /// Delay between the first exchange and title synthesis.
    pub title_delay: Duration,
    pub title_temperature: f32,
    pub title_max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            default_model: format!("{DEFAULT_PROVIDER}/{DEFAULT_MODEL}"),
            temperature: 0.7,
            max_tokens: 2048,
            context_messages: 20,
            update_interval: Duration::from_millis(100),
            title_delay: Duration::from_secs(2),
            title_temperature: 0.5,
            title_max_tokens: 50,
        }
    }
}

impl GenerationParams {
    // ==================== Builder Methods ====================

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_context_messages(mut self, count: usize) -> Self {
        self.context_messages = count;
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_title_delay(mut self, delay: Duration) -> Self {
        self.title_delay = delay;
        self
    }

    // ==================== Derived Options ====================

    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions::new(self.temperature, self.max_tokens)
    }

    pub fn title_options(&self) -> CompletionOptions {
        CompletionOptions::new(self.title_temperature, self.title_max_tokens)
    }
}
