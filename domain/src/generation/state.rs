//! Generation state machine.
//!
//! ```text
//! Idle → Sending → Streaming → Finalizing → Idle
//!           │          │
//!           └──────────┴──→ Error → Idle
//!                      └──→ Cancelled → Idle
//! ```

use serde::{Deserialize, Serialize};

/// Where a session's generation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    /// No generation in flight
    #[default]
    Idle,
    /// Request issued, no fragment received yet
    Sending,
    /// At least one fragment received
    Streaming,
    /// Stream ended, final text being persisted
    Finalizing,
    /// The generation failed
    Error,
    /// The generation was cancelled
    Cancelled,
}

impl GenerationState {
    pub fn as_str(&self) -> &str {
        match self {
            GenerationState::Idle => "idle",
            GenerationState::Sending => "sending",
            GenerationState::Streaming => "streaming",
            GenerationState::Finalizing => "finalizing",
            GenerationState::Error => "error",
            GenerationState::Cancelled => "cancelled",
        }
    }

    /// Whether the generation can still produce text and be cancelled.
    ///
    /// `Error` and `Cancelled` are terminal. The session stays reserved in
    /// them until the outcome is saved and it returns to `Idle`.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            GenerationState::Sending | GenerationState::Streaming | GenerationState::Finalizing
        )
    }

    /// Check whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: GenerationState) -> bool {
        use GenerationState::*;
        matches!(
            (self, next),
            (Idle, Sending)
                | (Sending, Streaming)
                | (Sending, Finalizing)
                | (Sending, Error)
                | (Sending, Cancelled)
                | (Streaming, Streaming)
                | (Streaming, Finalizing)
                | (Streaming, Error)
                | (Streaming, Cancelled)
                | (Finalizing, Idle)
                | (Finalizing, Error)
                | (Error, Idle)
                | (Cancelled, Idle)
        )
    }
}

impl std::fmt::Display for GenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
