//! Domain layer for corsie
//!
//! This crate contains the conversation model and the rules that do not
//! depend on I/O: model string parsing, history selection, the generation
//! state machine and title clean-up.
//! It has no dependencies on infrastructure or presentation concerns.

pub mod config;
pub mod core;
pub mod generation;
pub mod providers;
pub mod session;
pub mod title;
pub mod util;

// Re-export commonly used types
pub use config::{ConfigIssue, ConfigIssueCode, Severity};
pub use core::{
    error::DomainError,
    model::{DEFAULT_MODEL, DEFAULT_PROVIDER, ModelDescriptor, ModelRef},
};
pub use generation::state::GenerationState;
pub use providers::{
    ProviderConfig, ProviderKind, ProviderSettings,
    catalog::{ProviderProfile, find_model, models_for, profile_for},
};
pub use session::{
    context::{ChatMessage, build_context},
    entities::{
        DEFAULT_TITLE, Message, MessageMetadata, NewSession, Role, Session, SessionUpdate,
        TokenUsage,
    },
    response::CompletionResponse,
};
pub use title::{build_title_prompt, clean_title, should_trigger_title, title_source};
