//! Application layer for corsie
//!
//! This crate contains the generation orchestrator, session and title
//! services, port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::GenerationParams;
pub use ports::{
    conversation_logger::{ConversationEvent, ConversationLogger, NoConversationLogger},
    conversation_store::{ConversationStore, PurgeReport, StoreError, StoreStats},
    llm_gateway::{
        ClientFactory, CompletionOptions, GatewayError, ProviderClient, StreamEvent, StreamHandle,
    },
    secret_store::{NoSecrets, SecretStore},
    ui_event::{PresentationSink, UiEvent, presentation_channel},
};
pub use use_cases::client_registry::ClientRegistry;
pub use use_cases::generate_response::{
    GenerationFailure, GenerationOrchestrator, GenerationOutcome, GenerationTicket, SubmitError,
};
pub use use_cases::session_service::{SessionService, SessionSummary};
pub use use_cases::synthesize_title::{TitleScheduler, TitleSynthesizer};
