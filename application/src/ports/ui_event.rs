//! UI event types emitted by the generation core for presentation rendering
//!
//! These events form the output port from the application layer to the
//! presentation layer. They travel over an unbounded channel, so emitting
//! never blocks and a closed receiver is ignored.
//!
//! Events for one session arrive in the order they were emitted. Events of
//! different sessions may interleave.

use corsie_domain::Message;
use tokio::sync::mpsc;

/// Sending half of the presentation channel.
pub type PresentationSink = mpsc::UnboundedSender<UiEvent>;

/// Events emitted by the orchestrator and title scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// A message was appended (the user turn or the empty assistant placeholder)
    MessageAppended(Message),
    /// A generation was accepted for a session
    GenerationStarted { session_id: String },
    /// The accumulated text of a streaming assistant message
    ContentUpdated { message_id: String, text: String },
    /// The final text has been persisted
    GenerationFinished {
        session_id: String,
        message_id: String,
        final_text: String,
    },
    /// The generation failed; `message` is the user-visible notice
    GenerationError { session_id: String, message: String },
    /// The generation was cancelled; the partial text has been persisted
    GenerationCancelled {
        session_id: String,
        partial_text: String,
    },
    /// A session received a new title
    TitleChanged { session_id: String, title: String },
}

impl UiEvent {
    /// The session this event belongs to, when it names one directly.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            UiEvent::MessageAppended(message) => Some(&message.session_id),
            UiEvent::GenerationStarted { session_id }
            | UiEvent::GenerationFinished { session_id, .. }
            | UiEvent::GenerationError { session_id, .. }
            | UiEvent::GenerationCancelled { session_id, .. }
            | UiEvent::TitleChanged { session_id, .. } => Some(session_id),
            UiEvent::ContentUpdated { .. } => None,
        }
    }
}

/// Create a presentation channel.
pub fn presentation_channel() -> (PresentationSink, mpsc::UnboundedReceiver<UiEvent>) {
    mpsc::unbounded_channel()
}
