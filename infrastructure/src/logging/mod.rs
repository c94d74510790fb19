//! Logging infrastructure: the conversation transcript writer.
//!
//! Provides [`JsonlTranscript`], a JSONL file writer that implements the
//! [`ConversationLogger`](corsie_application::ConversationLogger) port.

mod jsonl_logger;

pub use jsonl_logger::JsonlTranscript;
