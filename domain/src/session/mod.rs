//! Conversation session domain.
//!
//! - [`entities::Session`] - one conversation thread
//! - [`entities::Message`] - a single message within a session
//! - [`context::build_context`] - history selection for a provider request

pub mod context;
pub mod entities;
pub mod response;
