//! Building the message list sent to a provider.

use super::entities::{Message, Role, Session};
use serde::{Deserialize, Serialize};

/// A `{role, content}` pair as sent on the wire (Value Object)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self::new(message.role, message.content.clone())
    }
}

/// Select the history sent to the provider for a session.
///
/// `messages` must be in timestamp order. The result starts with the
/// session's system prompt when one is set, followed by the most recent
/// `max_messages` user and assistant messages. The message with id
/// `exclude_id` (the pending assistant placeholder) is skipped, as are
/// assistant messages that never received content.
pub fn build_context(
    session: &Session,
    messages: &[Message],
    max_messages: usize,
    exclude_id: Option<&str>,
) -> Vec<ChatMessage> {
    let history: Vec<&Message> = messages
        .iter()
        .filter(|m| m.role.is_conversational())
        .filter(|m| Some(m.id.as_str()) != exclude_id)
        .filter(|m| !(m.role == Role::Assistant && m.content.is_empty()))
        .collect();

    let skip = history.len().saturating_sub(max_messages);

    session
        .effective_system_prompt()
        .map(ChatMessage::system)
        .into_iter()
        .chain(history.into_iter().skip(skip).map(ChatMessage::from))
        .collect()
}
