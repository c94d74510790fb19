//! Automatic session titles.
//!
//! A session is renamed once, after its first exchange, using a short
//! title asked from the session's own model.

use crate::session::entities::{Message, Role, Session};

/// Message count at which a default-titled session gets a generated title.
pub const TITLE_TRIGGER_MESSAGE_COUNT: usize = 2;

/// How many leading messages are searched for the first user message.
pub const TITLE_SOURCE_WINDOW: usize = 10;

const TITLE_LABELS: [&str; 4] = ["Title:", "Title：", "标题:", "标题："];

const QUOTE_CHARS: [char; 8] = ['"', '\'', '“', '”', '‘', '’', '「', '」'];

/// Whether a successful generation should schedule title synthesis.
///
/// True only when the session holds exactly one user and one assistant
/// message and still carries the default title.
pub fn should_trigger_title(session: &Session, message_count: usize) -> bool {
    message_count == TITLE_TRIGGER_MESSAGE_COUNT && session.has_default_title()
}

/// Find the message a title is derived from.
pub fn title_source(messages: &[Message]) -> Option<&Message> {
    messages
        .iter()
        .take(TITLE_SOURCE_WINDOW)
        .find(|m| m.role == Role::User && !m.content.trim().is_empty())
}

/// Build the instruction sent to the model.
pub fn build_title_prompt(user_message: &str) -> String {
    format!(
        "Write a concise title of no more than 10 words for a conversation that starts with \
         the user question below. Reply with the title only, without quotes, labels or \
         trailing punctuation.\n\nUser question: {user_message}"
    )
}

/// Strip quoting and a leading label from a model-produced title.
///
/// Returns `None` if nothing is left.
pub fn clean_title(raw: &str) -> Option<String> {
    let stripped: String = raw.chars().filter(|c| !QUOTE_CHARS.contains(c)).collect();
    let trimmed = stripped.trim_start();

    let body = TITLE_LABELS
        .iter()
        .find_map(|label| {
            trimmed
                .get(..label.len())
                .filter(|head| head.eq_ignore_ascii_case(label))
                .map(|_| &trimmed[label.len()..])
        })
        .unwrap_or(trimmed);

    // Titles are single line
    let title = body.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(title.to_string())
}
