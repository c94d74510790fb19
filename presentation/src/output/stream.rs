//! Incremental rendering of streamed assistant replies.

use colored::Colorize;
use corsie_application::UiEvent;
use std::collections::HashMap;

/// Turns [`UiEvent`]s into terminal text.
///
/// Content updates carry the whole accumulated text, so the renderer
/// remembers what it already printed per message and only emits the new
/// suffix.
#[derive(Debug, Default)]
pub struct StreamRenderer {
    printed: HashMap<String, String>,
}

impl StreamRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to write for an event, if any.
    pub fn render(&mut self, event: &UiEvent) -> Option<String> {
        match event {
            UiEvent::MessageAppended(_) | UiEvent::GenerationStarted { .. } => None,
            UiEvent::ContentUpdated { message_id, text } => {
                non_empty(self.advance(message_id, text))
            }
            UiEvent::GenerationFinished {
                message_id,
                final_text,
                ..
            } => {
                let rest = self.advance(message_id, final_text);
                self.printed.remove(message_id);
                Some(format!("{rest}\n"))
            }
            // The error notice already arrived as message content
            UiEvent::GenerationError { .. } => {
                self.printed.clear();
                Some(format!("\n{}\n", "[failed]".red()))
            }
            UiEvent::GenerationCancelled { .. } => {
                self.printed.clear();
                Some(format!("\n{}\n", "[cancelled]".yellow()))
            }
            UiEvent::TitleChanged { title, .. } => {
                Some(format!("{}\n", format!("Session titled \"{title}\"").dimmed()))
            }
        }
    }

    /// Record `text` as printed and return the part not shown yet.
    fn advance(&mut self, message_id: &str, text: &str) -> String {
        let printed = self.printed.entry(message_id.to_string()).or_default();
        let rest = match text.strip_prefix(printed.as_str()) {
            Some(rest) => rest.to_string(),
            // Content was rewritten rather than extended
            None => format!("\n{text}"),
        };
        *printed = text.to_string();
        rest
    }
}

/// Whether an event ends the generation of `session_id`.
pub fn is_terminal(event: &UiEvent, session_id: &str) -> bool {
    matches!(
        event,
        UiEvent::GenerationFinished { .. }
            | UiEvent::GenerationError { .. }
            | UiEvent::GenerationCancelled { .. }
    ) && event.session_id() == Some(session_id)
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}
