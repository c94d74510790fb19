//! Session domain entities

use crate::core::error::DomainError;
use crate::core::model::ModelRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Title given to every new session until it is renamed.
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Whether messages with this role are sent back to the provider as history.
    pub fn is_conversational(&self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(DomainError::InvalidRole(other.to_string())),
        }
    }
}

/// Token counts reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Optional structured data attached to a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Set when the generation that produced this message failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A message in a conversation (Entity)
///
/// Assistant messages are created empty and filled in while a response
/// streams; their content is frozen once the generation ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

/// One independent conversation thread (Entity)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Composite `provider/model` string
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Session {
    pub fn model_ref(&self) -> ModelRef {
        ModelRef::parse(&self.model)
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }

    /// The system prompt, if one is set and not blank.
    pub fn effective_system_prompt(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
    }
}

/// Fields used when creating a session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub title: String,
    pub model: String,
    pub system_prompt: Option<String>,
}

impl NewSession {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            model: model.into(),
            system_prompt: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

impl Default for NewSession {
    fn default() -> Self {
        Self::new(ModelRef::default().as_model_string())
    }
}

/// Partial update of a session's mutable fields.
///
/// Every update bumps `updated_at`, so an empty update acts as a touch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub title: Option<String>,
    pub model: Option<String>,
    /// `Some(None)` clears the system prompt.
    pub system_prompt: Option<Option<String>>,
}

impl SessionUpdate {
    pub fn touch() -> Self {
        Self::default()
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn system_prompt(prompt: Option<String>) -> Self {
        Self {
            system_prompt: Some(prompt),
            ..Self::default()
        }
    }

    /// Apply the update to a session, stamping `now` as the update time.
    pub fn apply_to(&self, session: &mut Session, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            session.title = title.clone();
        }
        if let Some(model) = &self.model {
            session.model = model.clone();
        }
        if let Some(prompt) = &self.system_prompt {
            session.system_prompt = prompt.clone();
        }
        session.updated_at = now;
    }
}
