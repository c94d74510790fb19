//! Conversation store port
//!
//! Persistence for sessions and their messages. Sessions list most recently
//! updated first; messages list in append order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corsie_domain::{Message, MessageMetadata, NewSession, Role, Session, SessionUpdate};
use thiserror::Error;

/// Errors that can occur in a conversation store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Counts removed by [`ConversationStore::purge_before`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub sessions_deleted: usize,
    pub messages_deleted: usize,
}

/// Store-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_sessions: usize,
    pub total_messages: usize,
    pub first_session_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Sessions ordered by `updated_at`, newest first.
    async fn list_sessions(
        &self,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Session>, StoreError>;

    /// Apply an update and bump `updated_at`.
    async fn update_session(&self, id: &str, update: SessionUpdate)
    -> Result<Session, StoreError>;

    /// Delete a session and all of its messages. Returns false if it did not exist.
    async fn delete_session(&self, id: &str) -> Result<bool, StoreError>;

    /// Append a message and bump the owning session's `updated_at`.
    async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<Message, StoreError>;

    /// Messages of a session in append order.
    async fn list_messages(
        &self,
        session_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError>;

    /// Replace a message's content, and its metadata when given.
    async fn update_message(
        &self,
        id: &str,
        content: &str,
        metadata: Option<MessageMetadata>,
    ) -> Result<(), StoreError>;

    async fn delete_message(&self, id: &str) -> Result<bool, StoreError>;

    async fn count_messages(&self, session_id: &str) -> Result<usize, StoreError>;

    /// Delete messages older than `cutoff`, then sessions last updated
    /// before `cutoff` that no longer have any messages.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
