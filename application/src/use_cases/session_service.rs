//! Session service.
//!
//! Front for the [`ConversationStore`] used by the orchestrator, the title
//! scheduler and the presentation layer. Keeps an in-memory mirror of
//! recently read sessions and tracks which session is currently selected.

use crate::ports::conversation_store::{ConversationStore, PurgeReport, StoreError, StoreStats};
use chrono::{DateTime, Days, Local, Utc};
use corsie_domain::{
    ChatMessage, Message, NewSession, Role, Session, SessionUpdate, build_context,
};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Per-session figures shown by `/summary`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub title: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub total_characters: usize,
    pub has_system_prompt: bool,
}

pub struct SessionService {
    store: Arc<dyn ConversationStore>,
    default_model: String,
    cache: Mutex<HashMap<String, Session>>,
    current: Mutex<Option<String>>,
}

impl SessionService {
    pub fn new(store: Arc<dyn ConversationStore>, default_model: impl Into<String>) -> Self {
        Self {
            store,
            default_model: default_model.into(),
            cache: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remember(&self, session: &Session) {
        self.cache().insert(session.id.clone(), session.clone());
    }

    fn forget(&self, id: &str) {
        self.cache().remove(id);
        let mut current = self.current_slot();
        if current.as_deref() == Some(id) {
            *current = None;
        }
    }

    // ==================== Sessions ====================

    /// Create a session and make it the current one.
    pub async fn create_session(
        &self,
        title: Option<String>,
        model: Option<String>,
        system_prompt: Option<String>,
    ) -> Result<Session, StoreError> {
        let mut new = NewSession::new(model.unwrap_or_else(|| self.default_model.clone()));
        if let Some(title) = title {
            new = new.with_title(title);
        }
        if let Some(prompt) = system_prompt {
            new = new.with_system_prompt(prompt);
        }

        let session = self.store.create_session(new).await?;
        info!("Created session {} ({})", session.id, session.model);
        self.remember(&session);
        *self.current_slot() = Some(session.id.clone());
        Ok(session)
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.current_slot().clone()
    }

    pub async fn current_session(&self) -> Result<Option<Session>, StoreError> {
        match self.current_session_id() {
            Some(id) => self.get_session(&id).await,
            None => Ok(None),
        }
    }

    /// Select an existing session.
    pub async fn switch_to(&self, id: &str) -> Result<Session, StoreError> {
        let session = self
            .get_session(id)
            .await?
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
        debug!("Switched to session {}", id);
        *self.current_slot() = Some(session.id.clone());
        Ok(session)
    }

    /// Read a session, serving repeated reads from the cache.
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        if let Some(session) = self.cache().get(id) {
            return Ok(Some(session.clone()));
        }
        let session = self.store.get_session(id).await?;
        if let Some(session) = &session {
            self.remember(session);
        }
        Ok(session)
    }

    /// Sessions, most recently updated first.
    pub async fn list_sessions(
        &self,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Session>, StoreError> {
        let sessions = self.store.list_sessions(limit, offset).await?;
        let mut cache = self.cache();
        for session in &sessions {
            cache.insert(session.id.clone(), session.clone());
        }
        Ok(sessions)
    }

    async fn update(&self, id: &str, update: SessionUpdate) -> Result<Session, StoreError> {
        let result = self.store.update_session(id, update).await;
        match &result {
            Ok(session) => self.remember(session),
            Err(StoreError::SessionNotFound(_)) => self.forget(id),
            Err(_) => {}
        }
        result
    }

    pub async fn update_title(&self, id: &str, title: &str) -> Result<Session, StoreError> {
        self.update(id, SessionUpdate::title(title)).await
    }

    pub async fn update_model(&self, id: &str, model: &str) -> Result<Session, StoreError> {
        self.update(id, SessionUpdate::model(model)).await
    }

    /// Set or clear (`None` or blank) the system prompt.
    pub async fn update_system_prompt(
        &self,
        id: &str,
        prompt: Option<String>,
    ) -> Result<Session, StoreError> {
        let prompt = prompt.filter(|p| !p.trim().is_empty());
        self.update(id, SessionUpdate::system_prompt(prompt)).await
    }

    /// Bump a session's `updated_at`.
    pub async fn touch(&self, id: &str) -> Result<Session, StoreError> {
        self.update(id, SessionUpdate::touch()).await
    }

    /// Delete a session and its messages.
    pub async fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self.store.delete_session(id).await?;
        self.forget(id);
        if deleted {
            info!("Deleted session {}", id);
        }
        Ok(deleted)
    }

    // ==================== Messages ====================

    pub async fn messages(
        &self,
        id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        self.store.list_messages(id, limit, offset).await
    }

    pub async fn message_count(&self, id: &str) -> Result<usize, StoreError> {
        self.store.count_messages(id).await
    }

    /// History to send for the next turn of a session.
    pub async fn conversation_context(
        &self,
        id: &str,
        max_messages: usize,
        exclude_id: Option<&str>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let session = self
            .get_session(id)
            .await?
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
        let messages = self.store.list_messages(id, None, 0).await?;
        Ok(build_context(&session, &messages, max_messages, exclude_id))
    }

    /// Delete every message of a session, keeping the session itself.
    pub async fn clear_messages(&self, id: &str) -> Result<usize, StoreError> {
        let messages = self.store.list_messages(id, None, 0).await?;
        let mut deleted = 0;
        for message in &messages {
            if self.store.delete_message(&message.id).await? {
                deleted += 1;
            }
        }
        self.touch(id).await?;
        debug!("Cleared {} messages from session {}", deleted, id);
        Ok(deleted)
    }

    // ==================== Reports ====================

    /// Render a session as Markdown, or `None` if it does not exist.
    pub async fn export_markdown(&self, id: &str) -> Result<Option<String>, StoreError> {
        let Some(session) = self.get_session(id).await? else {
            return Ok(None);
        };
        let messages = self.store.list_messages(id, None, 0).await?;

        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", session.title);
        let _ = writeln!(out, "**Created**: {}", format_local(session.created_at));
        let _ = writeln!(out, "**Model**: {}", session.model);
        if let Some(prompt) = session.effective_system_prompt() {
            let _ = writeln!(out, "**System Prompt**: {}", prompt);
        }
        out.push_str("\n---\n\n");

        for message in &messages {
            let _ = writeln!(out, "## {}\n", role_heading(message.role));
            let _ = writeln!(out, "{}\n", message.content);
            let _ = writeln!(out, "*{}*\n", format_local(message.timestamp));
            out.push_str("---\n\n");
        }
        Ok(Some(out))
    }

    pub async fn summary(&self, id: &str) -> Result<Option<SessionSummary>, StoreError> {
        let Some(session) = self.get_session(id).await? else {
            return Ok(None);
        };
        let messages = self.store.list_messages(id, None, 0).await?;
        let count_role = |role: Role| messages.iter().filter(|m| m.role == role).count();

        Ok(Some(SessionSummary {
            user_messages: count_role(Role::User),
            assistant_messages: count_role(Role::Assistant),
            total_messages: messages.len(),
            total_characters: messages.iter().map(|m| m.content.chars().count()).sum(),
            has_system_prompt: session.effective_system_prompt().is_some(),
            session_id: session.id,
            title: session.title,
            model: session.model,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }))
    }

    /// Delete every session without messages, except the current one.
    pub async fn cleanup_empty_sessions(&self) -> Result<usize, StoreError> {
        let current = self.current_session_id();
        let mut deleted = 0;
        for session in self.store.list_sessions(None, 0).await? {
            if current.as_deref() == Some(session.id.as_str()) {
                continue;
            }
            if self.store.count_messages(&session.id).await? == 0
                && self.delete_session(&session.id).await?
            {
                deleted += 1;
            }
        }
        info!("Removed {} empty sessions", deleted);
        Ok(deleted)
    }

    /// Delete data older than local midnight `days` days ago.
    pub async fn cleanup_old_data(&self, days: u32) -> Result<PurgeReport, StoreError> {
        let cutoff = cleanup_cutoff(Local::now(), days);
        let report = self.store.purge_before(cutoff).await?;
        info!(
            "Purged {} messages and {} sessions older than {}",
            report.messages_deleted, report.sessions_deleted, cutoff
        );

        self.cache().clear();
        if let Some(id) = self.current_session_id()
            && self.store.get_session(&id).await?.is_none()
        {
            self.forget(&id);
        }
        Ok(report)
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.store.stats().await
    }
}

/// Local midnight `days` calendar days before `now`, in UTC.
pub fn cleanup_cutoff(now: DateTime<Local>, days: u32) -> DateTime<Utc> {
    now.date_naive()
        .checked_sub_days(Days::new(u64::from(days)))
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc) - chrono::Duration::days(i64::from(days)))
}

fn role_heading(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System => "System",
    }
}

fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}
