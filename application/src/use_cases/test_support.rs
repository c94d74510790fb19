//! Shared test doubles for the use case tests.

use crate::ports::conversation_store::{ConversationStore, PurgeReport, StoreError, StoreStats};
use crate::ports::llm_gateway::{
    ClientFactory, CompletionOptions, GatewayError, ProviderClient, StreamEvent, StreamHandle,
};
use crate::ports::secret_store::SecretStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corsie_domain::{
    ChatMessage, CompletionResponse, Message, MessageMetadata, ModelDescriptor, NewSession, Role,
    Session, SessionUpdate,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};

// ==================== Store ====================

#[derive(Default)]
struct StoreState {
    sessions: Vec<Session>,
    messages: Vec<Message>,
    next_id: usize,
}

/// Vec-backed store with sequential ids.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_id(state: &mut StoreState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}{}", state.next_id)
    }

    pub fn message(&self, id: &str) -> Option<Message> {
        let state = self.state.lock().unwrap();
        state.messages.iter().find(|m| m.id == id).cloned()
    }

    /// Backdate a message for age-based cleanup tests.
    pub fn set_message_time(&self, id: &str, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        if let Some(m) = state.messages.iter_mut().find(|m| m.id == id) {
            m.timestamp = at;
        }
    }

    pub fn set_session_updated(&self, id: &str, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        if let Some(s) = state.sessions.iter_mut().find(|s| s.id == id) {
            s.updated_at = at;
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let session = Session {
            id: Self::next_id(&mut state, "s"),
            title: new.title,
            created_at: now,
            updated_at: now,
            model: new.model,
            system_prompt: new.system_prompt,
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sessions(
        &self,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Session>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut sessions = state.sessions.clone();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn update_session(
        &self,
        id: &str,
        update: SessionUpdate,
    ) -> Result<Session, StoreError> {
        let mut state = self.state.lock().unwrap();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
        update.apply_to(session, Utc::now());
        Ok(session.clone())
    }

    async fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.sessions.len();
        state.sessions.retain(|s| s.id != id);
        state.messages.retain(|m| m.session_id != id);
        Ok(state.sessions.len() != before)
    }

    async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<Message, StoreError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        session.updated_at = now;
        let message = Message {
            id: Self::next_id(&mut state, "m"),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: now,
            metadata,
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        session_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn update_message(
        &self,
        id: &str,
        content: &str,
        metadata: Option<MessageMetadata>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::MessageNotFound(id.to_string()))?;
        message.content = content.to_string();
        if let Some(metadata) = metadata {
            message.metadata = metadata;
        }
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.messages.len();
        state.messages.retain(|m| m.id != id);
        Ok(state.messages.len() != before)
    }

    async fn count_messages(&self, session_id: &str) -> Result<usize, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .count())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport, StoreError> {
        let mut state = self.state.lock().unwrap();
        let messages_before = state.messages.len();
        state.messages.retain(|m| m.timestamp >= cutoff);
        let messages_deleted = messages_before - state.messages.len();

        let sessions_before = state.sessions.len();
        let StoreState {
            sessions, messages, ..
        } = &mut *state;
        sessions.retain(|s| {
            s.updated_at >= cutoff || messages.iter().any(|m| m.session_id == s.id)
        });
        Ok(PurgeReport {
            sessions_deleted: sessions_before - state.sessions.len(),
            messages_deleted,
        })
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(StoreStats {
            total_sessions: state.sessions.len(),
            total_messages: state.messages.len(),
            first_session_at: state.sessions.iter().map(|s| s.created_at).min(),
        })
    }
}

/// Wraps a [`MemoryStore`] to hold message updates or fail listings on demand.
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    hold_updates: AtomicBool,
    fail_listing: AtomicBool,
    gate: Semaphore,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            hold_updates: AtomicBool::new(false),
            fail_listing: AtomicBool::new(false),
            gate: Semaphore::new(0),
        })
    }

    /// Make every `update_message` wait for [`FaultyStore::release_update`].
    pub fn hold_updates(&self) {
        self.hold_updates.store(true, Ordering::SeqCst);
    }

    /// Let one held update through.
    pub fn release_update(&self) {
        self.gate.add_permits(1);
    }

    /// Stop holding updates and let any waiting one through.
    pub fn open_updates(&self) {
        self.hold_updates.store(false, Ordering::SeqCst);
        self.gate.add_permits(1);
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConversationStore for FaultyStore {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError> {
        self.inner.create_session(new).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        self.inner.get_session(id).await
    }

    async fn list_sessions(
        &self,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Session>, StoreError> {
        self.inner.list_sessions(limit, offset).await
    }

    async fn update_session(
        &self,
        id: &str,
        update: SessionUpdate,
    ) -> Result<Session, StoreError> {
        self.inner.update_session(id, update).await
    }

    async fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete_session(id).await
    }

    async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<Message, StoreError> {
        self.inner
            .append_message(session_id, role, content, metadata)
            .await
    }

    async fn list_messages(
        &self,
        session_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("disk unavailable".to_string()));
        }
        self.inner.list_messages(session_id, limit, offset).await
    }

    async fn update_message(
        &self,
        id: &str,
        content: &str,
        metadata: Option<MessageMetadata>,
    ) -> Result<(), StoreError> {
        if self.hold_updates.load(Ordering::SeqCst)
            && let Ok(permit) = self.gate.acquire().await
        {
            permit.forget();
        }
        self.inner.update_message(id, content, metadata).await
    }

    async fn delete_message(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete_message(id).await
    }

    async fn count_messages(&self, session_id: &str) -> Result<usize, StoreError> {
        self.inner.count_messages(session_id).await
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport, StoreError> {
        self.inner.purge_before(cutoff).await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.inner.stats().await
    }
}

// ==================== Provider ====================

/// One scripted step of a stub stream.
#[derive(Clone)]
pub enum Step {
    Chunk(&'static str),
    Fail(GatewayError),
    /// Wait before the next step
    Pause(Duration),
    /// Wait until the test releases the gate
    Gate,
}

/// Client that streams a fixed script and answers `complete` with a fixed reply.
pub struct ScriptedClient {
    pub steps: Vec<Step>,
    pub reply: Result<String, GatewayError>,
    pub stream_calls: AtomicUsize,
    pub complete_calls: Mutex<Vec<(Vec<ChatMessage>, CompletionOptions)>>,
    gate: Arc<Semaphore>,
}

impl ScriptedClient {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            reply: Ok("Greeting".to_string()),
            stream_calls: AtomicUsize::new(0),
            complete_calls: Mutex::new(Vec::new()),
            gate: Arc::new(Semaphore::new(0)),
        })
    }

    pub fn with_reply(steps: Vec<Step>, reply: Result<String, GatewayError>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            reply,
            stream_calls: AtomicUsize::new(0),
            complete_calls: Mutex::new(Vec::new()),
            gate: Arc::new(Semaphore::new(0)),
        })
    }

    /// Let one waiting `Step::Gate` pass.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl ProviderClient for ScriptedClient {
    fn describe(&self) -> ModelDescriptor {
        ModelDescriptor {
            provider: "Stub".to_string(),
            model_id: "stub-model".to_string(),
            display_name: "stub-model".to_string(),
            max_context: 4096,
            supports_streaming: true,
            cost_per_token: None,
        }
    }

    async fn stream(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<StreamHandle, GatewayError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        let steps = self.steps.clone();
        let gate = self.gate.clone();
        tokio::spawn(async move {
            for step in steps {
                let event = match step {
                    Step::Chunk(text) => StreamEvent::Delta(text.to_string()),
                    Step::Fail(e) => StreamEvent::Error(e),
                    Step::Pause(d) => {
                        tokio::time::sleep(d).await;
                        continue;
                    }
                    Step::Gate => {
                        if let Ok(permit) = gate.acquire().await {
                            permit.forget();
                        }
                        continue;
                    }
                };
                let terminal = matches!(event, StreamEvent::Error(_));
                if tx.send(event).await.is_err() || terminal {
                    return;
                }
            }
            let _ = tx
                .send(StreamEvent::Completed {
                    finish_reason: Some("stop".to_string()),
                    usage: None,
                })
                .await;
        });
        Ok(StreamHandle::new(rx))
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, GatewayError> {
        self.complete_calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), *options));
        self.reply.clone().map(CompletionResponse::text)
    }
}

/// Factory that hands out one shared client for the "stub" provider.
pub struct SingleClientFactory {
    pub client: Arc<ScriptedClient>,
    pub created: AtomicUsize,
}

impl SingleClientFactory {
    pub fn new(client: Arc<ScriptedClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            created: AtomicUsize::new(0),
        })
    }
}

impl ClientFactory for SingleClientFactory {
    fn create(
        &self,
        provider: &str,
        _model: &str,
        _credential: &str,
    ) -> Option<Arc<dyn ProviderClient>> {
        if !provider.eq_ignore_ascii_case("stub") {
            return None;
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Some(self.client.clone())
    }

    fn models(&self, _provider: &str) -> Vec<ModelDescriptor> {
        vec![self.client.describe()]
    }
}

/// Secrets keyed by lower-case provider name.
pub struct MapSecrets(pub HashMap<String, String>);

impl MapSecrets {
    pub fn with(providers: &[&str]) -> Arc<Self> {
        Arc::new(Self(
            providers
                .iter()
                .map(|p| (p.to_string(), "sk-test".to_string()))
                .collect(),
        ))
    }
}

impl SecretStore for MapSecrets {
    fn get_credential(&self, provider: &str) -> Option<String> {
        self.0.get(&provider.to_ascii_lowercase()).cloned()
    }

    fn configured_providers(&self) -> Vec<String> {
        let mut providers: Vec<String> = self.0.keys().cloned().collect();
        providers.sort();
        providers
    }
}
