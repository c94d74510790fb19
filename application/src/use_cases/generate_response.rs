//! Generation orchestrator.
//!
//! Turns a submitted user message into a streamed assistant reply:
//!
//! 1. Reserve the session (at most one active generation per session)
//! 2. Append the user message and an empty assistant placeholder
//! 3. Resolve a [`ProviderClient`] through the [`ClientRegistry`]
//! 4. Stream the reply in a background task, forwarding throttled
//!    [`UiEvent::ContentUpdated`] events
//! 5. Persist the final text, then notify and maybe schedule a title
//!
//! Cancellation is cooperative: the task checks its token between
//! fragments and keeps whatever text arrived before it.

use crate::config::GenerationParams;
use crate::ports::conversation_logger::{
    ConversationEvent, ConversationLogger, NoConversationLogger,
};
use crate::ports::conversation_store::StoreError;
use crate::ports::llm_gateway::{CompletionOptions, GatewayError, ProviderClient, StreamEvent};
use crate::ports::ui_event::{PresentationSink, UiEvent};
use crate::use_cases::client_registry::ClientRegistry;
use crate::use_cases::session_service::SessionService;
use crate::use_cases::synthesize_title::TitleScheduler;
use corsie_domain::util::preview;
use corsie_domain::{
    ChatMessage, GenerationState, MessageMetadata, ModelRef, Role, TokenUsage,
    should_trigger_title,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reasons a submission is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("A response is already being generated for session {0}")]
    Busy(String),

    #[error("Message is empty")]
    EmptyInput,

    #[error("No session selected")]
    NoSessionSelected,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a generation failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationFailure {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Generation task ended abnormally: {0}")]
    Aborted(String),
}

impl GenerationFailure {
    /// Short label recorded in transcripts.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationFailure::Gateway(e) => e.kind(),
            GenerationFailure::Store(_) => "store",
            GenerationFailure::Aborted(_) => "aborted",
        }
    }
}

/// How a generation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed {
        message_id: String,
        text: String,
    },
    Cancelled {
        message_id: String,
        partial_text: String,
    },
    Failed {
        message_id: String,
        error: GenerationFailure,
    },
}

impl GenerationOutcome {
    /// Id of the assistant message this generation filled.
    pub fn message_id(&self) -> &str {
        match self {
            GenerationOutcome::Completed { message_id, .. }
            | GenerationOutcome::Cancelled { message_id, .. }
            | GenerationOutcome::Failed { message_id, .. } => message_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, GenerationOutcome::Completed { .. })
    }
}

enum TicketState {
    Ready(GenerationOutcome),
    Running(JoinHandle<GenerationOutcome>),
}

/// Handle to an accepted submission.
pub struct GenerationTicket {
    pub session_id: String,
    pub user_message_id: String,
    pub assistant_message_id: String,
    state: TicketState,
}

impl GenerationTicket {
    /// Wait for the generation to end.
    pub async fn wait(self) -> GenerationOutcome {
        match self.state {
            TicketState::Ready(outcome) => outcome,
            TicketState::Running(handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(e) => GenerationOutcome::Failed {
                    message_id: self.assistant_message_id,
                    error: GenerationFailure::Aborted(e.to_string()),
                },
            },
        }
    }
}

// ==================== Active generations ====================

struct ActiveGeneration {
    id: u64,
    state: GenerationState,
    token: CancellationToken,
}

/// A session slot held by one generation until it finishes.
#[derive(Debug)]
struct Reservation {
    id: u64,
    token: CancellationToken,
}

/// Per-session generation state, shared with running tasks.
///
/// An entry exists from reservation until the owning task calls
/// [`ActiveGenerations::finish`], including while an errored or cancelled
/// generation is still persisting. Only the owner's id can move or release it.
#[derive(Clone, Default)]
struct ActiveGenerations {
    inner: Arc<Mutex<HashMap<String, ActiveGeneration>>>,
    next_id: Arc<AtomicU64>,
}

impl ActiveGenerations {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveGeneration>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve a session for a new generation.
    fn try_begin(&self, session_id: &str) -> Result<Reservation, SubmitError> {
        let mut active = self.lock();
        if active.contains_key(session_id) {
            return Err(SubmitError::Busy(session_id.to_string()));
        }
        let reservation = Reservation {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        active.insert(
            session_id.to_string(),
            ActiveGeneration {
                id: reservation.id,
                state: GenerationState::Sending,
                token: reservation.token.clone(),
            },
        );
        Ok(reservation)
    }

    fn transition(&self, session_id: &str, id: u64, next: GenerationState) {
        let mut active = self.lock();
        if let Some(generation) = active.get_mut(session_id).filter(|g| g.id == id) {
            if generation.state != next {
                if !generation.state.can_transition_to(next) {
                    warn!(
                        "Unexpected generation transition {} -> {} for session {}",
                        generation.state, next, session_id
                    );
                }
                debug!("Session {}: {} -> {}", session_id, generation.state, next);
            }
            generation.state = next;
        }
    }

    /// Release the session back to `Idle` if `id` still holds it.
    fn finish(&self, session_id: &str, id: u64) {
        let mut active = self.lock();
        if active.get(session_id).is_some_and(|g| g.id == id)
            && let Some(generation) = active.remove(session_id)
        {
            debug!("Session {}: {} -> idle", session_id, generation.state);
        }
    }

    fn is_reserved(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    fn state(&self, session_id: &str) -> GenerationState {
        self.lock()
            .get(session_id)
            .map_or(GenerationState::Idle, |g| g.state)
    }

    fn cancel(&self, session_id: &str) -> bool {
        match self.lock().get(session_id) {
            Some(generation) if generation.state.is_active() => {
                generation.token.cancel();
                true
            }
            _ => false,
        }
    }

    fn cancel_all(&self) -> usize {
        let active = self.lock();
        for generation in active.values() {
            generation.token.cancel();
        }
        active.len()
    }
}

// ==================== Orchestrator ====================

pub struct GenerationOrchestrator {
    sessions: Arc<SessionService>,
    registry: Arc<ClientRegistry>,
    titles: Option<Arc<TitleScheduler>>,
    sink: PresentationSink,
    conversation_logger: Arc<dyn ConversationLogger>,
    params: GenerationParams,
    active: ActiveGenerations,
}

impl GenerationOrchestrator {
    pub fn new(
        sessions: Arc<SessionService>,
        registry: Arc<ClientRegistry>,
        sink: PresentationSink,
        params: GenerationParams,
    ) -> Self {
        Self {
            sessions,
            registry,
            titles: None,
            sink,
            conversation_logger: Arc::new(NoConversationLogger),
            params,
            active: ActiveGenerations::default(),
        }
    }

    /// Enable automatic titles after a session's first exchange.
    pub fn with_title_scheduler(mut self, titles: Arc<TitleScheduler>) -> Self {
        self.titles = Some(titles);
        self
    }

    pub fn with_conversation_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.conversation_logger = logger;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionService> {
        &self.sessions
    }

    pub fn state(&self, session_id: &str) -> GenerationState {
        self.active.state(session_id)
    }

    /// Whether a generation holds the session, including one that is still
    /// saving its error notice or partial text.
    pub fn is_generating(&self, session_id: &str) -> bool {
        self.active.is_reserved(session_id)
    }

    /// Request cancellation. Returns false if nothing was running.
    pub fn cancel(&self, session_id: &str) -> bool {
        let cancelled = self.active.cancel(session_id);
        if cancelled {
            info!("Cancellation requested for session {}", session_id);
        }
        cancelled
    }

    /// Request cancellation of every running generation.
    pub fn cancel_all(&self) -> usize {
        self.active.cancel_all()
    }

    /// Submit a message to the current session.
    pub async fn submit(&self, text: &str) -> Result<GenerationTicket, SubmitError> {
        let session_id = self
            .sessions
            .current_session_id()
            .ok_or(SubmitError::NoSessionSelected)?;
        self.submit_to(&session_id, text).await
    }

    /// Submit a message to a specific session.
    pub async fn submit_to(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<GenerationTicket, SubmitError> {
        if text.trim().is_empty() {
            return Err(SubmitError::EmptyInput);
        }

        // Reserve before the first await so a concurrent submit sees Busy
        let reservation = self.active.try_begin(session_id)?;
        let generation_id = reservation.id;

        match self.start(session_id, text, reservation).await {
            Ok(ticket) => Ok(ticket),
            Err(e) => {
                self.active.finish(session_id, generation_id);
                Err(e)
            }
        }
    }

    async fn start(
        &self,
        session_id: &str,
        text: &str,
        reservation: Reservation,
    ) -> Result<GenerationTicket, SubmitError> {
        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| SubmitError::SessionNotFound(session_id.to_string()))?;

        let store = self.sessions.store();
        let user_message = store
            .append_message(session_id, Role::User, text, MessageMetadata::default())
            .await?;
        let placeholder = store
            .append_message(session_id, Role::Assistant, "", MessageMetadata::default())
            .await?;

        info!(
            "Generating reply in session {} with {}: {}",
            session_id,
            session.model,
            preview(text, 60)
        );
        self.emit(UiEvent::MessageAppended(user_message.clone()));
        self.emit(UiEvent::MessageAppended(placeholder.clone()));
        self.emit(UiEvent::GenerationStarted {
            session_id: session_id.to_string(),
        });

        let model = ModelRef::parse(&session.model);
        let task = GenerationTask {
            session_id: session_id.to_string(),
            message_id: placeholder.id.clone(),
            model: model.clone(),
            generation_id: reservation.id,
            token: reservation.token,
            sessions: self.sessions.clone(),
            titles: self.titles.clone(),
            sink: self.sink.clone(),
            conversation_logger: self.conversation_logger.clone(),
            active: self.active.clone(),
            update_interval: self.params.update_interval,
        };

        let state = match self.registry.get(&model.provider, &model.model) {
            None => {
                warn!("No client available for {}", model);
                let error = GatewayError::CredentialMissing(model.provider.clone());
                TicketState::Ready(task.fail(String::new(), error.into()).await)
            }
            Some(client) => match self
                .sessions
                .conversation_context(session_id, self.params.context_messages, Some(&placeholder.id))
                .await
            {
                Ok(context) => {
                    let options = self.params.completion_options();
                    TicketState::Running(tokio::spawn(task.run(client, context, options)))
                }
                // The placeholder is already stored, so it must end with a notice
                Err(e) => {
                    error!("Could not build context for session {}: {}", session_id, e);
                    TicketState::Ready(task.fail(String::new(), e.into()).await)
                }
            },
        };

        Ok(GenerationTicket {
            session_id: session_id.to_string(),
            user_message_id: user_message.id,
            assistant_message_id: placeholder.id,
            state,
        })
    }

    fn emit(&self, event: UiEvent) {
        let _ = self.sink.send(event);
    }
}

// ==================== Generation task ====================

enum StreamEnd {
    Completed {
        finish_reason: Option<String>,
        usage: Option<TokenUsage>,
    },
    Failed(GatewayError),
    Cancelled,
}

/// One in-flight generation. Lives for a single streaming call.
struct GenerationTask {
    session_id: String,
    message_id: String,
    model: ModelRef,
    generation_id: u64,
    token: CancellationToken,
    sessions: Arc<SessionService>,
    titles: Option<Arc<TitleScheduler>>,
    sink: PresentationSink,
    conversation_logger: Arc<dyn ConversationLogger>,
    active: ActiveGenerations,
    update_interval: Duration,
}

impl GenerationTask {
    async fn run(
        self,
        client: Arc<dyn ProviderClient>,
        context: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> GenerationOutcome {
        let mut text = String::new();
        let end = self.consume(client.as_ref(), &context, &options, &mut text).await;

        match end {
            StreamEnd::Completed {
                finish_reason,
                usage,
            } => self.complete(text, finish_reason, usage).await,
            StreamEnd::Failed(error) => self.fail(text, error.into()).await,
            StreamEnd::Cancelled => self.cancelled(text).await,
        }
    }

    /// Read the stream into `text` until it ends, fails or is cancelled.
    async fn consume(
        &self,
        client: &dyn ProviderClient,
        context: &[ChatMessage],
        options: &CompletionOptions,
        text: &mut String,
    ) -> StreamEnd {
        let opened = tokio::select! {
            biased;
            _ = self.token.cancelled() => return StreamEnd::Cancelled,
            opened = client.stream(context, options) => opened,
        };
        let mut handle = match opened {
            Ok(handle) => handle,
            Err(e) => return StreamEnd::Failed(e),
        };

        let mut last_update: Option<Instant> = None;
        let mut streaming = false;
        loop {
            let event = tokio::select! {
                biased;
                _ = self.token.cancelled() => return StreamEnd::Cancelled,
                event = handle.receiver.recv() => event,
            };

            match event {
                Some(StreamEvent::Delta(chunk)) => {
                    if !streaming {
                        self.transition(GenerationState::Streaming);
                        streaming = true;
                    }
                    text.push_str(&chunk);

                    let due = last_update.is_none_or(|at| at.elapsed() >= self.update_interval);
                    if due {
                        self.emit(UiEvent::ContentUpdated {
                            message_id: self.message_id.clone(),
                            text: text.clone(),
                        });
                        last_update = Some(Instant::now());
                    }
                }
                Some(StreamEvent::Completed {
                    finish_reason,
                    usage,
                }) => {
                    return StreamEnd::Completed {
                        finish_reason,
                        usage,
                    };
                }
                Some(StreamEvent::Error(e)) => return StreamEnd::Failed(e),
                None => {
                    debug!("Stream for session {} closed without finish signal", self.session_id);
                    return StreamEnd::Completed {
                        finish_reason: None,
                        usage: None,
                    };
                }
            }
        }
    }

    async fn complete(
        self,
        text: String,
        finish_reason: Option<String>,
        usage: Option<TokenUsage>,
    ) -> GenerationOutcome {
        self.transition(GenerationState::Finalizing);

        let metadata = MessageMetadata {
            model: Some(self.model.model.clone()),
            finish_reason: finish_reason.clone(),
            usage,
            ..MessageMetadata::default()
        };
        if let Err(e) = self.persist(&text, metadata).await {
            error!("Failed to store reply for session {}: {}", self.session_id, e);
            return self.fail(text, e.into()).await;
        }

        self.maybe_schedule_title().await;
        self.release();

        info!(
            "Reply complete in session {} ({} chars)",
            self.session_id,
            text.chars().count()
        );
        self.conversation_logger.log(ConversationEvent::new(
            "generation_completed",
            json!({
                "session_id": self.session_id,
                "message_id": self.message_id,
                "model": self.model.to_string(),
                "finish_reason": finish_reason,
                "usage": usage,
                "content": text,
            }),
        ));

        self.emit(UiEvent::ContentUpdated {
            message_id: self.message_id.clone(),
            text: text.clone(),
        });
        self.emit(UiEvent::GenerationFinished {
            session_id: self.session_id.clone(),
            message_id: self.message_id.clone(),
            final_text: text.clone(),
        });
        GenerationOutcome::Completed {
            message_id: self.message_id,
            text,
        }
    }

    /// Finalize the placeholder with the partial text plus an error notice.
    async fn fail(self, text: String, error: GenerationFailure) -> GenerationOutcome {
        self.transition(GenerationState::Error);
        warn!("Generation failed in session {}: {}", self.session_id, error);

        let content = if text.is_empty() {
            format!("Error: {error}")
        } else {
            format!("{text}\n\nError: {error}")
        };
        let metadata = MessageMetadata {
            model: Some(self.model.model.clone()),
            error: Some(error.to_string()),
            ..MessageMetadata::default()
        };
        if let Err(e) = self.persist(&content, metadata).await {
            error!("Failed to store error notice for session {}: {}", self.session_id, e);
        }
        self.release();

        self.conversation_logger.log(ConversationEvent::new(
            "generation_failed",
            json!({
                "session_id": self.session_id,
                "message_id": self.message_id,
                "model": self.model.to_string(),
                "error_kind": error.kind(),
                "error": error.to_string(),
                "partial_chars": text.chars().count(),
            }),
        ));

        self.emit(UiEvent::ContentUpdated {
            message_id: self.message_id.clone(),
            text: content,
        });
        self.emit(UiEvent::GenerationError {
            session_id: self.session_id.clone(),
            message: error.to_string(),
        });
        GenerationOutcome::Failed {
            message_id: self.message_id,
            error,
        }
    }

    /// Keep whatever arrived before cancellation.
    async fn cancelled(self, text: String) -> GenerationOutcome {
        self.transition(GenerationState::Cancelled);
        info!(
            "Generation cancelled in session {} after {} chars",
            self.session_id,
            text.chars().count()
        );

        let metadata = MessageMetadata {
            model: Some(self.model.model.clone()),
            cancelled: true,
            ..MessageMetadata::default()
        };
        if let Err(e) = self.persist(&text, metadata).await {
            error!("Failed to store partial reply for session {}: {}", self.session_id, e);
        }
        self.release();

        self.conversation_logger.log(ConversationEvent::new(
            "generation_cancelled",
            json!({
                "session_id": self.session_id,
                "message_id": self.message_id,
                "model": self.model.to_string(),
                "partial_text": text,
            }),
        ));

        self.emit(UiEvent::ContentUpdated {
            message_id: self.message_id.clone(),
            text: text.clone(),
        });
        self.emit(UiEvent::GenerationCancelled {
            session_id: self.session_id.clone(),
            partial_text: text.clone(),
        });
        GenerationOutcome::Cancelled {
            message_id: self.message_id,
            partial_text: text,
        }
    }

    fn transition(&self, next: GenerationState) {
        self.active.transition(&self.session_id, self.generation_id, next);
    }

    /// Give the session back once nothing more will be written for it.
    fn release(&self) {
        self.active.finish(&self.session_id, self.generation_id);
    }

    async fn persist(&self, content: &str, metadata: MessageMetadata) -> Result<(), StoreError> {
        self.sessions
            .store()
            .update_message(&self.message_id, content, Some(metadata))
            .await?;
        self.sessions.touch(&self.session_id).await?;
        Ok(())
    }

    async fn maybe_schedule_title(&self) {
        let Some(titles) = &self.titles else {
            return;
        };
        let count = match self.sessions.message_count(&self.session_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Could not count messages of session {}: {}", self.session_id, e);
                return;
            }
        };
        match self.sessions.get_session(&self.session_id).await {
            Ok(Some(session)) if should_trigger_title(&session, count) => {
                titles.schedule(&self.session_id);
            }
            Ok(_) => {}
            Err(e) => warn!("Could not load session {}: {}", self.session_id, e),
        }
    }

    fn emit(&self, event: UiEvent) {
        let _ = self.sink.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::conversation_store::ConversationStore;
    use crate::ports::ui_event::presentation_channel;
    use crate::use_cases::synthesize_title::TitleSynthesizer;
    use crate::use_cases::test_support::{
        FaultyStore, MapSecrets, MemoryStore, ScriptedClient, SingleClientFactory, Step,
    };
    use corsie_domain::DEFAULT_TITLE;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        orchestrator: GenerationOrchestrator,
        sessions: Arc<SessionService>,
        store: Arc<MemoryStore>,
        client: Arc<ScriptedClient>,
        factory: Arc<SingleClientFactory>,
        titles: Arc<TitleScheduler>,
        events: UnboundedReceiver<UiEvent>,
    }

    fn params() -> GenerationParams {
        GenerationParams::default()
            .with_update_interval(Duration::ZERO)
            .with_title_delay(Duration::from_millis(10))
    }

    fn fixture(steps: Vec<Step>) -> Fixture {
        fixture_with(ScriptedClient::new(steps), params())
    }

    fn fixture_with(client: Arc<ScriptedClient>, params: GenerationParams) -> Fixture {
        let store = MemoryStore::new();
        fixture_over(store.clone(), store, client, params)
    }

    /// Fixture whose orchestrator talks to `backend`, which wraps `store`.
    fn fixture_over(
        store: Arc<MemoryStore>,
        backend: Arc<dyn ConversationStore>,
        client: Arc<ScriptedClient>,
        params: GenerationParams,
    ) -> Fixture {
        let sessions = Arc::new(SessionService::new(backend, "stub/stub-model"));
        let factory = SingleClientFactory::new(client.clone());
        let registry = Arc::new(ClientRegistry::new(
            factory.clone(),
            MapSecrets::with(&["stub"]),
        ));
        let (sink, events) = presentation_channel();
        let synthesizer = TitleSynthesizer::new(sessions.clone(), params.title_options());
        let titles = Arc::new(TitleScheduler::new(
            Arc::new(synthesizer),
            registry.clone(),
            sessions.clone(),
            sink.clone(),
            params.title_delay,
        ));
        let orchestrator = GenerationOrchestrator::new(sessions.clone(), registry, sink, params)
            .with_title_scheduler(titles.clone());
        Fixture {
            orchestrator,
            sessions,
            store,
            client,
            factory,
            titles,
            events,
        }
    }

    fn drain(events: &mut UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    async fn wait_for<F>(events: &mut UnboundedReceiver<UiEvent>, mut pred: F) -> UiEvent
    where
        F: FnMut(&UiEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = events.recv().await.expect("channel open");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event within timeout")
    }

    async fn wait_for_state(
        orchestrator: &GenerationOrchestrator,
        session_id: &str,
        state: GenerationState,
    ) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while orchestrator.state(session_id) != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("state within timeout");
    }

    #[derive(Default)]
    struct RecordingLogger {
        events: Mutex<Vec<ConversationEvent>>,
    }

    impl ConversationLogger for RecordingLogger {
        fn log(&self, event: ConversationEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn test_end_to_end_reply_and_title() {
        let mut f = fixture(vec![Step::Chunk("Hi"), Step::Chunk(" there")]);
        let session = f.sessions.create_session(None, None, None).await.unwrap();
        assert_eq!(session.title, DEFAULT_TITLE);

        let ticket = f.orchestrator.submit("Hello").await.unwrap();
        let placeholder_id = ticket.assistant_message_id.clone();
        let outcome = ticket.wait().await;
        assert_eq!(
            outcome,
            GenerationOutcome::Completed {
                message_id: placeholder_id.clone(),
                text: "Hi there".to_string()
            }
        );

        let messages = f.sessions.messages(&session.id, None, 0).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].content, "Hi there");
        assert_eq!(messages[1].metadata.finish_reason.as_deref(), Some("stop"));
        assert_eq!(f.orchestrator.state(&session.id), GenerationState::Idle);

        let title = wait_for(&mut f.events, |e| matches!(e, UiEvent::TitleChanged { .. })).await;
        assert_eq!(
            title,
            UiEvent::TitleChanged {
                session_id: session.id.clone(),
                title: "Greeting".to_string()
            }
        );
        let calls = f.client.complete_calls.lock().unwrap();
        assert!(calls[0].0[0].content.ends_with("User question: Hello"));
        drop(calls);
        let stored = f.store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Greeting");
    }

    #[tokio::test]
    async fn test_event_order_and_persist_before_finish() {
        let mut f = fixture(vec![Step::Chunk("a"), Step::Chunk("b")]);
        let session = f.sessions.create_session(None, None, None).await.unwrap();

        let ticket = f.orchestrator.submit("q").await.unwrap();
        let message_id = ticket.assistant_message_id.clone();
        ticket.wait().await;

        let events: Vec<UiEvent> = drain(&mut f.events)
            .into_iter()
            .filter(|e| !matches!(e, UiEvent::TitleChanged { .. }))
            .collect();
        assert!(matches!(&events[0], UiEvent::MessageAppended(m) if m.role == Role::User));
        assert!(
            matches!(&events[1], UiEvent::MessageAppended(m) if m.role == Role::Assistant && m.content.is_empty())
        );
        assert_eq!(
            events[2],
            UiEvent::GenerationStarted {
                session_id: session.id.clone()
            }
        );
        let updates: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::ContentUpdated { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec!["a", "ab", "ab"]);
        assert_eq!(
            events.last().unwrap(),
            &UiEvent::GenerationFinished {
                session_id: session.id.clone(),
                message_id: message_id.clone(),
                final_text: "ab".to_string()
            }
        );
        assert_eq!(f.store.message(&message_id).unwrap().content, "ab");
    }

    #[tokio::test]
    async fn test_updates_are_throttled() {
        let client = ScriptedClient::new(vec![
            Step::Chunk("1"),
            Step::Chunk("2"),
            Step::Chunk("3"),
            Step::Chunk("4"),
        ]);
        let mut f = fixture_with(
            client,
            params().with_update_interval(Duration::from_secs(60)),
        );
        f.sessions.create_session(None, None, None).await.unwrap();

        f.orchestrator.submit("q").await.unwrap().wait().await;

        let updates: Vec<String> = drain(&mut f.events)
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::ContentUpdated { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        // First fragment, then the final full text
        assert_eq!(updates, vec!["1".to_string(), "1234".to_string()]);
    }

    #[tokio::test]
    async fn test_second_submit_while_active_is_rejected() {
        let f = fixture(vec![Step::Chunk("a"), Step::Gate, Step::Chunk("b")]);
        let session = f.sessions.create_session(None, None, None).await.unwrap();

        let ticket = f.orchestrator.submit("first").await.unwrap();
        assert!(f.orchestrator.is_generating(&session.id));

        let err = f.orchestrator.submit("second").await.err().unwrap();
        assert_eq!(err, SubmitError::Busy(session.id.clone()));
        assert_eq!(f.sessions.message_count(&session.id).await.unwrap(), 2);

        f.client.release();
        ticket.wait().await;
        assert!(!f.orchestrator.is_generating(&session.id));
        assert!(f.orchestrator.submit("second").await.is_ok());
    }

    #[tokio::test]
    async fn test_other_sessions_generate_concurrently() {
        let f = fixture(vec![Step::Gate, Step::Chunk("x")]);
        let a = f.sessions.create_session(None, None, None).await.unwrap();
        let b = f.sessions.create_session(None, None, None).await.unwrap();

        let ta = f.orchestrator.submit_to(&a.id, "one").await.unwrap();
        let tb = f.orchestrator.submit_to(&b.id, "two").await.unwrap();
        assert!(f.orchestrator.is_generating(&a.id));
        assert!(f.orchestrator.is_generating(&b.id));

        f.client.release();
        f.client.release();
        assert!(ta.wait().await.is_completed());
        assert!(tb.wait().await.is_completed());
    }

    #[tokio::test]
    async fn test_rejections_have_no_side_effects() {
        let f = fixture(vec![]);
        assert_eq!(
            f.orchestrator.submit("hi").await.err(),
            Some(SubmitError::NoSessionSelected)
        );

        let session = f.sessions.create_session(None, None, None).await.unwrap();
        assert_eq!(
            f.orchestrator.submit("   \n").await.err(),
            Some(SubmitError::EmptyInput)
        );
        assert_eq!(
            f.orchestrator.submit_to("ghost", "hi").await.err(),
            Some(SubmitError::SessionNotFound("ghost".to_string()))
        );
        assert_eq!(f.sessions.message_count(&session.id).await.unwrap(), 0);
        assert_eq!(f.orchestrator.state("ghost"), GenerationState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_persists_received_fragments() {
        let mut f = fixture(vec![
            Step::Chunk("one "),
            Step::Chunk("two"),
            Step::Gate,
            Step::Chunk(" three"),
        ]);
        let session = f.sessions.create_session(None, None, None).await.unwrap();

        let ticket = f.orchestrator.submit("count").await.unwrap();
        let message_id = ticket.assistant_message_id.clone();
        wait_for(&mut f.events, |e| {
            matches!(e, UiEvent::ContentUpdated { text, .. } if text == "one two")
        })
        .await;

        assert!(f.orchestrator.cancel(&session.id));
        let outcome = ticket.wait().await;
        assert_eq!(
            outcome,
            GenerationOutcome::Cancelled {
                message_id: message_id.clone(),
                partial_text: "one two".to_string()
            }
        );

        let stored = f.store.message(&message_id).unwrap();
        assert_eq!(stored.content, "one two");
        assert!(stored.metadata.cancelled);
        assert_eq!(f.orchestrator.state(&session.id), GenerationState::Idle);
        assert!(!f.orchestrator.cancel(&session.id));

        let cancelled = wait_for(&mut f.events, |e| {
            matches!(e, UiEvent::GenerationCancelled { .. })
        })
        .await;
        assert_eq!(
            cancelled,
            UiEvent::GenerationCancelled {
                session_id: session.id,
                partial_text: "one two".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_cancel_before_first_fragment_keeps_empty_message() {
        let f = fixture(vec![Step::Gate, Step::Chunk("late")]);
        let session = f.sessions.create_session(None, None, None).await.unwrap();

        let ticket = f.orchestrator.submit("q").await.unwrap();
        let message_id = ticket.assistant_message_id.clone();
        f.orchestrator.cancel_all();

        assert!(matches!(
            ticket.wait().await,
            GenerationOutcome::Cancelled { ref partial_text, .. } if partial_text.is_empty()
        ));
        assert_eq!(f.store.message(&message_id).unwrap().content, "");
        assert_eq!(f.orchestrator.state(&session.id), GenerationState::Idle);
    }

    #[tokio::test]
    async fn test_stream_error_keeps_partial_text_with_notice() {
        let mut f = fixture(vec![
            Step::Chunk("partial"),
            Step::Fail(GatewayError::upstream(Some(400), "invalid model")),
        ]);
        let session = f.sessions.create_session(None, None, None).await.unwrap();

        let ticket = f.orchestrator.submit("q").await.unwrap();
        let message_id = ticket.assistant_message_id.clone();
        let outcome = ticket.wait().await;
        assert!(matches!(outcome, GenerationOutcome::Failed { .. }));

        let stored = f.store.message(&message_id).unwrap();
        assert_eq!(stored.content, "partial\n\nError: Provider error: invalid model");
        assert_eq!(stored.metadata.error.as_deref(), Some("Provider error: invalid model"));
        assert_eq!(f.orchestrator.state(&session.id), GenerationState::Idle);

        let events = drain(&mut f.events);
        assert!(events.contains(&UiEvent::GenerationError {
            session_id: session.id.clone(),
            message: "Provider error: invalid model".to_string()
        }));
        // Failed generations never schedule a title
        assert_eq!(f.titles.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_fails_without_network() {
        let mut f = fixture(vec![Step::Chunk("never")]);
        let session = f
            .sessions
            .create_session(None, Some("acme/rocket-1".to_string()), None)
            .await
            .unwrap();

        let ticket = f.orchestrator.submit("hi").await.unwrap();
        let message_id = ticket.assistant_message_id.clone();
        let outcome = ticket.wait().await;
        assert_eq!(
            outcome,
            GenerationOutcome::Failed {
                message_id: message_id.clone(),
                error: GatewayError::CredentialMissing("acme".to_string()).into()
            }
        );
        assert_eq!(f.client.stream_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.factory.created.load(Ordering::SeqCst), 0);

        let stored = f.store.message(&message_id).unwrap();
        assert_eq!(
            stored.content,
            "Error: No API key configured for provider 'acme'"
        );
        assert_eq!(f.orchestrator.state(&session.id), GenerationState::Idle);
        assert!(drain(&mut f.events)
            .iter()
            .any(|e| matches!(e, UiEvent::GenerationError { .. })));
    }

    #[tokio::test]
    async fn test_title_not_scheduled_for_custom_title_or_later_turns() {
        let f = fixture(vec![Step::Chunk("ok")]);
        f.sessions
            .create_session(Some("Custom".to_string()), None, None)
            .await
            .unwrap();
        f.orchestrator.submit("one").await.unwrap().wait().await;
        assert_eq!(f.titles.pending_count(), 0);

        let session = f.sessions.create_session(None, None, None).await.unwrap();
        f.orchestrator.submit("one").await.unwrap().wait().await;
        f.titles.cancel(&session.id);
        f.orchestrator.submit("two").await.unwrap().wait().await;
        assert_eq!(f.sessions.message_count(&session.id).await.unwrap(), 4);
        assert_eq!(f.titles.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_errored_generation_holds_session_until_saved() {
        let faulty = FaultyStore::new(MemoryStore::new());
        let f = fixture_over(
            faulty.inner.clone(),
            faulty.clone(),
            ScriptedClient::new(vec![Step::Fail(GatewayError::upstream(Some(400), "bad"))]),
            params(),
        );
        let session = f.sessions.create_session(None, None, None).await.unwrap();
        faulty.hold_updates();

        let ticket = f.orchestrator.submit("first").await.unwrap();
        wait_for_state(&f.orchestrator, &session.id, GenerationState::Error).await;

        // The error notice is not saved yet
        assert!(f.orchestrator.is_generating(&session.id));
        assert_eq!(
            f.orchestrator.submit("second").await.err(),
            Some(SubmitError::Busy(session.id.clone()))
        );
        assert_eq!(f.sessions.message_count(&session.id).await.unwrap(), 2);

        faulty.open_updates();
        assert!(matches!(ticket.wait().await, GenerationOutcome::Failed { .. }));
        assert_eq!(f.orchestrator.state(&session.id), GenerationState::Idle);
        assert!(!f.orchestrator.is_generating(&session.id));

        f.orchestrator.submit("third").await.unwrap().wait().await;
        assert_eq!(f.sessions.message_count(&session.id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_cancelled_generation_holds_session_until_saved() {
        let faulty = FaultyStore::new(MemoryStore::new());
        let mut f = fixture_over(
            faulty.inner.clone(),
            faulty.clone(),
            ScriptedClient::new(vec![Step::Chunk("part"), Step::Gate]),
            params(),
        );
        let session = f.sessions.create_session(None, None, None).await.unwrap();
        faulty.hold_updates();

        let ticket = f.orchestrator.submit("first").await.unwrap();
        let message_id = ticket.assistant_message_id.clone();
        wait_for(&mut f.events, |e| {
            matches!(e, UiEvent::ContentUpdated { text, .. } if text == "part")
        })
        .await;
        assert!(f.orchestrator.cancel(&session.id));
        wait_for_state(&f.orchestrator, &session.id, GenerationState::Cancelled).await;

        assert!(!f.orchestrator.cancel(&session.id));
        assert_eq!(
            f.orchestrator.submit("second").await.err(),
            Some(SubmitError::Busy(session.id.clone()))
        );

        faulty.open_updates();
        assert_eq!(
            ticket.wait().await,
            GenerationOutcome::Cancelled {
                message_id: message_id.clone(),
                partial_text: "part".to_string()
            }
        );
        assert_eq!(f.store.message(&message_id).unwrap().content, "part");
        assert_eq!(f.orchestrator.state(&session.id), GenerationState::Idle);
        assert_eq!(f.sessions.message_count(&session.id).await.unwrap(), 2);
    }

    #[test]
    fn test_stale_owner_cannot_release_newer_reservation() {
        let active = ActiveGenerations::default();
        let first = active.try_begin("s").unwrap();
        active.finish("s", first.id);

        let second = active.try_begin("s").unwrap();
        active.transition("s", first.id, GenerationState::Error);
        active.finish("s", first.id);
        assert_eq!(active.state("s"), GenerationState::Sending);
        assert!(active.is_reserved("s"));

        assert!(active.cancel("s"));
        assert!(second.token.is_cancelled());
        assert!(!first.token.is_cancelled());
        active.finish("s", second.id);
        assert!(!active.is_reserved("s"));
    }

    #[tokio::test]
    async fn test_context_failure_finalizes_placeholder() {
        let faulty = FaultyStore::new(MemoryStore::new());
        let mut f = fixture_over(
            faulty.inner.clone(),
            faulty.clone(),
            ScriptedClient::new(vec![Step::Chunk("never")]),
            params(),
        );
        let session = f.sessions.create_session(None, None, None).await.unwrap();
        faulty.fail_listing();

        let ticket = f.orchestrator.submit("hi").await.unwrap();
        let message_id = ticket.assistant_message_id.clone();
        let outcome = ticket.wait().await;
        assert_eq!(
            outcome,
            GenerationOutcome::Failed {
                message_id: message_id.clone(),
                error: StoreError::Storage("disk unavailable".to_string()).into()
            }
        );
        assert_eq!(f.client.stream_calls.load(Ordering::SeqCst), 0);

        let stored = f.store.message(&message_id).unwrap();
        assert_eq!(stored.content, "Error: Storage error: disk unavailable");
        assert_eq!(f.orchestrator.state(&session.id), GenerationState::Idle);
        assert!(drain(&mut f.events).contains(&UiEvent::GenerationError {
            session_id: session.id.clone(),
            message: "Storage error: disk unavailable".to_string()
        }));
    }

    #[tokio::test]
    async fn test_store_failure_on_finalize_is_a_store_error() {
        let client = ScriptedClient::new(vec![Step::Chunk("a"), Step::Gate]);
        let f = fixture_with(client, params());
        let logger = Arc::new(RecordingLogger::default());
        let orchestrator = f.orchestrator.with_conversation_logger(logger.clone());
        let session = f.sessions.create_session(None, None, None).await.unwrap();

        let ticket = orchestrator.submit("q").await.unwrap();
        let message_id = ticket.assistant_message_id.clone();
        assert!(f.store.delete_message(&message_id).await.unwrap());
        f.client.release();

        let outcome = ticket.wait().await;
        let GenerationOutcome::Failed { error, .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(error, GenerationFailure::Store(StoreError::MessageNotFound(message_id)));
        assert_eq!(error.kind(), "store");
        assert_eq!(orchestrator.state(&session.id), GenerationState::Idle);

        let events = logger.events.lock().unwrap();
        let failed = events
            .iter()
            .find(|e| e.event_type == "generation_failed")
            .expect("failure logged");
        assert_eq!(failed.payload["error_kind"], "store");
        assert_eq!(f.titles.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_context_excludes_placeholder_and_respects_window() {
        struct Recording {
            seen: Mutex<Vec<Vec<ChatMessage>>>,
        }

        #[async_trait::async_trait]
        impl ProviderClient for Recording {
            fn describe(&self) -> corsie_domain::ModelDescriptor {
                corsie_domain::ModelDescriptor {
                    provider: "Stub".to_string(),
                    model_id: "rec".to_string(),
                    display_name: "rec".to_string(),
                    max_context: 1,
                    supports_streaming: true,
                    cost_per_token: None,
                }
            }

            async fn stream(
                &self,
                messages: &[ChatMessage],
                _options: &CompletionOptions,
            ) -> Result<crate::ports::llm_gateway::StreamHandle, GatewayError> {
                self.seen.lock().unwrap().push(messages.to_vec());
                Ok(crate::ports::llm_gateway::StreamHandle::from_events(vec![
                    StreamEvent::Delta("r".to_string()),
                ]))
            }
        }

        struct RecordingFactory(Arc<Recording>);

        impl crate::ports::llm_gateway::ClientFactory for RecordingFactory {
            fn create(&self, _: &str, _: &str, _: &str) -> Option<Arc<dyn ProviderClient>> {
                Some(self.0.clone())
            }

            fn models(&self, _: &str) -> Vec<corsie_domain::ModelDescriptor> {
                Vec::new()
            }
        }

        let recording = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let store = MemoryStore::new();
        let sessions = Arc::new(SessionService::new(store, "stub/rec"));
        let registry = Arc::new(ClientRegistry::new(
            Arc::new(RecordingFactory(recording.clone())),
            MapSecrets::with(&["stub"]),
        ));
        let (sink, _events) = presentation_channel();
        let orchestrator = GenerationOrchestrator::new(
            sessions.clone(),
            registry,
            sink,
            params().with_context_messages(3),
        );
        sessions
            .create_session(None, None, Some("sys".to_string()))
            .await
            .unwrap();

        for prompt in ["q1", "q2", "q3"] {
            orchestrator.submit(prompt).await.unwrap().wait().await;
        }

        let seen = recording.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            vec![ChatMessage::system("sys"), ChatMessage::user("q1")]
        );
        assert_eq!(
            seen[2],
            vec![
                ChatMessage::system("sys"),
                ChatMessage::user("q2"),
                ChatMessage::assistant("r"),
                ChatMessage::user("q3"),
            ]
        );
    }
}
