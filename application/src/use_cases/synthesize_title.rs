//! Automatic session titles.
//!
//! [`TitleSynthesizer`] asks a model for a short title derived from the first
//! user message. [`TitleScheduler`] runs it in the background after a delay,
//! keeping at most one pending task per session.

use crate::config::GenerationParams;
use crate::ports::conversation_logger::{
    ConversationEvent, ConversationLogger, NoConversationLogger,
};
use crate::ports::llm_gateway::{CompletionOptions, GatewayError, ProviderClient};
use crate::ports::conversation_store::StoreError;
use crate::ports::ui_event::{PresentationSink, UiEvent};
use crate::use_cases::client_registry::ClientRegistry;
use crate::use_cases::session_service::SessionService;
use corsie_domain::title::TITLE_SOURCE_WINDOW;
use corsie_domain::{ChatMessage, build_title_prompt, clean_title, title_source};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
enum TitleError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct TitleSynthesizer {
    sessions: Arc<SessionService>,
    options: CompletionOptions,
    conversation_logger: Arc<dyn ConversationLogger>,
}

impl TitleSynthesizer {
    pub fn new(sessions: Arc<SessionService>, options: CompletionOptions) -> Self {
        Self {
            sessions,
            options,
            conversation_logger: Arc::new(NoConversationLogger),
        }
    }

    pub fn with_conversation_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.conversation_logger = logger;
        self
    }

    /// Generate and store a title for a session.
    ///
    /// Returns the new title, or `None` when nothing changed. Failures are
    /// logged and never propagated.
    pub async fn synthesize(&self, session_id: &str, client: &dyn ProviderClient) -> Option<String> {
        match self.try_synthesize(session_id, client).await {
            Ok(title) => title,
            Err(e) => {
                warn!("Title generation for session {} failed: {}", session_id, e);
                None
            }
        }
    }

    async fn try_synthesize(
        &self,
        session_id: &str,
        client: &dyn ProviderClient,
    ) -> Result<Option<String>, TitleError> {
        let messages = self
            .sessions
            .messages(session_id, Some(TITLE_SOURCE_WINDOW), 0)
            .await?;
        let Some(source) = title_source(&messages) else {
            debug!("Session {} has no user message to title", session_id);
            return Ok(None);
        };

        let prompt = build_title_prompt(&source.content);
        let response = client
            .complete(&[ChatMessage::user(prompt)], &self.options)
            .await?;
        debug!("Raw title for session {}: {:?}", session_id, response.content);

        let Some(title) = clean_title(&response.content) else {
            debug!("Model returned an empty title for session {}", session_id);
            return Ok(None);
        };

        // The session may have been deleted or renamed while we waited
        match self.sessions.store().get_session(session_id).await? {
            Some(session) if session.has_default_title() => {}
            Some(_) => {
                debug!("Session {} was renamed meanwhile, keeping its title", session_id);
                return Ok(None);
            }
            None => {
                debug!("Session {} no longer exists, dropping title", session_id);
                return Ok(None);
            }
        }

        self.sessions.update_title(session_id, &title).await?;
        info!("Session {} titled '{}'", session_id, title);
        self.conversation_logger.log(ConversationEvent::new(
            "title_generated",
            json!({ "session_id": session_id, "title": title }),
        ));
        Ok(Some(title))
    }
}

/// Runs title synthesis in the background, one pending task per session.
pub struct TitleScheduler {
    synthesizer: Arc<TitleSynthesizer>,
    registry: Arc<ClientRegistry>,
    sessions: Arc<SessionService>,
    sink: PresentationSink,
    delay: Duration,
    pending: Arc<Mutex<HashMap<String, (u64, JoinHandle<()>)>>>,
    next_ticket: AtomicU64,
}

impl TitleScheduler {
    pub fn new(
        synthesizer: Arc<TitleSynthesizer>,
        registry: Arc<ClientRegistry>,
        sessions: Arc<SessionService>,
        sink: PresentationSink,
        delay: Duration,
    ) -> Self {
        Self {
            synthesizer,
            registry,
            sessions,
            sink,
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// Build a synthesizer and scheduler from generation parameters.
    pub fn from_params(
        params: &GenerationParams,
        registry: Arc<ClientRegistry>,
        sessions: Arc<SessionService>,
        sink: PresentationSink,
        logger: Arc<dyn ConversationLogger>,
    ) -> Self {
        let synthesizer = TitleSynthesizer::new(sessions.clone(), params.title_options())
            .with_conversation_logger(logger);
        Self::new(
            Arc::new(synthesizer),
            registry,
            sessions,
            sink,
            params.title_delay,
        )
    }

    fn lock(
        pending: &Mutex<HashMap<String, (u64, JoinHandle<()>)>>,
    ) -> MutexGuard<'_, HashMap<String, (u64, JoinHandle<()>)>> {
        pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Schedule title synthesis for a session after the configured delay.
    ///
    /// A task already pending for the session is aborted and replaced.
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, session_id: &str) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let session_id = session_id.to_string();

        let synthesizer = self.synthesizer.clone();
        let registry = self.registry.clone();
        let sessions = self.sessions.clone();
        let sink = self.sink.clone();
        let delay = self.delay;
        let pending = self.pending.clone();
        let task_session = session_id.clone();

        // Held across spawn so the task cannot deregister before it is registered
        let mut map = Self::lock(&self.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(title) =
                run_scheduled(&synthesizer, &registry, &sessions, &task_session).await
            {
                let _ = sink.send(UiEvent::TitleChanged {
                    session_id: task_session.clone(),
                    title,
                });
            }

            let mut map = Self::lock(&pending);
            if map.get(&task_session).map(|(t, _)| *t) == Some(ticket) {
                map.remove(&task_session);
            }
        });

        if let Some((_, previous)) = map.insert(session_id.clone(), (ticket, handle)) {
            debug!("Replacing pending title task for session {}", session_id);
            previous.abort();
        }
        debug!("Title synthesis for session {} scheduled in {:?}", session_id, delay);
    }

    /// Abort a pending task. Returns true if one was pending.
    pub fn cancel(&self, session_id: &str) -> bool {
        match Self::lock(&self.pending).remove(session_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, (_, handle)) in Self::lock(&self.pending).drain() {
            handle.abort();
        }
    }

    /// Number of title tasks that have not finished yet.
    pub fn pending_count(&self) -> usize {
        Self::lock(&self.pending)
            .values()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }
}

async fn run_scheduled(
    synthesizer: &TitleSynthesizer,
    registry: &ClientRegistry,
    sessions: &SessionService,
    session_id: &str,
) -> Option<String> {
    let session = match sessions.store().get_session(session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!("Session {} gone before title synthesis", session_id);
            return None;
        }
        Err(e) => {
            warn!("Could not load session {} for titling: {}", session_id, e);
            return None;
        }
    };

    let model = session.model_ref();
    let Some(client) = registry.get(&model.provider, &model.model) else {
        debug!("No client for {} - skipping title synthesis", model);
        return None;
    };
    synthesizer.synthesize(session_id, client.as_ref()).await
}
