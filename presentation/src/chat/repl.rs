//! REPL (Read-Eval-Print Loop) for interactive chat

use super::command::ReplCommand;
use crate::output::console::ConsoleFormatter;
use crate::output::stream::{StreamRenderer, is_terminal};
use colored::Colorize;
use corsie_application::{
    ClientRegistry, GenerationOrchestrator, GenerationOutcome, SessionService, StoreError, UiEvent,
};
use corsie_domain::{ModelRef, ProviderKind, Session, find_model};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

enum Flow {
    Continue,
    Quit,
}

/// Interactive chat REPL
pub struct ChatRepl {
    orchestrator: Arc<GenerationOrchestrator>,
    registry: Arc<ClientRegistry>,
    events: mpsc::UnboundedReceiver<UiEvent>,
    renderer: StreamRenderer,
    out: Box<dyn Write + Send>,
}

impl ChatRepl {
    /// Create a REPL that renders the events the orchestrator emits.
    pub fn new(
        orchestrator: Arc<GenerationOrchestrator>,
        registry: Arc<ClientRegistry>,
        events: mpsc::UnboundedReceiver<UiEvent>,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            events,
            renderer: StreamRenderer::new(),
            out: Box::new(io::stdout()),
        }
    }

    /// Write somewhere other than stdout.
    pub fn with_output(mut self, out: impl Write + Send + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    fn sessions(&self) -> Arc<SessionService> {
        Arc::clone(self.orchestrator.sessions())
    }

    fn write(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn error(&mut self, message: &str) {
        let line = format!("{}\n", ConsoleFormatter::error(message));
        self.write(&line);
    }

    fn show(&mut self, event: &UiEvent) {
        if let Some(text) = self.renderer.render(event) {
            self.write(&text);
        }
    }

    /// Run the interactive REPL until `/quit` or end of input.
    pub async fn run(&mut self) -> io::Result<()> {
        let session = self.ensure_session().await.map_err(io::Error::other)?;
        self.write(&ConsoleFormatter::welcome(&session));

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            self.write(&format!("{} ", ">".green().bold()));

            let line = tokio::select! {
                line = lines.next_line() => line?,
                Some(event) = self.events.recv() => {
                    // Late events such as generated titles
                    self.write("\r");
                    self.show(&event);
                    continue;
                }
                _ = tokio::signal::ctrl_c() => {
                    self.write("^C\n");
                    continue;
                }
            };

            let Some(line) = line else {
                self.write("\nBye!\n");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(command) = ReplCommand::parse(line) {
                if let Flow::Quit = self.execute(command).await {
                    break;
                }
                continue;
            }

            self.ask(line).await;
        }

        self.orchestrator.cancel_all();
        Ok(())
    }

    /// Send a message to the current session and render the reply.
    ///
    /// Ctrl-C cancels the generation. Returns `None` if the message was
    /// rejected.
    pub async fn ask(&mut self, text: &str) -> Option<GenerationOutcome> {
        let ticket = match self.orchestrator.submit(text).await {
            Ok(ticket) => ticket,
            Err(e) => {
                self.error(&e.to_string());
                return None;
            }
        };
        let session_id = ticket.session_id.clone();

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    self.show(&event);
                    if is_terminal(&event, &session_id) {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    self.orchestrator.cancel(&session_id);
                }
            }
        }

        let outcome = ticket.wait().await;
        debug!(
            "Generation for {} ended in message {}: {:?}",
            session_id,
            outcome.message_id(),
            outcome
        );
        Some(outcome)
    }

    /// The current session, resuming the most recent one or creating a
    /// new one when nothing is selected.
    pub async fn ensure_session(&self) -> Result<Session, StoreError> {
        let sessions = self.sessions();
        if let Some(session) = sessions.current_session().await? {
            return Ok(session);
        }
        if let Some(latest) = sessions.list_sessions(Some(1), 0).await?.into_iter().next() {
            return sessions.switch_to(&latest.id).await;
        }
        sessions.create_session(None, None, None).await
    }

    async fn execute(&mut self, command: ReplCommand) -> Flow {
        match self.try_execute(command).await {
            Ok(flow) => flow,
            Err(e) => {
                self.error(&e.to_string());
                Flow::Continue
            }
        }
    }

    async fn try_execute(&mut self, command: ReplCommand) -> Result<Flow, StoreError> {
        let sessions = self.sessions();
        match command {
            ReplCommand::Quit => {
                self.write("Bye!\n");
                return Ok(Flow::Quit);
            }
            ReplCommand::Help => self.write(&ConsoleFormatter::help()),
            ReplCommand::New { title } => {
                let session = sessions.create_session(title, None, None).await?;
                self.write(&format!("Started \"{}\" ({})\n", session.title, session.model));
            }
            ReplCommand::Sessions => {
                let list = sessions.list_sessions(None, 0).await?;
                let current = sessions.current_session_id();
                self.write(&ConsoleFormatter::session_list(&list, current.as_deref()));
            }
            ReplCommand::Switch(n) => {
                let list = sessions.list_sessions(None, 0).await?;
                match n.checked_sub(1).and_then(|i| list.get(i)) {
                    Some(target) => {
                        let session = sessions.switch_to(&target.id).await?;
                        let count = sessions.message_count(&session.id).await?;
                        self.write(&format!(
                            "Switched to \"{}\" ({} messages)\n",
                            session.title, count
                        ));
                    }
                    None => self.error(&format!("No session #{n} (see /sessions)")),
                }
            }
            ReplCommand::Model(None) => {
                let session = self.ensure_session().await?;
                self.write(&format!("Model: {}\n", session.model));
            }
            ReplCommand::Model(Some(model)) => self.change_model(&model).await?,
            ReplCommand::System(prompt) => {
                let session = self.ensure_session().await?;
                let set = prompt.is_some();
                sessions.update_system_prompt(&session.id, prompt).await?;
                self.write(if set {
                    "System prompt set.\n"
                } else {
                    "System prompt cleared.\n"
                });
            }
            ReplCommand::Title(title) => {
                let session = self.ensure_session().await?;
                let session = sessions.update_title(&session.id, &title).await?;
                self.write(&format!("Renamed to \"{}\"\n", session.title));
            }
            ReplCommand::Delete => {
                let session = self.ensure_session().await?;
                if self.orchestrator.is_generating(&session.id) {
                    self.error("A reply is still being generated for this session");
                    return Ok(Flow::Continue);
                }
                sessions.delete_session(&session.id).await?;
                let next = self.ensure_session().await?;
                self.write(&format!(
                    "Deleted \"{}\". Now in \"{}\".\n",
                    session.title, next.title
                ));
            }
            ReplCommand::Clear => {
                let session = self.ensure_session().await?;
                let deleted = sessions.clear_messages(&session.id).await?;
                self.write(&format!("Deleted {deleted} messages.\n"));
            }
            ReplCommand::Export(path) => {
                let session = self.ensure_session().await?;
                let Some(markdown) = sessions.export_markdown(&session.id).await? else {
                    return Err(StoreError::SessionNotFound(session.id));
                };
                let path = path.unwrap_or_else(|| export_file_name(&session));
                match std::fs::write(&path, markdown) {
                    Ok(()) => self.write(&format!("Exported to {}\n", path.display())),
                    Err(e) => self.error(&format!("{}: {e}", path.display())),
                }
            }
            ReplCommand::Summary => {
                let session = self.ensure_session().await?;
                if let Some(summary) = sessions.summary(&session.id).await? {
                    self.write(&ConsoleFormatter::summary(&summary));
                }
            }
            ReplCommand::Models => {
                let session = self.ensure_session().await?;
                let models = self.registry.available_models();
                self.write(&ConsoleFormatter::models(&models, &session.model));
            }
            ReplCommand::Stats => {
                let stats = sessions.stats().await?;
                self.write(&ConsoleFormatter::stats(&stats));
            }
            ReplCommand::Cleanup { days } => {
                let report = sessions.cleanup_old_data(days).await?;
                let empty = sessions.cleanup_empty_sessions().await?;
                self.ensure_session().await?;
                self.write(&format!(
                    "Removed {} messages and {} sessions older than {} days, {} empty sessions.\n",
                    report.messages_deleted, report.sessions_deleted, days, empty
                ));
            }
            ReplCommand::Usage(usage) => self.error(&format!("Usage: {usage}")),
            ReplCommand::Unknown(line) => {
                self.error(&format!("Unknown command: {line}"));
                self.write("Type /help for available commands\n");
            }
        }
        Ok(Flow::Continue)
    }

    async fn change_model(&mut self, model: &str) -> Result<(), StoreError> {
        if !model.contains('/') {
            self.error("Model must be given as provider/model");
            return Ok(());
        }
        let model_ref = ModelRef::parse(model);
        let Some(kind) = ProviderKind::from_key(&model_ref.provider) else {
            self.error(&format!(
                "Unknown provider '{}' (expected deepseek or openrouter)",
                model_ref.provider
            ));
            return Ok(());
        };
        if find_model(kind, &model_ref.model).is_none() {
            let warning = format!("'{}' is not in the {} catalog, using it anyway\n", model_ref.model, kind);
            self.write(&warning.yellow().to_string());
        }

        let session = self.ensure_session().await?;
        let session = self
            .sessions()
            .update_model(&session.id, &model_ref.as_model_string())
            .await?;
        self.write(&format!("Model set to {}\n", session.model));
        Ok(())
    }
}

/// Default export path: the title with unsafe characters replaced.
fn export_file_name(session: &Session) -> PathBuf {
    let stem: String = session
        .title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        PathBuf::from(format!("corsie-{}.md", corsie_domain::util::truncate_str(&session.id, 8)))
    } else {
        PathBuf::from(format!("{stem}.md"))
    }
}
