//! CLI entrypoint for corsie
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, bail};
use clap::Parser;
use corsie_application::{
    ClientRegistry, ConversationLogger, ConversationStore, GenerationOrchestrator,
    GenerationOutcome, NoConversationLogger, SecretStore, SessionService, TitleScheduler,
    presentation_channel,
};
use corsie_domain::{ConfigIssue, ConfigIssueCode};
use corsie_infrastructure::{
    ConfigLoader, ConfigSecretStore, FileConfig, HttpClientFactory, InMemoryConversationStore,
    JsonlTranscript,
};
use corsie_presentation::{ChatRepl, Cli, ConsoleFormatter};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    info!("Starting corsie");

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_deref());
        return Ok(());
    }

    // === Configuration ===
    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref()).context("Failed to load configuration")?
    };
    check_config(&config)?;

    let mut params = config.to_generation_params();
    if let Some(model) = &cli.model {
        params.default_model = model.clone();
    }

    // === Dependency Injection ===
    let provider_config = config.to_provider_config();
    let secrets = Arc::new(ConfigSecretStore::new(provider_config.clone()));
    if secrets.configured_providers().is_empty() {
        let issue = ConfigIssue::warning(
            ConfigIssueCode::NoCredentials,
            "no API key found for any provider; set DEEPSEEK_API_KEY or OPENROUTER_API_KEY",
        );
        eprintln!("{}", ConsoleFormatter::error(&issue.to_string()));
    }
    let factory = Arc::new(HttpClientFactory::new(provider_config)?);
    let registry = Arc::new(ClientRegistry::new(factory, secrets));

    if cli.list_models {
        print!(
            "{}",
            ConsoleFormatter::models(&registry.available_models(), &params.default_model)
        );
        return Ok(());
    }

    let store: Arc<dyn ConversationStore> = match config.storage.resolved_data_file() {
        Some(path) => {
            info!("Conversation data in {}", path.display());
            Arc::new(InMemoryConversationStore::open(path)?)
        }
        None => Arc::new(InMemoryConversationStore::new()),
    };
    let sessions = Arc::new(SessionService::new(store, params.default_model.clone()));

    let logger: Arc<dyn ConversationLogger> = match &cli.transcript {
        Some(path) => Arc::new(
            JsonlTranscript::open(path)
                .with_context(|| format!("Failed to open transcript {}", path.display()))?,
        ),
        None => Arc::new(NoConversationLogger),
    };

    let (sink, events) = presentation_channel();
    let titles = Arc::new(TitleScheduler::from_params(
        &params,
        registry.clone(),
        sessions.clone(),
        sink.clone(),
        logger.clone(),
    ));
    let orchestrator = Arc::new(
        GenerationOrchestrator::new(sessions.clone(), registry.clone(), sink, params)
            .with_title_scheduler(titles.clone())
            .with_conversation_logger(logger),
    );

    let removed = sessions.cleanup_empty_sessions().await?;
    if removed > 0 {
        info!("Removed {} empty sessions left from earlier runs", removed);
    }

    let mut repl = ChatRepl::new(orchestrator, registry, events);

    // One-shot mode: answer in a fresh session and exit
    if let Some(prompt) = cli.prompt.as_deref() {
        sessions
            .create_session(None, cli.model.clone(), cli.system.clone())
            .await?;
        let outcome = repl.ask(prompt).await;
        titles.cancel_all();
        return match outcome {
            Some(GenerationOutcome::Completed { .. }) => Ok(()),
            Some(GenerationOutcome::Failed { error, .. }) => bail!("No reply was generated: {error}"),
            _ => bail!("No reply was generated"),
        };
    }

    if cli.model.is_some() || cli.system.is_some() {
        sessions
            .create_session(None, cli.model.clone(), cli.system.clone())
            .await?;
    }

    repl.run().await?;
    titles.cancel_all();
    Ok(())
}

/// Print configuration issues and fail if any of them is an error.
fn check_config(config: &FileConfig) -> Result<()> {
    let issues = config.validate();
    for issue in &issues {
        if issue.is_error() {
            eprintln!("{}", ConsoleFormatter::error(&issue.to_string()));
        } else {
            warn!("{}", issue);
        }
    }
    if issues.iter().any(ConfigIssue::is_error) {
        bail!("Invalid configuration");
    }
    Ok(())
}

/// Initialize logging based on verbosity level, optionally mirrored to a file.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_name = path
                .file_name()
                .context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
