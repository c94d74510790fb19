//! Console formatting for sessions, models and reports

use colored::Colorize;
use corsie_application::{SessionSummary, StoreStats};
use corsie_domain::{ModelDescriptor, Session};
use chrono::{DateTime, Local, Utc};

/// Formats listings and reports for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Numbered session list, most recent first. The current session is
    /// marked with `*`.
    pub fn session_list(sessions: &[Session], current: Option<&str>) -> String {
        if sessions.is_empty() {
            return format!("{}\n", "No sessions yet.".dimmed());
        }

        let mut output = Self::section_header("Sessions");
        for (index, session) in sessions.iter().enumerate() {
            let marker = if current == Some(session.id.as_str()) {
                "*".green().bold().to_string()
            } else {
                " ".to_string()
            };
            output.push_str(&format!(
                "{marker} {:>2}. {}  {}\n",
                index + 1,
                session.title.bold(),
                format!("({}, {})", session.model, Self::local_time(session.updated_at)).dimmed()
            ));
        }
        output
    }

    pub fn summary(summary: &SessionSummary) -> String {
        let mut output = Self::section_header(&summary.title);
        let rows = [
            ("Model", summary.model.clone()),
            ("Created", Self::local_time(summary.created_at)),
            ("Updated", Self::local_time(summary.updated_at)),
            ("Messages", summary.total_messages.to_string()),
            ("  user", summary.user_messages.to_string()),
            ("  assistant", summary.assistant_messages.to_string()),
            ("Characters", summary.total_characters.to_string()),
            (
                "System prompt",
                if summary.has_system_prompt { "yes" } else { "no" }.to_string(),
            ),
        ];
        for (label, value) in rows {
            output.push_str(&format!("{:<14} {}\n", format!("{label}:").cyan(), value));
        }
        output
    }

    /// Models grouped by provider; `current` is the selected model string.
    pub fn models(models: &[ModelDescriptor], current: &str) -> String {
        if models.is_empty() {
            return format!(
                "{}\n",
                "No models available. Set DEEPSEEK_API_KEY or OPENROUTER_API_KEY.".yellow()
            );
        }

        let mut output = String::new();
        let mut provider = "";
        for model in models {
            if model.provider != provider {
                provider = &model.provider;
                output.push_str(&Self::section_header(provider));
            }
            let model_string = model.model_string();
            let marker = if model_string == current { "*" } else { " " };
            output.push_str(&format!(
                "{marker} {:<48} {}\n",
                model_string,
                format!("{} ({}k ctx)", model.display_name, model.max_context / 1024).dimmed()
            ));
        }
        output
    }

    pub fn stats(stats: &StoreStats) -> String {
        let first = stats
            .first_session_at
            .map(Self::local_time)
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{}{:<14} {}\n{:<14} {}\n{:<14} {}\n",
            Self::section_header("Storage"),
            "Sessions:".cyan(),
            stats.total_sessions,
            "Messages:".cyan(),
            stats.total_messages,
            "First session:".cyan(),
            first
        )
    }

    pub fn help() -> String {
        let commands = [
            ("/help", "Show this help"),
            ("/new [title]", "Start a new session"),
            ("/sessions", "List sessions"),
            ("/switch <n>", "Switch to session number n"),
            ("/model [provider/model]", "Show or change the session model"),
            ("/system [prompt]", "Set the system prompt (no argument clears it)"),
            ("/title <title>", "Rename the session"),
            ("/delete", "Delete the current session"),
            ("/clear", "Delete the messages of the current session"),
            ("/export [path]", "Write the session as Markdown"),
            ("/summary", "Show session statistics"),
            ("/models", "List available models"),
            ("/stats", "Show storage statistics"),
            ("/cleanup [days]", "Remove data older than n days and empty sessions"),
            ("/quit", "Exit"),
        ];
        let mut output = Self::section_header("Commands");
        for (command, description) in commands {
            output.push_str(&format!("  {:<26} {}\n", command, description));
        }
        output.push_str(&format!("\n{}\n", "Ctrl-C cancels a running reply.".dimmed()));
        output
    }

    pub fn welcome(session: &Session) -> String {
        let line = "=".repeat(60);
        format!(
            "{}\n{:^60}\n{}\n{} {}\n{} {}\n{}\n",
            line.cyan(),
            "Corsie".bold(),
            line.cyan(),
            "Session:".dimmed(),
            session.title,
            "Model:".dimmed(),
            session.model,
            "Type /help for commands.".dimmed()
        )
    }

    pub fn error(message: &str) -> String {
        format!("{} {}", "Error:".red().bold(), message)
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    fn local_time(at: DateTime<Utc>) -> String {
        at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
    }
}
