//! Slash commands understood by the REPL.

use std::path::PathBuf;

/// Days of history kept by `/cleanup` without an argument.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    New { title: Option<String> },
    Sessions,
    /// 1-based position in the `/sessions` list
    Switch(usize),
    /// Show (`None`) or change the model
    Model(Option<String>),
    /// Set (`Some`) or clear the system prompt
    System(Option<String>),
    Title(String),
    Delete,
    Clear,
    Export(Option<PathBuf>),
    Summary,
    Models,
    Stats,
    Cleanup { days: u32 },
    Quit,
    /// Known command with bad arguments; carries the usage line
    Usage(&'static str),
    Unknown(String),
}

impl ReplCommand {
    /// Parse a line starting with `/`. Returns `None` for ordinary messages.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let rest = line.strip_prefix('/')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let arg = (!arg.is_empty()).then(|| arg.to_string());

        let command = match name.to_ascii_lowercase().as_str() {
            "help" | "h" | "?" => Self::Help,
            "new" => Self::New { title: arg },
            "sessions" | "ls" => Self::Sessions,
            "switch" => match arg.as_deref().map(str::parse::<usize>) {
                Some(Ok(n)) if n > 0 => Self::Switch(n),
                _ => Self::Usage("/switch <n>"),
            },
            "model" => Self::Model(arg),
            "system" => Self::System(arg),
            "title" => match arg {
                Some(title) => Self::Title(title),
                None => Self::Usage("/title <title>"),
            },
            "delete" => Self::Delete,
            "clear" => Self::Clear,
            "export" => Self::Export(arg.map(PathBuf::from)),
            "summary" => Self::Summary,
            "models" => Self::Models,
            "stats" => Self::Stats,
            "cleanup" => match arg.as_deref().map(str::parse::<u32>) {
                None => Self::Cleanup {
                    days: DEFAULT_RETENTION_DAYS,
                },
                Some(Ok(days)) => Self::Cleanup { days },
                Some(Err(_)) => Self::Usage("/cleanup [days]"),
            },
            "quit" | "exit" | "q" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        };
        Some(command)
    }
}
