//! CLI command definitions

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for corsie
#[derive(Parser, Debug)]
#[command(name = "corsie")]
#[command(author, version, about = "Multi-session streaming chat client for DeepSeek and OpenRouter")]
#[command(long_about = r#"
Corsie is a terminal chat client that streams answers from OpenAI-compatible
providers and keeps every conversation as a session.

Run without a prompt to start the interactive REPL, or pass a prompt to get a
single streamed answer in a fresh session.

Credentials are read from DEEPSEEK_API_KEY and OPENROUTER_API_KEY unless the
config file says otherwise.

Configuration files are loaded from (in priority order):
1. CORSIE_* environment variables (e.g. CORSIE_GENERATION__MAX_TOKENS=512)
2. --config <path>     Explicit config file
3. ./corsie.toml       Project-level config
4. ~/.config/corsie/config.toml   Global config

Example:
  corsie "Explain Rust lifetimes in two sentences"
  corsie -m openrouter/anthropic/claude-sonnet-4 -s "Answer in French"
  corsie --list-models
"#)]
pub struct Cli {
    /// Prompt to answer once (omit to start the REPL)
    pub prompt: Option<String>,

    /// Model for new sessions, as provider/model
    #[arg(short, long, value_name = "PROVIDER/MODEL")]
    pub model: Option<String>,

    /// System prompt for new sessions
    #[arg(short, long, value_name = "PROMPT")]
    pub system: Option<String>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,

    /// List models of every provider with a credential and exit
    #[arg(long)]
    pub list_models: bool,

    /// Append a JSONL transcript of generations and titles to this file
    #[arg(long, value_name = "PATH")]
    pub transcript: Option<PathBuf>,

    /// Also write diagnostic logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}
