//! Presentation layer for corsie
//!
//! This crate contains the CLI definition, console and stream rendering,
//! and the interactive chat REPL.

pub mod chat;
pub mod cli;
pub mod output;

// Re-export commonly used types
pub use chat::{ChatRepl, DEFAULT_RETENTION_DAYS, ReplCommand};
pub use cli::commands::Cli;
pub use output::console::ConsoleFormatter;
pub use output::stream::StreamRenderer;
