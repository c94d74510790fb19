//! Interactive chat module
//!
//! Provides a line-based chat REPL over stdin with slash commands.

mod command;
mod repl;

pub use command::{DEFAULT_RETENTION_DAYS, ReplCommand};
pub use repl::ChatRepl;
