//! Terminal output: streamed replies and formatted listings.

pub mod console;
pub mod stream;
