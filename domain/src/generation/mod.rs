//! Generation lifecycle.
//!
//! - [`state::GenerationState`] - the per-session generation state machine

pub mod state;
