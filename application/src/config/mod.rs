//! Application-level configuration.
//!
//! - [`GenerationParams`] - sampling, history window and timing of generations

pub mod generation_params;

pub use generation_params::GenerationParams;
