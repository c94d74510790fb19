//! Core domain concepts shared across all subdomains.
//!
//! - [`model::ModelRef`] - a `provider/model` pair parsed from a session's model string
//! - [`model::ModelDescriptor`] - what a provider reports about a model
//! - [`error::DomainError`] - domain-level errors

pub mod error;
pub mod model;
