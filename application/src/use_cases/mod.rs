//! Use cases (application services)

pub mod client_registry;
pub mod generate_response;
pub mod session_service;
pub mod synthesize_title;

#[cfg(test)]
pub(crate) mod test_support;
