//! Shared error types for the cloakref workspace.
pub mod errors;
