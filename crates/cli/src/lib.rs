//! Command implementations for the `cloakref` binary.
pub mod commands;
