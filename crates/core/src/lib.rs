//! Core library for the smokestack provisioning harness
//!
//! This crate contains shared logic for remote command execution, readiness
//! polling, the staged pipeline with compensating cleanup, the deployment
//! lifecycle state machine, orchestration, logging, and error handling.

pub mod command;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod profile;
pub mod readiness;
pub mod redaction;
pub mod registry;
pub mod rest;
pub mod retry;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
