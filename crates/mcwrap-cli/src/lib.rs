//! Command-line front end for mcwrap.
//!
//! Parses flags and environment into [`mcwrap_core::ServerSettings`] and runs
//! one of the commands against a [`mcwrap_runtime::ProcessSupervisor`].

#![deny(unused_crate_dependencies)]

// Silence unused dev-dependency warnings; tempfile is only used by tests
#[cfg(test)]
use tempfile as _;

// Used by the binary target only
use dotenvy as _;
use tracing_subscriber as _;

pub mod commands;
pub mod handlers;
pub mod parser;

pub use commands::{Commands, DEFAULT_BASE_NAME, default_output};
pub use parser::{Cli, ServerArgs};
