//! Core domain types and ports for mcwrap.
//!
//! This crate holds the pure data the supervisor publishes to its callers
//! (status, roster), the settings it is constructed from, and the error
//! taxonomy shared by every adapter. It has no process or filesystem logic;
//! see `mcwrap-runtime` for that.

#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod error;
pub mod ports;
pub mod settings;

pub use domain::{PlayerRoster, ProcessStatus, StatusSnapshot};
pub use error::{ErrorCategory, SupervisorError, SupervisorResult};
pub use ports::{ConsoleInputPort, ConsoleReader, NoConsoleInput, StdinConsoleInput};
pub use settings::{
    DEFAULT_JOIN_PATTERN, DEFAULT_LEAVE_PATTERN, DEFAULT_READY_PATTERN, ServerSettings,
    split_flags,
};

// Silence unused dev-dependency warnings; serde_json is only used by tests
#[cfg(test)]
use serde_json as _;
