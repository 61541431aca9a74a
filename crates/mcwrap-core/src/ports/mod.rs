//! Port definitions (trait abstractions) for capabilities supplied by the host.
//!
//! The supervisor never reaches for process-wide state on its own; the host
//! hands it whatever external input it should relay to the child.

mod console_input;

pub use console_input::{ConsoleInputPort, ConsoleReader, NoConsoleInput, StdinConsoleInput};
