//! Forwarding host termination signals to the server process.

use std::fmt;
use std::io;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Termination signal received by the wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Deliver `signal` to the process with the given PID.
///
/// A process that is already gone is not an error.
#[cfg(unix)]
pub fn send_to_pid(pid: u32, signal: ShutdownSignal) -> io::Result<()> {
    let raw = i32::try_from(pid).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "PID out of range"))?;
    let sig = match signal {
        ShutdownSignal::Interrupt => Signal::SIGINT,
        ShutdownSignal::Terminate => Signal::SIGTERM,
    };

    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::other(e)),
    }
}

/// Signals cannot be delivered by PID here; callers fall back to the stop command.
#[cfg(not(unix))]
pub fn send_to_pid(_pid: u32, _signal: ShutdownSignal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signal delivery is only supported on unix",
    ))
}
