//! Error taxonomy for supervisor operations.
//!
//! Lifecycle violations, bad input and internal failures are kept apart so the
//! control layer can map them onto "method not allowed", "invalid parameter"
//! and opaque server errors respectively (see [`ErrorCategory`]).

use thiserror::Error;

use crate::domain::ProcessStatus;

/// Errors returned by the process supervisor and its world operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    // === Lifecycle ===
    /// `start` was called while a process is already starting, running or stopping.
    #[error("Server is already {0}")]
    AlreadyRunning(ProcessStatus),

    /// An operation was attempted from a status that does not allow it.
    #[error("Cannot {operation} while server is {status}")]
    InvalidStateTransition {
        operation: &'static str,
        status: ProcessStatus,
    },

    /// A command was sent while no child process is live.
    #[error("Server process is not running")]
    ProcessNotRunning,

    /// The child exited before a response pattern was observed.
    #[error("Server process exited before responding")]
    ProcessExited,

    /// A bounded wait elapsed.
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    // === Archive / input ===
    /// An archive entry would be extracted outside the target directory.
    #[error("Archive entry '{0}' would extract outside the world directory")]
    PathEscape(String),

    /// The uploaded archive is neither a zip nor a gzip-compressed tar.
    #[error("Unrecognized archive format")]
    UnrecognizedArchiveFormat,

    /// A required piece of input is absent.
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// A configured log pattern failed to compile.
    #[error("Invalid log pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The archive codec reported a malformed archive.
    #[error("Archive error: {0}")]
    Archive(String),

    // === OS ===
    /// Spawn or filesystem failure, propagated unchanged.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a control layer should surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected because of the current lifecycle status.
    StateConflict,
    /// The caller supplied missing or invalid input.
    InvalidInput,
    /// Anything else; opaque to the caller.
    Internal,
}

impl SupervisorError {
    /// Classify this error for presentation.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadyRunning(_) | Self::InvalidStateTransition { .. } | Self::ProcessNotRunning => {
                ErrorCategory::StateConflict
            }
            Self::PathEscape(_)
            | Self::UnrecognizedArchiveFormat
            | Self::MissingRequiredField(_)
            | Self::Archive(_) => ErrorCategory::InvalidInput,
            Self::ProcessExited | Self::Timeout(_) | Self::InvalidPattern { .. } | Self::Io(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Create a `MissingRequiredField` error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingRequiredField(field.into())
    }

    /// Create an `Archive` error from any displayable codec error.
    pub fn archive(err: impl std::fmt::Display) -> Self {
        Self::Archive(err.to_string())
    }
}

/// Result type alias for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_are_state_conflicts() {
        let err = SupervisorError::AlreadyRunning(ProcessStatus::Running);
        assert_eq!(err.category(), ErrorCategory::StateConflict);
        assert_eq!(err.to_string(), "Server is already running");

        let err = SupervisorError::InvalidStateTransition {
            operation: "stop",
            status: ProcessStatus::Starting,
        };
        assert_eq!(err.category(), ErrorCategory::StateConflict);
        assert_eq!(err.to_string(), "Cannot stop while server is starting");
    }

    #[test]
    fn archive_errors_are_invalid_input() {
        assert_eq!(
            SupervisorError::UnrecognizedArchiveFormat.category(),
            ErrorCategory::InvalidInput
        );
        assert_eq!(
            SupervisorError::PathEscape("../../etc/passwd".into()).category(),
            ErrorCategory::InvalidInput
        );
        assert_eq!(
            SupervisorError::missing("archive").to_string(),
            "Missing required field: archive"
        );
    }

    #[test]
    fn io_errors_are_internal() {
        let err: SupervisorError = std::io::Error::other("disk on fire").into();
        assert_eq!(err.category(), ErrorCategory::Internal);
    }
}
