//! Server lifecycle status.
//!
//! The status is the only source of truth for whether the child process may be
//! started or stopped. Transitions are owned by the supervisor; everything else
//! reads snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of the supervised server process.
///
/// ```text
/// Stopped --start--> Starting --ready line--> Running --stop--> Stopping --exit--> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// No child process exists.
    Stopped,
    /// The child has been spawned but has not reported readiness yet.
    Starting,
    /// The child reported readiness and accepts commands.
    Running,
    /// A stop command was sent; waiting for the child to exit.
    Stopping,
}

impl ProcessStatus {
    /// Whether `start` is accepted from this status.
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether `stop` is accepted from this status.
    pub const fn can_stop(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Lowercase name, as used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status together with the time it was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Current status.
    pub status: ProcessStatus,
    /// When the status last changed.
    pub changed_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Snapshot for `status` entered now.
    pub fn now(status: ProcessStatus) -> Self {
        Self {
            status,
            changed_at: Utc::now(),
        }
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::now(ProcessStatus::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stopped_can_start() {
        assert!(ProcessStatus::Stopped.can_start());
        assert!(!ProcessStatus::Starting.can_start());
        assert!(!ProcessStatus::Running.can_start());
        assert!(!ProcessStatus::Stopping.can_start());
    }

    #[test]
    fn only_running_can_stop() {
        assert!(ProcessStatus::Running.can_stop());
        assert!(!ProcessStatus::Stopped.can_stop());
        assert!(!ProcessStatus::Starting.can_stop());
        assert!(!ProcessStatus::Stopping.can_stop());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ProcessStatus::Stopping).unwrap();
        assert_eq!(json, "\"stopping\"");
        assert_eq!(ProcessStatus::Running.to_string(), "running");
    }

    #[test]
    fn default_snapshot_is_stopped() {
        assert_eq!(StatusSnapshot::default().status, ProcessStatus::Stopped);
    }
}
