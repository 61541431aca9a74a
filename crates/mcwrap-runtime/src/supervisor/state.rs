//! State shared between the supervisor handle and its background tasks.

use std::sync::{Arc, Mutex, PoisonError};

use mcwrap_core::{PlayerRoster, ProcessStatus, ServerSettings, StatusSnapshot};
use tokio::process::ChildStdin;
use tokio::sync::watch;
use tracing::debug;

use crate::events::LogEventDispatcher;
use crate::relay::{SharedRoster, SharedStdin};
use crate::world_lock::WorldAccessLock;

/// Status channel; every change records its time.
pub(crate) type StatusCell = Arc<watch::Sender<StatusSnapshot>>;

pub(crate) struct Shared {
    pub settings: ServerSettings,
    pub dispatcher: Arc<LogEventDispatcher>,
    pub roster: SharedRoster,
    pub status: StatusCell,
    pub lock: WorldAccessLock,
    pub stdin: SharedStdin<ChildStdin>,
    pub pid: Mutex<Option<u32>>,
}

impl Shared {
    pub fn new(settings: ServerSettings) -> Self {
        let (status, _) = watch::channel(StatusSnapshot::default());
        Self {
            settings,
            dispatcher: Arc::new(LogEventDispatcher::new()),
            roster: Arc::new(Mutex::new(PlayerRoster::new())),
            status: Arc::new(status),
            lock: WorldAccessLock::new(),
            stdin: Arc::new(tokio::sync::Mutex::new(None)),
            pid: Mutex::new(None),
        }
    }

    pub fn current(&self) -> StatusSnapshot {
        *self.status.borrow()
    }

    pub fn set_status(&self, to: ProcessStatus) {
        set_status(&self.status, to);
    }

    /// Move to `to` if the current status is one of `from`.
    ///
    /// Returns the current status when the move is not allowed.
    pub fn transition(&self, from: &[ProcessStatus], to: ProcessStatus) -> Result<(), ProcessStatus> {
        transition(&self.status, from, to)
    }

    pub fn roster(&self) -> std::sync::MutexGuard<'_, PlayerRoster> {
        self.roster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_pid(&self, pid: Option<u32>) {
        *self.pid.lock().unwrap_or_else(PoisonError::into_inner) = pid;
    }
}

pub(crate) fn set_status(cell: &StatusCell, to: ProcessStatus) {
    let previous = cell.send_replace(StatusSnapshot::now(to));
    if previous.status != to {
        debug!(from = %previous.status, to = %to, "Server status changed");
    }
}

pub(crate) fn transition(
    cell: &StatusCell,
    from: &[ProcessStatus],
    to: ProcessStatus,
) -> Result<(), ProcessStatus> {
    let mut rejected = None;
    cell.send_if_modified(|snapshot| {
        if from.contains(&snapshot.status) {
            debug!(from = %snapshot.status, to = %to, "Server status changed");
            *snapshot = StatusSnapshot::now(to);
            true
        } else {
            rejected = Some(snapshot.status);
            false
        }
    });
    rejected.map_or(Ok(()), Err)
}
