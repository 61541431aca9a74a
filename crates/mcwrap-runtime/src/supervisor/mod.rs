//! Lifecycle management for the supervised Minecraft server.
//!
//! [`ProcessSupervisor`] owns at most one child process at a time. It starts
//! the server holding the world write permit, relays its stdio, tracks the
//! player roster from log output, and gives the permit back once the child
//! has exited. World export and import run only while the server is stopped.
//!
//! # Status
//!
//! ```text
//! Stopped --start()--> Starting --ready line--> Running --stop()--> Stopping --exit--> Stopped
//! ```
//!
//! Calls outside their valid source status are rejected, never queued.

mod handlers;
mod state;
mod world_ops;

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use mcwrap_core::{
    ConsoleInputPort, NoConsoleInput, ProcessStatus, ServerSettings, StatusSnapshot,
    SupervisorError, SupervisorResult,
};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{LogMatch, handler};
use crate::relay::{spawn_input_relay, spawn_output_relay};
use crate::signal::{self, ShutdownSignal};
use crate::world_lock::{ReadPermit, WritePermit};

use handlers::{compile_pattern, register_builtin};
use state::Shared;

/// How long the exit watcher lets the output relay drain after the child exits.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const EULA_FILE: &str = "eula.txt";

/// Handle to the supervised server. Cheap to clone; clones share the process.
#[derive(Clone)]
pub struct ProcessSupervisor {
    shared: Arc<Shared>,
    console: Arc<dyn ConsoleInputPort>,
}

impl ProcessSupervisor {
    /// Build a supervisor from settings.
    ///
    /// Compiles the log patterns and resolves the server jar and working
    /// directory to absolute paths. No process is started.
    pub fn new(mut settings: ServerSettings) -> SupervisorResult<Self> {
        settings.validate()?;
        settings.server_jar = std::path::absolute(&settings.server_jar)?;
        settings.working_dir = std::path::absolute(&settings.working_dir)?;

        let shared = Shared::new(settings);
        register_builtin(&shared)?;

        Ok(Self {
            shared: Arc::new(shared),
            console: Arc::new(NoConsoleInput),
        })
    }

    /// Relay operator input from `input` to the server while it runs.
    #[must_use]
    pub fn with_console_input(mut self, input: impl ConsoleInputPort + 'static) -> Self {
        self.console = Arc::new(input);
        self
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.shared.settings
    }

    // === Lifecycle ===

    /// Start the server.
    ///
    /// Only allowed while stopped. Returns once the process has been spawned;
    /// the status becomes `Running` when the server reports readiness.
    pub async fn start(&self) -> SupervisorResult<()> {
        self.shared
            .transition(&[ProcessStatus::Stopped], ProcessStatus::Starting)
            .map_err(SupervisorError::AlreadyRunning)?;
        info!("Preparing to start Minecraft server process");

        let launched = match self.write_permit().await {
            Ok(permit) => self.launch(permit).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &launched {
            warn!(error = %e, "Failed to start Minecraft server");
            self.shared.set_status(ProcessStatus::Stopped);
        }
        launched
    }

    async fn launch(&self, permit: WritePermit) -> SupervisorResult<()> {
        let settings = &self.shared.settings;
        prepare_working_dir(&settings.working_dir).await?;

        info!(
            jar = %settings.server_jar.display(),
            working_dir = %settings.working_dir.display(),
            "Starting Minecraft server process"
        );
        let mut child = Command::new(&settings.java_binary)
            .args(&settings.java_flags)
            .arg("-jar")
            .arg(&settings.server_jar)
            .args(&settings.server_flags)
            .current_dir(&settings.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let pid = child.id();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("server stdout was not captured"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("server stdin was not captured"))?;

        *self.shared.stdin.lock().await = Some(stdin);
        self.shared.set_pid(pid);
        debug!(pid = ?pid, "Minecraft server process spawned");

        let cancel = CancellationToken::new();
        let output = spawn_output_relay(stdout, Arc::clone(&self.shared.dispatcher), cancel.clone());
        let input = spawn_input_relay(
            self.console.open(),
            Arc::clone(&self.shared.stdin),
            settings.console_dump_command.clone(),
            Arc::clone(&self.shared.roster),
            cancel.clone(),
        );

        let relays = Relays {
            output,
            input,
            cancel,
        };
        tokio::spawn(watch_exit(Arc::clone(&self.shared), child, permit, relays));
        Ok(())
    }

    /// Ask the server to shut down by sending the stop command.
    ///
    /// Only allowed while running. The process is never killed; the status
    /// returns to `Stopped` when it exits.
    pub async fn stop(&self) -> SupervisorResult<()> {
        self.shared
            .transition(&[ProcessStatus::Running], ProcessStatus::Stopping)
            .map_err(|status| SupervisorError::InvalidStateTransition {
                operation: "stop",
                status,
            })?;
        info!("Stopping Minecraft server");
        self.send_command(&self.shared.settings.stop_command).await
    }

    /// Forward a host termination signal to the server.
    ///
    /// Returns `false` when no server process is live. Where signals cannot
    /// be delivered by PID the stop command is sent instead.
    pub async fn relay_signal(&self, signal: ShutdownSignal) -> SupervisorResult<bool> {
        let Some(pid) = self.shared.pid() else {
            return Ok(false);
        };
        // A starting or running server is on its way down either way
        let _ = self.shared.transition(
            &[ProcessStatus::Starting, ProcessStatus::Running],
            ProcessStatus::Stopping,
        );

        info!(%signal, pid, "Relaying signal to Minecraft server");
        if let Err(e) = signal::send_to_pid(pid, signal) {
            debug!(error = %e, "Signal delivery failed, sending stop command instead");
            self.send_command(&self.shared.settings.stop_command).await?;
        }
        Ok(true)
    }

    /// Wait until the status equals `status` and return that snapshot.
    pub async fn wait_for_status(&self, status: ProcessStatus) -> StatusSnapshot {
        let mut rx = self.shared.status.subscribe();
        match rx.wait_for(|snapshot| snapshot.status == status).await {
            Ok(snapshot) => *snapshot,
            // The sender lives in `shared`, so this is unreachable in practice
            Err(_) => self.shared.current(),
        }
    }

    /// Wait for the current server process, if any, to exit.
    pub async fn wait(&self) -> StatusSnapshot {
        self.wait_for_status(ProcessStatus::Stopped).await
    }

    // === Commands ===

    /// Write `line` and the configured terminator to the server's stdin.
    pub async fn send_command(&self, line: &str) -> SupervisorResult<()> {
        let mut guard = self.shared.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(SupervisorError::ProcessNotRunning)?;

        let mut data = String::with_capacity(line.len() + self.shared.settings.line_terminator.len());
        data.push_str(line);
        data.push_str(&self.shared.settings.line_terminator);
        stdin.write_all(data.as_bytes()).await?;
        stdin.flush().await?;

        debug!(command = %line, "Sent command to Minecraft server");
        Ok(())
    }

    /// Send `line` and wait for the first log message matching `pattern`.
    ///
    /// The response handler is registered before the command is written, so
    /// a fast reply cannot be missed. With `suppress` the matching line is
    /// kept out of the wrapper's log.
    pub async fn send_command_and_await(
        &self,
        line: &str,
        pattern: &str,
        suppress: bool,
    ) -> SupervisorResult<LogMatch> {
        let pattern = compile_pattern(pattern)?;
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let dispatcher = &self.shared.dispatcher;

        let id = dispatcher.register_once(
            pattern,
            handler(move |found| {
                if let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    let _ = tx.send(found);
                }
                async move { suppress }
            }),
        );

        if let Err(e) = self.send_command(line).await {
            dispatcher.unregister(id);
            return Err(e);
        }

        let response = async { rx.await.map_err(|_| SupervisorError::ProcessExited) };
        match self.shared.settings.response_timeout() {
            Some(limit) => timeout(limit, response).await.unwrap_or_else(|_| {
                dispatcher.unregister(id);
                Err(SupervisorError::Timeout(format!("response to '{line}'")))
            }),
            None => response.await,
        }
    }

    // === Accessors ===

    pub fn status(&self) -> StatusSnapshot {
        self.shared.current()
    }

    pub fn can_start(&self) -> bool {
        self.status().status.can_start()
    }

    pub fn can_stop(&self) -> bool {
        self.status().status.can_stop()
    }

    /// PID of the live server process.
    pub fn pid(&self) -> Option<u32> {
        self.shared.pid()
    }

    /// Online player names, sorted.
    pub fn players(&self) -> Vec<String> {
        self.shared.roster().players()
    }

    pub fn joined_at(&self, player: &str) -> Option<DateTime<Utc>> {
        self.shared.roster().joined_at(player)
    }

    pub fn last_part_at(&self) -> Option<DateTime<Utc>> {
        self.shared.roster().last_part_at()
    }

    pub fn can_read_world(&self) -> bool {
        self.shared.lock.can_read()
    }

    pub fn can_write_world(&self) -> bool {
        self.shared.lock.can_write()
    }

    // === World lock ===

    async fn read_permit(&self) -> SupervisorResult<ReadPermit> {
        let acquire = self.shared.lock.acquire_read();
        match self.shared.settings.lock_timeout() {
            Some(limit) => timeout(limit, acquire)
                .await
                .map_err(|_| SupervisorError::Timeout("world read access".to_string())),
            None => Ok(acquire.await),
        }
    }

    async fn write_permit(&self) -> SupervisorResult<WritePermit> {
        let acquire = self.shared.lock.acquire_write();
        match self.shared.settings.lock_timeout() {
            Some(limit) => timeout(limit, acquire)
                .await
                .map_err(|_| SupervisorError::Timeout("world write access".to_string())),
            None => Ok(acquire.await),
        }
    }

    fn require_stopped(&self, operation: &'static str) -> SupervisorResult<()> {
        let status = self.status().status;
        if status == ProcessStatus::Stopped {
            Ok(())
        } else {
            Err(SupervisorError::InvalidStateTransition { operation, status })
        }
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("status", &self.status().status)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

/// Create the working directory if needed and accept the EULA.
async fn prepare_working_dir(working_dir: &Path) -> SupervisorResult<()> {
    if !tokio::fs::try_exists(working_dir).await? {
        tokio::fs::create_dir_all(working_dir).await?;
        info!(path = %working_dir.display(), "Created working directory");
    }
    info!("Agreeing to EULA");
    tokio::fs::write(working_dir.join(EULA_FILE), b"eula=true\n").await?;
    Ok(())
}

struct Relays {
    output: JoinHandle<()>,
    input: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Clean up after the child exits.
///
/// Relays are stopped, pending one-shot handlers dropped so their waiters see
/// the exit, and the world write permit released before the status returns
/// to `Stopped`.
async fn watch_exit(shared: Arc<Shared>, mut child: Child, permit: WritePermit, relays: Relays) {
    match child.wait().await {
        Ok(status) => info!(exit_status = %status, "Minecraft server stopped"),
        Err(e) => warn!(error = %e, "Failed to wait for Minecraft server process"),
    }

    let Relays {
        mut output,
        input,
        cancel,
    } = relays;
    let drained = timeout(OUTPUT_DRAIN_TIMEOUT, &mut output).await.is_ok();
    cancel.cancel();
    if !drained {
        debug!("Server output still open after exit, cancelling relay");
        let _ = output.await;
    }
    let _ = input.await;

    shared.stdin.lock().await.take();
    shared.set_pid(None);
    shared.dispatcher.drop_one_shot();
    drop(permit);
    shared.set_status(ProcessStatus::Stopped);
}
