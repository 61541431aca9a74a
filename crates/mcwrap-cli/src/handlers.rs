//! Command handlers.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use mcwrap_core::{ServerSettings, StdinConsoleInput};
use mcwrap_runtime::{ArchiveFormat, ProcessSupervisor, ShutdownSignal};
use tracing::info;

/// Run the server until it exits, relaying the console and host signals.
pub async fn run(settings: ServerSettings) -> Result<()> {
    let console = StdinConsoleInput::new().context("failed to start console reader")?;
    let supervisor = ProcessSupervisor::new(settings)?.with_console_input(console);
    supervisor.start().await.context("failed to start server")?;

    loop {
        tokio::select! {
            snapshot = supervisor.wait() => {
                info!(at = %snapshot.changed_at, "Minecraft server exited");
                break;
            }
            signal = shutdown_signal() => {
                let signal = signal?;
                info!(%signal, "Received signal");
                supervisor.relay_signal(signal).await?;
            }
        }
    }
    Ok(())
}

/// Export the world of a stopped server.
pub async fn export(
    settings: ServerSettings,
    format: ArchiveFormat,
    output: &Path,
    base_name: &str,
) -> Result<()> {
    let supervisor = ProcessSupervisor::new(settings)?;
    let sink = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;

    let written = supervisor.export_world_archive(format, sink, base_name).await?;
    info!(entries = written, output = %output.display(), "Export complete");
    Ok(())
}

/// Import an archive as the world of a stopped server.
pub async fn import(settings: ServerSettings, archive: &Path) -> Result<()> {
    let supervisor = ProcessSupervisor::new(settings)?;
    let source =
        File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;

    let summary = supervisor.import_world_archive(source).await?;
    info!(
        files = summary.files,
        directories = summary.directories,
        "Import complete"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() -> Result<ShutdownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok(ShutdownSignal::Interrupt)
        }
        _ = terminate.recv() => Ok(ShutdownSignal::Terminate),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::Interrupt)
}
