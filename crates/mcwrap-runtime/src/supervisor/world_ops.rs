//! World export and import through the supervisor.
//!
//! Both directions require a stopped server. The archive work itself is
//! synchronous file IO and runs on the blocking pool with the permit moved
//! along, so the lock is held until the last byte is written.

use std::io::{Read, Seek, Write};

use mcwrap_core::{SupervisorError, SupervisorResult};
use tracing::info;

use super::ProcessSupervisor;
use crate::archive::{ArchiveFormat, ArchiveReader, new_writer, open_reader};
use crate::world::{ExtractSummary, WorldExport, WorldFiles, WorldLayout, import_into};

/// File whose directory marks the world root inside an uploaded archive.
const LEVEL_FILE: &str = "level.dat";

async fn run_blocking<T, F>(work: F) -> SupervisorResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SupervisorResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SupervisorError::Io(std::io::Error::other(e)))?
}

impl ProcessSupervisor {
    /// Walk the world directory while holding a read permit.
    ///
    /// The returned iterator owns the permit; dropping it releases access.
    pub async fn export_world(&self) -> SupervisorResult<WorldExport> {
        self.require_stopped("export world")?;
        let permit = self.read_permit().await?;
        Ok(WorldExport::new(
            WorldFiles::new(self.shared.settings.world_dir()),
            permit,
        ))
    }

    /// Write the world into a new archive over `sink`.
    ///
    /// Entries are named `<base_name>/<path relative to the world>`. Returns
    /// the number of entries written.
    pub async fn export_world_archive<W>(
        &self,
        format: ArchiveFormat,
        sink: W,
        base_name: &str,
    ) -> SupervisorResult<usize>
    where
        W: Write + Seek + Send + 'static,
    {
        let export = self.export_world().await?;
        let base_name = base_name.to_string();

        let written = run_blocking(move || {
            let mut writer = new_writer(format, sink);
            let written = export.write_to(writer.as_mut(), &base_name)?;
            writer.finish()?;
            Ok(written)
        })
        .await?;

        info!(entries = written, %format, "World exported");
        Ok(written)
    }

    /// Replace the world with the entries of `reader` found below `strip_prefix`.
    ///
    /// Entries that would land outside the world are rejected and the live
    /// world is left untouched. The previous world is kept as a backup.
    pub async fn import_world(
        &self,
        mut reader: Box<dyn ArchiveReader>,
        strip_prefix: &str,
    ) -> SupervisorResult<ExtractSummary> {
        self.require_stopped("import world")?;
        let permit = self.write_permit().await?;
        let layout = WorldLayout::from_settings(&self.shared.settings);
        let strip_prefix = strip_prefix.to_string();

        run_blocking(move || {
            let _permit = permit;
            import_into(reader.as_mut(), &strip_prefix, &layout)
        })
        .await
    }

    /// Import an uploaded archive of either supported format.
    ///
    /// The world root is the directory holding `level.dat`, wherever it sits
    /// in the archive.
    pub async fn import_world_archive<R>(&self, source: R) -> SupervisorResult<ExtractSummary>
    where
        R: Read + Seek + Send + 'static,
    {
        self.require_stopped("import world")?;
        let permit = self.write_permit().await?;
        let layout = WorldLayout::from_settings(&self.shared.settings);

        run_blocking(move || {
            let _permit = permit;
            let mut reader = open_reader(source)?;
            let root = reader
                .find(LEVEL_FILE)?
                .ok_or_else(|| SupervisorError::missing(LEVEL_FILE))?;
            info!(format = %reader.format(), root = %root, "Found level.dat in archive");
            import_into(reader.as_mut(), &root, &layout)
        })
        .await
    }
}
