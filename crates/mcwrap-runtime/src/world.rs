//! World directory walking, archive extraction and import publishing.
//!
//! Imports never touch the live world until the upload has been fully
//! extracted. The upload lands in a staging directory next to it, which then
//! replaces the live world while the previous one is kept as a backup.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use mcwrap_core::{ServerSettings, SupervisorError, SupervisorResult};
use tracing::{debug, info, warn};

use crate::archive::{ArchiveReader, ArchiveWriter, Visit, normalized_components};
use crate::world_lock::ReadPermit;

/// A file or directory inside the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldFile {
    /// Location on disk.
    pub path: PathBuf,
    /// Location relative to the world root.
    pub relative: PathBuf,
    pub is_dir: bool,
}

impl WorldFile {
    /// Name of this file inside an archive rooted at `base_name`.
    pub fn archive_name(&self, base_name: &str) -> String {
        archive_name(base_name, &self.relative)
    }
}

/// Join `base_name` and a relative path with `/`, whatever the host separator.
pub fn archive_name(base_name: &str, relative: &Path) -> String {
    let mut name = base_name.trim_end_matches('/').to_string();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            if !name.is_empty() {
                name.push('/');
            }
            name.push_str(&part.to_string_lossy());
        }
    }
    name
}

/// Lazy depth-first walk of a world directory.
///
/// Entries of each directory are visited in name order and a directory is
/// yielded before its contents. The root itself is not yielded, and a root
/// that does not exist yields nothing. Links are reported but not followed.
pub struct WorldFiles {
    root: PathBuf,
    pending: Vec<PathBuf>,
    started: bool,
}

impl WorldFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pending: Vec::new(),
            started: false,
        }
    }

    fn push_children(&mut self, dir: &Path) -> io::Result<()> {
        let mut children = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        children.sort();
        self.pending.extend(children.into_iter().rev());
        Ok(())
    }

    fn visit(&mut self, path: PathBuf) -> SupervisorResult<WorldFile> {
        let is_dir = fs::symlink_metadata(&path)?.is_dir();
        if is_dir {
            self.push_children(&path)?;
        }
        let relative = path
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());
        Ok(WorldFile {
            path,
            relative,
            is_dir,
        })
    }
}

impl Iterator for WorldFiles {
    type Item = SupervisorResult<WorldFile>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            let root = self.root.clone();
            match self.push_children(&root) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(root = %root.display(), "World directory does not exist");
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
        let path = self.pending.pop()?;
        Some(self.visit(path))
    }
}

/// World walk holding a read permit for as long as it is alive.
///
/// The permit is released exactly once, when the export is dropped, whether
/// the walk ran to the end, stopped early or failed.
pub struct WorldExport {
    files: WorldFiles,
    _permit: ReadPermit,
}

impl WorldExport {
    pub(crate) const fn new(files: WorldFiles, permit: ReadPermit) -> Self {
        Self {
            files,
            _permit: permit,
        }
    }

    /// Feed every remaining file into `writer`, naming them under `base_name`.
    ///
    /// Returns the number of entries written. The writer is not finished.
    pub fn write_to(self, writer: &mut dyn ArchiveWriter, base_name: &str) -> SupervisorResult<usize> {
        let mut written = 0;
        for file in self {
            let file = file?;
            writer.add_path(&file.path, &file.archive_name(base_name))?;
            written += 1;
        }
        Ok(written)
    }
}

impl Iterator for WorldExport {
    type Item = SupervisorResult<WorldFile>;

    fn next(&mut self) -> Option<Self::Item> {
        self.files.next()
    }
}

/// Counts from a completed extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
}

/// Where a world lives and where imports are staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldLayout {
    pub live: PathBuf,
    pub staging: PathBuf,
    pub backup: PathBuf,
}

impl WorldLayout {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            live: settings.world_dir(),
            staging: settings.world_new_dir(),
            backup: settings.world_old_dir(),
        }
    }
}

/// Path below `target` for an archive entry, after removing `strip_prefix`.
///
/// `Ok(None)` means the entry is the prefix directory itself.
fn entry_destination(
    entry_path: &str,
    prefix: &[&str],
    target: &Path,
) -> SupervisorResult<Option<PathBuf>> {
    let escape = || SupervisorError::PathEscape(entry_path.to_string());

    if entry_path.starts_with(['/', '\\']) {
        return Err(escape());
    }
    let components = normalized_components(entry_path);
    let Some(rest) = components.strip_prefix(prefix) else {
        return Err(escape());
    };
    if rest.iter().any(|part| *part == ".." || part.contains(':')) {
        return Err(escape());
    }
    if rest.is_empty() {
        return Ok(None);
    }

    let mut destination = target.to_path_buf();
    destination.extend(rest);
    Ok(Some(destination))
}

/// Extract every entry of `reader` found below `strip_prefix` into `target`.
///
/// Any entry outside the prefix, or whose remaining path would leave
/// `target`, aborts the extraction with [`SupervisorError::PathEscape`].
/// Entries already written are left in place for the caller to clean up.
pub fn extract_archive(
    reader: &mut dyn ArchiveReader,
    strip_prefix: &str,
    target: &Path,
) -> SupervisorResult<ExtractSummary> {
    let prefix = normalized_components(strip_prefix);
    let mut summary = ExtractSummary::default();

    reader.visit_entries(&mut |entry, content| {
        let Some(destination) = entry_destination(&entry.path, &prefix, target)? else {
            return Ok(Visit::Continue);
        };

        if entry.is_dir {
            fs::create_dir_all(&destination)?;
            summary.directories += 1;
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&destination)?;
            io::copy(content, &mut file)?;
            summary.files += 1;
        }
        Ok(Visit::Continue)
    })?;

    Ok(summary)
}

/// Replace the live world with the staged one, keeping the old world as backup.
///
/// Any existing backup is discarded first.
pub fn publish_import(layout: &WorldLayout) -> SupervisorResult<()> {
    if layout.backup.exists() {
        debug!(path = %layout.backup.display(), "Removing previous world backup");
        fs::remove_dir_all(&layout.backup)?;
    }
    if layout.live.exists() {
        fs::rename(&layout.live, &layout.backup)?;
    }
    fs::rename(&layout.staging, &layout.live)?;
    Ok(())
}

/// Stage the contents of `reader` and publish them as the live world.
///
/// On any failure the staging directory is removed and the live world is
/// left as it was.
pub fn import_into(
    reader: &mut dyn ArchiveReader,
    strip_prefix: &str,
    layout: &WorldLayout,
) -> SupervisorResult<ExtractSummary> {
    if layout.staging.exists() {
        debug!(path = %layout.staging.display(), "Removing stale staging directory");
        fs::remove_dir_all(&layout.staging)?;
    }
    fs::create_dir_all(&layout.staging)?;

    match extract_archive(reader, strip_prefix, &layout.staging) {
        Ok(summary) => {
            publish_import(layout)?;
            info!(
                files = summary.files,
                directories = summary.directories,
                world = %layout.live.display(),
                "World import published"
            );
            Ok(summary)
        }
        Err(e) => {
            warn!(error = %e, "World import failed, discarding staged files");
            if let Err(cleanup) = fs::remove_dir_all(&layout.staging) {
                warn!(error = %cleanup, "Failed to remove staging directory");
            }
            Err(e)
        }
    }
}
