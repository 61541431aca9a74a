//! Gzip-compressed tar reader and writer.

use std::fs;
use std::io::{Read, Seek, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use mcwrap_core::SupervisorResult;
use tracing::debug;

use super::{
    ArchiveEntryInfo, ArchiveFormat, ArchiveReader, ArchiveWriter, EntryVisitor, Visit, codec_error,
};

/// Reader over a `.tar.gz` stream.
///
/// Each visit rewinds the source and decompresses from the start, so nothing
/// beyond the current entry's header and block is held in memory.
pub struct TarGzReader<R> {
    source: R,
}

impl<R: Read + Seek + Send> TarGzReader<R> {
    /// Wrap a seekable source positioned anywhere.
    pub const fn new(source: R) -> Self {
        Self { source }
    }
}

impl<R: Read + Seek + Send> ArchiveReader for TarGzReader<R> {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::TarGz
    }

    fn visit_entries(&mut self, visitor: &mut EntryVisitor<'_>) -> SupervisorResult<()> {
        self.source.rewind()?;
        let mut archive = tar::Archive::new(GzDecoder::new(&mut self.source));

        for entry in archive.entries().map_err(codec_error)? {
            let mut entry = entry.map_err(codec_error)?;
            let kind = entry.header().entry_type();
            if !kind.is_dir() && !kind.is_file() {
                debug!(kind = ?kind, "Skipping non-regular tar entry");
                continue;
            }

            let info = ArchiveEntryInfo {
                path: entry.path().map_err(codec_error)?.to_string_lossy().into_owned(),
                is_dir: kind.is_dir(),
            };
            if visitor(&info, &mut entry)? == Visit::Stop {
                break;
            }
        }
        Ok(())
    }
}

/// Writer producing a `.tar.gz` stream.
pub struct TarGzWriter<W: Write> {
    builder: tar::Builder<GzEncoder<W>>,
}

impl<W: Write + Send> TarGzWriter<W> {
    /// Start a new archive over `sink`.
    pub fn new(sink: W) -> Self {
        let mut builder = tar::Builder::new(GzEncoder::new(sink, Compression::default()));
        // Store links as links rather than archiving whatever they point at
        builder.follow_symlinks(false);
        Self { builder }
    }
}

impl<W: Write + Send> ArchiveWriter for TarGzWriter<W> {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::TarGz
    }

    fn add_path(&mut self, source: &Path, name: &str) -> SupervisorResult<()> {
        if fs::symlink_metadata(source)?.is_dir() {
            self.builder.append_dir(name, source)?;
        } else {
            self.builder.append_path_with_name(source, name)?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> SupervisorResult<()> {
        let encoder = self.builder.into_inner()?;
        let mut sink = encoder.finish()?;
        sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn build_archive(dir: &Path) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        builder.append_dir("pack", dir).unwrap();
        let file = dir.join("level.dat");
        fs::write(&file, b"level").unwrap();
        builder.append_path_with_name(&file, "pack/level.dat").unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn visits_entries_in_order_and_reads_content() {
        let temp = TempDir::new().unwrap();
        let bytes = build_archive(temp.path());
        let mut reader = TarGzReader::new(Cursor::new(bytes));

        let mut seen = Vec::new();
        reader
            .visit_entries(&mut |entry, content| {
                let mut body = String::new();
                content.read_to_string(&mut body)?;
                seen.push((entry.path.trim_end_matches('/').to_string(), entry.is_dir, body));
                Ok(Visit::Continue)
            })
            .unwrap();

        assert_eq!(
            seen,
            vec![
                ("pack".to_string(), true, String::new()),
                ("pack/level.dat".to_string(), false, "level".to_string()),
            ]
        );
    }

    #[test]
    fn every_visit_restarts_from_first_entry() {
        let temp = TempDir::new().unwrap();
        let bytes = build_archive(temp.path());
        let mut reader = TarGzReader::new(Cursor::new(bytes));

        assert_eq!(reader.find("level.dat").unwrap(), Some("pack".to_string()));
        // A second lookup must not start where the first one stopped
        assert_eq!(reader.find("level.dat").unwrap(), Some("pack".to_string()));
        assert_eq!(reader.find("session.lock").unwrap(), None);
    }

    #[test]
    fn corrupt_deflate_stream_is_an_error() {
        // Valid gzip header followed by a deflate block with the reserved type
        let bytes = vec![0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
        let mut reader = TarGzReader::new(Cursor::new(bytes));
        let result = reader.visit_entries(&mut |_, _| Ok(Visit::Continue));
        assert!(result.is_err());
    }
}
