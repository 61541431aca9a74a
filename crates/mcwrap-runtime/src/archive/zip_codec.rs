//! Zip reader and writer.

use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use ::zip::CompressionMethod;
use ::zip::result::ZipError;
use ::zip::write::SimpleFileOptions;
use mcwrap_core::{SupervisorError, SupervisorResult};
use tracing::debug;

use super::{
    ArchiveEntryInfo, ArchiveFormat, ArchiveReader, ArchiveWriter, EntryVisitor, Visit, codec_error,
};

fn zip_error(err: ZipError) -> SupervisorError {
    match err {
        ZipError::Io(io_err) => codec_error(io_err),
        other => SupervisorError::archive(other),
    }
}

/// Reader over a zip archive.
pub struct ZipReader<R> {
    archive: ::zip::ZipArchive<R>,
}

impl<R: Read + Seek + Send> ZipReader<R> {
    /// Open the archive, reading its central directory.
    pub fn new(source: R) -> SupervisorResult<Self> {
        let archive = ::zip::ZipArchive::new(source).map_err(zip_error)?;
        Ok(Self { archive })
    }
}

impl<R: Read + Seek + Send> ArchiveReader for ZipReader<R> {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn visit_entries(&mut self, visitor: &mut EntryVisitor<'_>) -> SupervisorResult<()> {
        for index in 0..self.archive.len() {
            let mut file = self.archive.by_index(index).map_err(zip_error)?;
            let info = ArchiveEntryInfo {
                path: file.name().to_string(),
                is_dir: file.is_dir(),
            };
            if visitor(&info, &mut file)? == Visit::Stop {
                break;
            }
        }
        Ok(())
    }
}

/// Writer producing a deflated zip archive.
pub struct ZipWriter<W: Write + Seek> {
    zip: ::zip::ZipWriter<W>,
    options: SimpleFileOptions,
}

impl<W: Write + Seek + Send> ZipWriter<W> {
    /// Start a new archive over `sink`.
    pub fn new(sink: W) -> Self {
        Self {
            zip: ::zip::ZipWriter::new(sink),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }
}

impl<W: Write + Seek + Send> ArchiveWriter for ZipWriter<W> {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn add_path(&mut self, source: &Path, name: &str) -> SupervisorResult<()> {
        let metadata = fs::symlink_metadata(source)?;
        if metadata.is_dir() {
            self.zip
                .add_directory(name, self.options)
                .map_err(zip_error)?;
        } else if metadata.is_file() {
            self.zip.start_file(name, self.options).map_err(zip_error)?;
            let mut file = File::open(source)?;
            io::copy(&mut file, &mut self.zip)?;
        } else {
            debug!(path = %source.display(), "Skipping non-regular file in zip export");
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> SupervisorResult<()> {
        let mut sink = self.zip.finish().map_err(zip_error)?;
        sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn written_archive_reads_back() {
        let temp = TempDir::new().unwrap();
        let region = temp.path().join("region");
        fs::create_dir(&region).unwrap();
        let level = temp.path().join("level.dat");
        fs::write(&level, b"seed=42").unwrap();
        let archive_path = temp.path().join("export.zip");

        let sink = File::create(&archive_path).unwrap();
        let mut writer: Box<dyn ArchiveWriter> = Box::new(ZipWriter::new(sink));
        assert_eq!(writer.format(), ArchiveFormat::Zip);
        writer.add_path(&region, "world/region").unwrap();
        writer.add_path(&level, "world/level.dat").unwrap();
        writer.finish().unwrap();

        let mut reader = ZipReader::new(File::open(&archive_path).unwrap()).unwrap();
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
                ("world/region".to_string(), true, String::new()),
                ("world/level.dat".to_string(), false, "seed=42".to_string()),
            ]
        );
        assert_eq!(reader.find("level.dat").unwrap(), Some("world".to_string()));
    }

    #[test]
    fn truncated_archive_is_rejected() {
        let bytes = vec![0x50, 0x4b, 0x03, 0x04, 0x00, 0x00];
        assert!(ZipReader::new(Cursor::new(bytes)).is_err());
    }
}
