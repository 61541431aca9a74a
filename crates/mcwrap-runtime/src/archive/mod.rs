//! World archive codecs.
//!
//! Two wire formats are supported: gzip-compressed tar and deflated zip.
//! Readers are forward-only: entries are visited in archive order and an
//! entry's content can only be read while it is the current one. Every visit
//! starts again from the first entry. Writers take one file at a time from
//! disk, so memory use is bounded by a single entry.
//!
//! # Structure
//!
//! - [`ArchiveFormat`] - format detection and metadata
//! - [`ArchiveReader`] / [`open_reader`] - visiting entries of an upload
//! - [`ArchiveWriter`] / [`new_writer`] - building an export

mod tar_codec;
mod zip_codec;

use std::fmt;
use std::io::{self, Read, Seek, Write};
use std::path::Path;
use std::str::FromStr;

use mcwrap_core::{SupervisorError, SupervisorResult};

pub use tar_codec::{TarGzReader, TarGzWriter};
pub use zip_codec::{ZipReader, ZipWriter};

/// Leading bytes of a zip local file header.
const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Leading bytes of a deflate-compressed gzip member.
const GZIP_SIGNATURE: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Deflated zip.
    Zip,
    /// Gzip-compressed tar.
    TarGz,
}

impl ArchiveFormat {
    /// Classify an archive by its first bytes.
    pub fn sniff(prefix: &[u8]) -> SupervisorResult<Self> {
        if prefix.starts_with(&ZIP_SIGNATURE) {
            Ok(Self::Zip)
        } else if prefix.starts_with(&GZIP_SIGNATURE) {
            Ok(Self::TarGz)
        } else {
            Err(SupervisorError::UnrecognizedArchiveFormat)
        }
    }

    /// Read the signature from `source` and rewind it.
    ///
    /// An empty source means no archive was supplied at all.
    pub fn detect<R: Read + Seek>(source: &mut R) -> SupervisorResult<Self> {
        let mut prefix = [0u8; 4];
        let mut filled = 0;
        while filled < prefix.len() {
            let n = source.read(&mut prefix[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        source.rewind()?;

        if filled == 0 {
            return Err(SupervisorError::missing("archive"));
        }
        Self::sniff(&prefix[..filled])
    }

    /// MIME type for responses carrying this format.
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Zip => "application/zip",
            Self::TarGz => "application/x-gzip",
        }
    }

    /// File extension, without the leading dot.
    pub const fn file_extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zip => f.write_str("zip"),
            Self::TarGz => f.write_str("tar"),
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = SupervisorError;

    /// Parse the `format` parameter of an export request.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zip" => Ok(Self::Zip),
            "tar" | "tar.gz" | "tgz" => Ok(Self::TarGz),
            _ => Err(SupervisorError::UnrecognizedArchiveFormat),
        }
    }
}

/// An entry as seen while visiting an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntryInfo {
    /// Path inside the archive, `/`-separated.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// What a visitor wants after seeing an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Stop,
}

/// Callback invoked for each entry with a reader over its content.
pub type EntryVisitor<'a> =
    dyn FnMut(&ArchiveEntryInfo, &mut dyn Read) -> SupervisorResult<Visit> + 'a;

/// Forward-only archive reader.
///
/// Only regular files and directories are reported; links and special files
/// are skipped.
pub trait ArchiveReader: Send {
    /// Format of the underlying archive.
    fn format(&self) -> ArchiveFormat;

    /// Visit entries from the first one until the end or until the visitor
    /// returns [`Visit::Stop`].
    fn visit_entries(&mut self, visitor: &mut EntryVisitor<'_>) -> SupervisorResult<()>;

    /// Directory containing the first file named `file_name`.
    ///
    /// Returns `Some("")` when the file sits at the archive root.
    fn find(&mut self, file_name: &str) -> SupervisorResult<Option<String>> {
        let mut found = None;
        self.visit_entries(&mut |entry, _| {
            if entry.is_dir {
                return Ok(Visit::Continue);
            }
            let parts = normalized_components(&entry.path);
            if let Some((base, dir)) = parts.split_last()
                && *base == file_name
            {
                found = Some(dir.join("/"));
                return Ok(Visit::Stop);
            }
            Ok(Visit::Continue)
        })?;
        Ok(found)
    }
}

/// Archive writer that takes files from disk one at a time.
pub trait ArchiveWriter: Send {
    /// Format being written.
    fn format(&self) -> ArchiveFormat;

    /// Add the file or directory at `source` under `name`.
    ///
    /// Directories are added without their contents.
    fn add_path(&mut self, source: &Path, name: &str) -> SupervisorResult<()>;

    /// Write trailing metadata and flush the sink.
    fn finish(self: Box<Self>) -> SupervisorResult<()>;
}

/// Detect the format of `source` and open the matching reader.
pub fn open_reader<R>(mut source: R) -> SupervisorResult<Box<dyn ArchiveReader>>
where
    R: Read + Seek + Send + 'static,
{
    match ArchiveFormat::detect(&mut source)? {
        ArchiveFormat::Zip => Ok(Box::new(ZipReader::new(source)?)),
        ArchiveFormat::TarGz => Ok(Box::new(TarGzReader::new(source))),
    }
}

/// Create a writer for `format` over `sink`.
pub fn new_writer<W>(format: ArchiveFormat, sink: W) -> Box<dyn ArchiveWriter>
where
    W: Write + Seek + Send + 'static,
{
    match format {
        ArchiveFormat::Zip => Box::new(ZipWriter::new(sink)),
        ArchiveFormat::TarGz => Box::new(TarGzWriter::new(sink)),
    }
}

/// Split an archive path into its meaningful components.
///
/// Empty and `.` components are dropped; `..` is kept so callers can detect
/// escapes.
pub(crate) fn normalized_components(path: &str) -> Vec<&str> {
    path.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .collect()
}

/// Map codec read failures on malformed input to `Archive`, keep the rest as IO.
pub(crate) fn codec_error(err: io::Error) -> SupervisorError {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            SupervisorError::archive(err)
        }
        _ => SupervisorError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn sniff_recognizes_zip_signature() {
        let format = ArchiveFormat::sniff(&[0x50, 0x4b, 0x03, 0x04, 0x14]).unwrap();
        assert_eq!(format, ArchiveFormat::Zip);
    }

    #[test]
    fn sniff_recognizes_gzip_signature() {
        let format = ArchiveFormat::sniff(&[0x1f, 0x8b, 0x08, 0x00]).unwrap();
        assert_eq!(format, ArchiveFormat::TarGz);
    }

    #[test]
    fn sniff_rejects_other_prefixes() {
        assert!(matches!(
            ArchiveFormat::sniff(&[0, 0, 0, 0]),
            Err(SupervisorError::UnrecognizedArchiveFormat)
        ));
        // gzip with a non-deflate method byte
        assert!(matches!(
            ArchiveFormat::sniff(&[0x1f, 0x8b, 0x07, 0x00]),
            Err(SupervisorError::UnrecognizedArchiveFormat)
        ));
    }

    #[test]
    fn detect_rewinds_source() {
        let mut source = Cursor::new(vec![0x1f, 0x8b, 0x08, 0x00, 0xaa]);
        assert_eq!(ArchiveFormat::detect(&mut source).unwrap(), ArchiveFormat::TarGz);
        assert_eq!(source.position(), 0);
    }

    #[test]
    fn detect_reports_missing_payload() {
        let mut source = Cursor::new(Vec::new());
        assert!(matches!(
            ArchiveFormat::detect(&mut source),
            Err(SupervisorError::MissingRequiredField(field)) if field == "archive"
        ));
    }

    #[test]
    fn format_parses_request_parameter() {
        assert_eq!("zip".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Zip);
        assert_eq!("tar".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::TarGz);
        assert!("rar".parse::<ArchiveFormat>().is_err());
        assert_eq!(ArchiveFormat::TarGz.file_extension(), "tar.gz");
        assert_eq!(ArchiveFormat::Zip.mime_type(), "application/zip");
    }

    #[test]
    fn normalized_components_drop_noise() {
        assert_eq!(
            normalized_components("./minecraft_world//region/"),
            vec!["minecraft_world", "region"]
        );
        assert_eq!(normalized_components("../../etc/passwd"), vec!["..", "..", "etc", "passwd"]);
    }
}
