//! Subcommands.

use std::path::PathBuf;

use clap::Subcommand;
use mcwrap_runtime::ArchiveFormat;

/// Default top-level directory name inside exported archives.
pub const DEFAULT_BASE_NAME: &str = "minecraft_world";

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the server in the foreground, relaying the console (default)
    Run,

    /// Write the world into an archive; the server must not be running
    Export {
        /// Archive format: zip or tar
        #[arg(short, long, default_value = "tar")]
        format: ArchiveFormat,

        /// Output file; defaults to <base-name>.<extension>
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Top-level directory name inside the archive
        #[arg(long, default_value = DEFAULT_BASE_NAME)]
        base_name: String,
    },

    /// Replace the world with the contents of an archive
    Import {
        /// Zip or gzip-compressed tar containing a level.dat
        archive: PathBuf,
    },
}

/// Output path for an export when none was given.
pub fn default_output(format: ArchiveFormat, base_name: &str) -> PathBuf {
    PathBuf::from(format!("{base_name}.{}", format.file_extension()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Cli;
    use clap::Parser;

    #[test]
    fn test_export_defaults() {
        let cli = Cli::parse_from(["mcwrap", "export"]);
        let Some(Commands::Export {
            format,
            output,
            base_name,
        }) = cli.command
        else {
            panic!("expected export command");
        };
        assert_eq!(format, ArchiveFormat::TarGz);
        assert_eq!(output, None);
        assert_eq!(default_output(format, &base_name), PathBuf::from("minecraft_world.tar.gz"));
    }

    #[test]
    fn test_import_takes_archive_and_global_flags() {
        let cli = Cli::parse_from(["mcwrap", "import", "backup.zip", "--world-name", "survival"]);
        assert_eq!(
            cli.command,
            Some(Commands::Import {
                archive: PathBuf::from("backup.zip")
            })
        );
        assert_eq!(cli.server.world_name, "survival");
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["mcwrap", "export", "--format", "rar"]).is_err());
    }
}
