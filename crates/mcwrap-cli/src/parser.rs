//! Main CLI parser and server settings arguments.
//!
//! Every setting can come from a flag or an `MCWRAP_*` environment variable,
//! which in turn may be loaded from a `.env` file.

use std::path::PathBuf;

use clap::{Args, Parser};
use mcwrap_core::{
    DEFAULT_JOIN_PATTERN, DEFAULT_LEAVE_PATTERN, DEFAULT_READY_PATTERN, ServerSettings, split_flags,
};

use crate::commands::Commands;

/// Supervise a Minecraft server and manage its world.
#[derive(Parser, Debug)]
#[command(name = "mcwrap")]
#[command(about = "Run a Minecraft server and export or import its world")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where and how the server runs.
#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Path to the server jar
    #[arg(long, env = "MCWRAP_SERVER_JAR", global = true, default_value = "minecraft_server.jar")]
    pub server_jar: PathBuf,

    /// Java executable used to run the jar
    #[arg(long, env = "MCWRAP_JAVA", global = true, default_value = "java")]
    pub java: PathBuf,

    /// Flags passed to java before -jar, whitespace separated
    #[arg(long, env = "MCWRAP_JAVA_FLAGS", global = true, default_value = "", allow_hyphen_values = true)]
    pub java_flags: String,

    /// Flags passed to the server after the jar, whitespace separated
    #[arg(long, env = "MCWRAP_SERVER_FLAGS", global = true, default_value = "", allow_hyphen_values = true)]
    pub server_flags: String,

    /// Directory the server runs in
    #[arg(long, env = "MCWRAP_WORKING_DIR", global = true, default_value = ".")]
    pub working_dir: PathBuf,

    /// World directory name inside the working directory
    #[arg(long, env = "MCWRAP_WORLD_NAME", global = true, default_value = "world")]
    pub world_name: String,

    /// Log message marking the server as ready
    #[arg(long, env = "MCWRAP_READY_PATTERN", global = true, default_value = DEFAULT_READY_PATTERN)]
    pub ready_pattern: String,

    /// Log message for a player joining; must capture `name`
    #[arg(long, env = "MCWRAP_JOIN_PATTERN", global = true, default_value = DEFAULT_JOIN_PATTERN)]
    pub join_pattern: String,

    /// Log message for a player leaving; must capture `name`
    #[arg(long, env = "MCWRAP_LEAVE_PATTERN", global = true, default_value = DEFAULT_LEAVE_PATTERN)]
    pub leave_pattern: String,

    /// Command that shuts the server down
    #[arg(long, env = "MCWRAP_STOP_COMMAND", global = true, default_value = "stop")]
    pub stop_command: String,

    /// Console line that prints the player roster instead of being forwarded
    #[arg(long, env = "MCWRAP_DUMP_COMMAND", global = true, default_value = "ll")]
    pub dump_command: String,

    /// Seconds to wait for a command response (0 waits forever)
    #[arg(long, env = "MCWRAP_RESPONSE_TIMEOUT", global = true, default_value_t = 30)]
    pub response_timeout: u64,

    /// Seconds to wait for world access (0 waits forever)
    #[arg(long, env = "MCWRAP_LOCK_TIMEOUT", global = true, default_value_t = 30)]
    pub lock_timeout: u64,
}

const fn nonzero_secs(secs: u64) -> Option<u64> {
    if secs == 0 { None } else { Some(secs) }
}

impl ServerArgs {
    pub fn into_settings(self) -> ServerSettings {
        ServerSettings {
            server_jar: self.server_jar,
            java_binary: self.java,
            java_flags: split_flags(&self.java_flags),
            server_flags: split_flags(&self.server_flags),
            working_dir: self.working_dir,
            world_name: self.world_name,
            ready_pattern: self.ready_pattern,
            join_pattern: self.join_pattern,
            leave_pattern: self.leave_pattern,
            stop_command: self.stop_command,
            console_dump_command: self.dump_command,
            response_timeout_secs: nonzero_secs(self.response_timeout),
            lock_timeout_secs: nonzero_secs(self.lock_timeout),
            ..ServerSettings::default()
        }
    }
}
