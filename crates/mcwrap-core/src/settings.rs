//! Supervisor settings.
//!
//! These are consumed once when the supervisor is constructed. The log patterns
//! are plain strings here; they are compiled by the runtime so that this crate
//! stays free of regex.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SupervisorError, SupervisorResult};

/// Log message emitted by the vanilla server once it accepts players.
pub const DEFAULT_READY_PATTERN: &str = r#"^Done \((?P<time>.+)\)! For help, type "help" or "\?"$"#;

/// Log message emitted when a player joins.
pub const DEFAULT_JOIN_PATTERN: &str = r"^(?P<name>\w*) joined the game$";

/// Log message emitted when a player leaves.
pub const DEFAULT_LEAVE_PATTERN: &str = r"^(?P<name>\w*) left the game$";

const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

/// Settings for the supervised server process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerSettings {
    /// Path to the server jar.
    pub server_jar: PathBuf,

    /// Interpreter used to launch the jar.
    pub java_binary: PathBuf,

    /// Flags passed to the interpreter before `-jar`.
    pub java_flags: Vec<String>,

    /// Flags passed to the server after the jar path.
    pub server_flags: Vec<String>,

    /// Directory the server runs in; created on start if missing.
    pub working_dir: PathBuf,

    /// Name of the world directory inside `working_dir`.
    pub world_name: String,

    /// Pattern marking the transition from starting to running.
    pub ready_pattern: String,

    /// Pattern for a player join; must capture `name`.
    pub join_pattern: String,

    /// Pattern for a player leave; must capture `name`.
    pub leave_pattern: String,

    /// Command written to stdin to stop the server.
    pub stop_command: String,

    /// Console line that dumps the roster instead of being forwarded.
    pub console_dump_command: String,

    /// Terminator appended to every command sent to the child.
    pub line_terminator: String,

    /// Upper bound for `send_command_and_await`. `None` or 0 waits indefinitely.
    pub response_timeout_secs: Option<u64>,

    /// Upper bound for acquiring the world lock. `None` or 0 waits indefinitely.
    pub lock_timeout_secs: Option<u64>,
}

impl ServerSettings {
    /// Settings with the defaults for a vanilla server and the given jar.
    pub fn with_defaults(server_jar: impl Into<PathBuf>) -> Self {
        Self {
            server_jar: server_jar.into(),
            ..Self::default()
        }
    }

    /// Root of the live world.
    pub fn world_dir(&self) -> PathBuf {
        self.working_dir.join(&self.world_name)
    }

    /// Directory an import is extracted into before being published.
    pub fn world_new_dir(&self) -> PathBuf {
        self.working_dir.join(format!("{}_new", self.world_name))
    }

    /// Rollback copy kept from the previous import.
    pub fn world_old_dir(&self) -> PathBuf {
        self.working_dir.join(format!("{}_old", self.world_name))
    }

    /// Effective response timeout.
    pub fn response_timeout(&self) -> Option<Duration> {
        nonzero_duration(self.response_timeout_secs)
    }

    /// Effective lock acquisition timeout.
    pub fn lock_timeout(&self) -> Option<Duration> {
        nonzero_duration(self.lock_timeout_secs)
    }

    /// Check for settings that cannot produce a working server.
    pub fn validate(&self) -> SupervisorResult<()> {
        if self.server_jar.as_os_str().is_empty() {
            return Err(SupervisorError::missing("server_jar"));
        }
        if self.world_name.is_empty() {
            return Err(SupervisorError::missing("world_name"));
        }
        Ok(())
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            server_jar: PathBuf::new(),
            java_binary: PathBuf::from("java"),
            java_flags: Vec::new(),
            server_flags: Vec::new(),
            working_dir: PathBuf::from("."),
            world_name: "world".to_string(),
            ready_pattern: DEFAULT_READY_PATTERN.to_string(),
            join_pattern: DEFAULT_JOIN_PATTERN.to_string(),
            leave_pattern: DEFAULT_LEAVE_PATTERN.to_string(),
            stop_command: "stop".to_string(),
            console_dump_command: "ll".to_string(),
            line_terminator: "\n".to_string(),
            response_timeout_secs: Some(DEFAULT_RESPONSE_TIMEOUT_SECS),
            lock_timeout_secs: Some(DEFAULT_LOCK_TIMEOUT_SECS),
        }
    }
}

fn nonzero_duration(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|&secs| secs > 0).map(Duration::from_secs)
}

/// Split a whitespace-separated flag string, as found in config files.
pub fn split_flags(flags: &str) -> Vec<String> {
    flags.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_vanilla_server() {
        let settings = ServerSettings::with_defaults("server.jar");
        assert_eq!(settings.java_binary, PathBuf::from("java"));
        assert_eq!(settings.stop_command, "stop");
        assert_eq!(settings.world_dir(), PathBuf::from("./world"));
        assert_eq!(settings.world_new_dir(), PathBuf::from("./world_new"));
        assert_eq!(settings.world_old_dir(), PathBuf::from("./world_old"));
        assert_eq!(settings.response_timeout(), Some(Duration::from_secs(30)));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn empty_jar_is_rejected() {
        let settings = ServerSettings::default();
        assert!(matches!(
            settings.validate(),
            Err(SupervisorError::MissingRequiredField(field)) if field == "server_jar"
        ));
    }

    #[test]
    fn split_flags_ignores_extra_whitespace() {
        assert_eq!(split_flags("  -Xmx2G   -Xms1G "), vec!["-Xmx2G", "-Xms1G"]);
        assert!(split_flags("").is_empty());
    }

    #[test]
    fn partial_settings_deserialize_with_defaults() {
        let settings: ServerSettings =
            serde_json::from_str(r#"{"server_jar": "/srv/mc/server.jar", "world_name": "survival"}"#)
                .unwrap();
        assert_eq!(settings.server_jar, PathBuf::from("/srv/mc/server.jar"));
        assert_eq!(settings.world_name, "survival");
        assert_eq!(settings.join_pattern, DEFAULT_JOIN_PATTERN);
    }

    #[test]
    fn zero_timeouts_mean_no_limit() {
        let settings: ServerSettings = serde_json::from_str(
            r#"{"server_jar": "server.jar", "response_timeout_secs": 0, "lock_timeout_secs": 0}"#,
        )
        .unwrap();
        assert_eq!(settings.response_timeout_secs, Some(0));
        assert_eq!(settings.response_timeout(), None);
        assert_eq!(settings.lock_timeout(), None);

        let unbounded = ServerSettings {
            lock_timeout_secs: None,
            ..ServerSettings::with_defaults("server.jar")
        };
        assert_eq!(unbounded.lock_timeout(), None);
        assert_eq!(unbounded.response_timeout(), Some(Duration::from_secs(30)));
    }
}
