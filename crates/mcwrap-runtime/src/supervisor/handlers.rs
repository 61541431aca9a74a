//! Built-in log handlers: player roster upkeep and readiness detection.

use std::sync::PoisonError;

use chrono::Utc;
use mcwrap_core::{ProcessStatus, SupervisorError, SupervisorResult};
use regex::Regex;
use tracing::{debug, info};

use super::state::{Shared, StatusCell, transition};
use crate::events::{LogHandler, handler};
use crate::relay::SharedRoster;

/// Compile a configured log pattern.
pub(crate) fn compile_pattern(pattern: &str) -> SupervisorResult<Regex> {
    Regex::new(pattern).map_err(|e| SupervisorError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Compile a pattern that must expose a `name` group.
fn compile_player_pattern(pattern: &str) -> SupervisorResult<Regex> {
    let compiled = compile_pattern(pattern)?;
    if !compiled.capture_names().flatten().any(|name| name == "name") {
        return Err(SupervisorError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern must capture a group named 'name'".to_string(),
        });
    }
    Ok(compiled)
}

fn player_joined(roster: SharedRoster) -> LogHandler {
    handler(move |m| {
        if let Some(name) = m.name("name") {
            roster
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .join(name, Utc::now());
            debug!(player = %name, "Player joined");
        }
        async { false }
    })
}

fn player_left(roster: SharedRoster) -> LogHandler {
    handler(move |m| {
        if let Some(name) = m.name("name") {
            roster
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .leave(name, Utc::now());
        }
        async { false }
    })
}

fn server_ready(status: StatusCell) -> LogHandler {
    handler(move |m| {
        if transition(&status, &[ProcessStatus::Starting], ProcessStatus::Running).is_ok() {
            info!(startup = m.name("time").unwrap_or_default(), "Minecraft server is ready");
        }
        async { false }
    })
}

/// Register the permanent handlers, in order: join, leave, ready.
pub(crate) fn register_builtin(shared: &Shared) -> SupervisorResult<()> {
    let settings = &shared.settings;
    let join = compile_player_pattern(&settings.join_pattern)?;
    let leave = compile_player_pattern(&settings.leave_pattern)?;
    let ready = compile_pattern(&settings.ready_pattern)?;

    let dispatcher = &shared.dispatcher;
    dispatcher.register(join, player_joined(shared.roster.clone()));
    dispatcher.register(leave, player_left(shared.roster.clone()));
    dispatcher.register(ready, server_ready(shared.status.clone()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcwrap_core::ServerSettings;

    fn shared() -> Shared {
        let shared = Shared::new(ServerSettings::with_defaults("server.jar"));
        register_builtin(&shared).unwrap();
        shared
    }

    #[tokio::test]
    async fn join_and_leave_maintain_roster() {
        let shared = shared();
        assert!(!shared.dispatcher.dispatch("Steve joined the game").await);
        assert!(!shared.dispatcher.dispatch("Alex joined the game").await);
        assert_eq!(shared.roster().players(), vec!["Alex", "Steve"]);
        assert!(shared.roster().joined_at("Steve").is_some());

        shared.dispatcher.dispatch("Steve left the game").await;
        assert_eq!(shared.roster().players(), vec!["Alex"]);
        assert!(shared.roster().last_part_at().is_some());
    }

    #[tokio::test]
    async fn unknown_leave_is_ignored() {
        let shared = shared();
        shared.dispatcher.dispatch("Herobrine left the game").await;
        assert!(shared.roster().is_empty());
        assert!(shared.roster().last_part_at().is_none());
    }

    #[tokio::test]
    async fn ready_line_moves_starting_to_running() {
        let shared = shared();
        let ready = r#"Done (4.512s)! For help, type "help" or "?""#;

        // Ignored unless a start is in progress
        shared.dispatcher.dispatch(ready).await;
        assert_eq!(shared.current().status, ProcessStatus::Stopped);

        shared.set_status(ProcessStatus::Starting);
        shared.dispatcher.dispatch(ready).await;
        assert_eq!(shared.current().status, ProcessStatus::Running);
    }

    #[test]
    fn player_patterns_need_a_name_group() {
        assert!(compile_player_pattern(r"^(?P<name>\w*) joined").is_ok());
        assert!(matches!(
            compile_player_pattern(r"^(\w*) joined"),
            Err(SupervisorError::InvalidPattern { .. })
        ));
        assert!(matches!(compile_pattern("(unclosed"), Err(SupervisorError::InvalidPattern { .. })));
    }
}
