//! Online player roster, maintained from join/leave log lines.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Players currently online, keyed by name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerRoster {
    players: HashMap<String, DateTime<Utc>>,
    last_part: Option<DateTime<Utc>>,
}

impl PlayerRoster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `name` joined at `at`.
    ///
    /// A repeated join for a player already online refreshes the timestamp.
    pub fn join(&mut self, name: impl Into<String>, at: DateTime<Utc>) {
        self.players.insert(name.into(), at);
    }

    /// Record that `name` left at `at`.
    ///
    /// Returns `false` and changes nothing when `name` was never recorded as
    /// joined (e.g. the wrapper started after the player connected).
    pub fn leave(&mut self, name: &str, at: DateTime<Utc>) -> bool {
        if self.players.remove(name).is_none() {
            debug!(player = %name, "Ignoring leave for player not in roster");
            return false;
        }
        self.last_part = Some(at);
        true
    }

    /// Names of online players, sorted.
    pub fn players(&self) -> Vec<String> {
        let mut names: Vec<String> = self.players.keys().cloned().collect();
        names.sort();
        names
    }

    /// When `name` joined, if online.
    pub fn joined_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.players.get(name).copied()
    }

    /// When a player last left, if ever.
    pub const fn last_part_at(&self) -> Option<DateTime<Utc>> {
        self.last_part
    }

    /// Number of online players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether nobody is online.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn join_then_leave_updates_last_part() {
        let mut roster = PlayerRoster::new();
        let joined = Utc::now();
        roster.join("Alice", joined);
        assert_eq!(roster.players(), vec!["Alice".to_string()]);
        assert_eq!(roster.joined_at("Alice"), Some(joined));
        assert!(roster.last_part_at().is_none());

        let left = joined + Duration::seconds(5);
        assert!(roster.leave("Alice", left));
        assert!(roster.is_empty());
        assert_eq!(roster.last_part_at(), Some(left));
    }

    #[test]
    fn leave_for_unknown_player_is_ignored() {
        let mut roster = PlayerRoster::new();
        roster.join("Bob", Utc::now());

        assert!(!roster.leave("Mallory", Utc::now()));
        assert_eq!(roster.len(), 1);
        assert!(roster.last_part_at().is_none());
    }

    #[test]
    fn players_are_sorted() {
        let mut roster = PlayerRoster::new();
        let now = Utc::now();
        roster.join("zed", now);
        roster.join("Alice", now);
        roster.join("bob", now);
        assert_eq!(roster.players(), vec!["Alice", "bob", "zed"]);
    }
}
