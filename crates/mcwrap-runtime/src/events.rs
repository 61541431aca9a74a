//! Log event dispatch for server console output.
//!
//! Each line the server prints is parsed as `[hh:mm:ss] [thread/LEVEL]: message`.
//! The message is offered to every registered handler whose pattern matches
//! it; handlers run one after another in registration order and may ask for
//! the line to be kept out of the wrapper's own log.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use regex::{Captures, Regex};
use tracing::{debug, error, info, warn};

/// Target under which relayed server output is logged.
pub const SERVER_LOG_TARGET: &str = "mcwrap::server";

/// Async callback run for a matching message. Returns `true` to suppress the
/// line from the wrapper's log.
pub type LogHandler = Arc<dyn Fn(LogMatch) -> BoxFuture<'static, bool> + Send + Sync>;

/// Wrap an async closure as a [`LogHandler`].
pub fn handler<F, Fut>(f: F) -> LogHandler
where
    F: Fn(LogMatch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(move |m| Box::pin(f(m)))
}

/// Identifies a registration for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Owned copy of a pattern match against a log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMatch {
    groups: Vec<Option<String>>,
    named: HashMap<String, String>,
}

impl LogMatch {
    fn from_captures(pattern: &Regex, captures: &Captures<'_>) -> Self {
        let groups = captures
            .iter()
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect();
        let named = pattern
            .capture_names()
            .flatten()
            .filter_map(|name| captures.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Self { groups, named }
    }

    /// The whole matched text.
    pub fn text(&self) -> &str {
        self.get(0).unwrap_or_default()
    }

    /// Positional group; 0 is the whole match.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index)?.as_deref()
    }

    /// Named group, if it participated in the match.
    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }
}

struct Registration {
    id: HandlerId,
    pattern: Regex,
    handler: LogHandler,
    one_shot: bool,
}

impl Registration {
    /// Match at the start of the message, as a line-prefix pattern would.
    fn matches(&self, message: &str) -> Option<LogMatch> {
        let captures = self.pattern.captures(message)?;
        if captures.get(0)?.start() != 0 {
            return None;
        }
        Some(LogMatch::from_captures(&self.pattern, &captures))
    }
}

/// Severity reported by the server for a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLevel {
    Error,
    Warn,
    Info,
}

/// A console line split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerLogLine<'a> {
    pub time: (u32, u32, u32),
    pub thread: &'a str,
    pub level: &'a str,
    pub message: &'a str,
}

impl<'a> ServerLogLine<'a> {
    /// Parse `[hh:mm:ss] [thread/LEVEL]: message`.
    ///
    /// The level ends at the last `]:` on the line and the thread at the last
    /// `/` before it. The space after the colon is optional.
    pub fn parse(line: &'a str) -> Option<Self> {
        let rest = line.strip_prefix('[')?;
        let (clock, rest) = rest.split_once("] [")?;
        let mut fields = clock.split(':').map(parse_clock_field);
        let time = (fields.next()??, fields.next()??, fields.next()??);
        if fields.next().is_some() {
            return None;
        }

        let end = rest.rfind("]:")?;
        let (thread, level) = rest[..end].rsplit_once('/')?;
        let message = &rest[end + 2..];
        let message = message.strip_prefix(' ').unwrap_or(message);

        Some(Self {
            time,
            thread,
            level,
            message,
        })
    }
}

fn parse_clock_field(field: &str) -> Option<u32> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// Ordered table of pattern handlers fed from the server's output.
pub struct LogEventDispatcher {
    registrations: Mutex<Vec<Arc<Registration>>>,
    next_id: AtomicU64,
    unknown_levels: Mutex<HashSet<String>>,
}

impl LogEventDispatcher {
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            unknown_levels: Mutex::new(HashSet::new()),
        }
    }

    /// Add a permanent handler at the end of the table.
    pub fn register(&self, pattern: Regex, handler: LogHandler) -> HandlerId {
        self.insert(pattern, handler, false)
    }

    /// Add a handler that is removed the first time it matches.
    ///
    /// One-shot handlers still pending when the server exits are dropped by
    /// [`drop_one_shot`](Self::drop_one_shot).
    pub fn register_once(&self, pattern: Regex, handler: LogHandler) -> HandlerId {
        self.insert(pattern, handler, true)
    }

    fn insert(&self, pattern: Regex, handler: LogHandler, one_shot: bool) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(?id, pattern = %pattern, one_shot, "Registering log handler");
        self.table().push(Arc::new(Registration {
            id,
            pattern,
            handler,
            one_shot,
        }));
        id
    }

    /// Remove a registration. Returns whether it was still present.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut table = self.table();
        let before = table.len();
        table.retain(|r| r.id != id);
        table.len() != before
    }

    /// Remove every pending one-shot registration.
    pub fn drop_one_shot(&self) -> usize {
        let mut table = self.table();
        let before = table.len();
        table.retain(|r| !r.one_shot);
        let dropped = before - table.len();
        if dropped > 0 {
            debug!(dropped, "Dropped pending one-shot log handlers");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Registration>>> {
        self.registrations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn is_live(&self, id: HandlerId) -> bool {
        self.table().iter().any(|r| r.id == id)
    }

    /// Run every handler matching `message` and report whether any asked for
    /// suppression.
    ///
    /// The table is snapshotted first, so handlers may register or remove
    /// entries while running. An entry removed before its turn is skipped.
    pub async fn dispatch(&self, message: &str) -> bool {
        let snapshot: Vec<Arc<Registration>> = self.table().clone();
        let mut suppress = false;

        for registration in snapshot {
            let Some(found) = registration.matches(message) else {
                continue;
            };
            let claimed = if registration.one_shot {
                self.unregister(registration.id)
            } else {
                self.is_live(registration.id)
            };
            if !claimed {
                continue;
            }
            suppress |= (registration.handler)(found).await;
        }
        suppress
    }

    /// Parse, dispatch and log one line of server output.
    pub async fn handle_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let Some(parsed) = ServerLogLine::parse(line) else {
            warn!(target: SERVER_LOG_TARGET, "{line}");
            return;
        };

        let level = self.map_level(parsed.level);
        if self.dispatch(parsed.message).await {
            return;
        }
        let thread = parsed.thread;
        let message = parsed.message;
        match level {
            ServerLevel::Error => error!(target: SERVER_LOG_TARGET, thread, "{message}"),
            ServerLevel::Warn => warn!(target: SERVER_LOG_TARGET, thread, "{message}"),
            ServerLevel::Info => info!(target: SERVER_LOG_TARGET, thread, "{message}"),
        }
    }

    /// Map the server's level name, warning once for each unknown one.
    pub fn map_level(&self, level: &str) -> ServerLevel {
        match level {
            "ERROR" => ServerLevel::Error,
            "WARNING" => ServerLevel::Warn,
            "INFO" => ServerLevel::Info,
            other => {
                let first_time = self
                    .unknown_levels
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .insert(other.to_string());
                if first_time {
                    warn!(level = other, "Unknown server log level, treating as INFO");
                }
                ServerLevel::Info
            }
        }
    }
}

impl Default for LogEventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LogEventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEventDispatcher")
            .field("registrations", &self.len())
            .finish_non_exhaustive()
    }
}
