//! Relay tasks between the server's stdio, the console and the dispatcher.
//!
//! Output is read a line at a time and handed to the dispatcher in the order
//! it was printed. Console input is forwarded to the server one complete line
//! at a time, holding the stdin lock for the whole line, so commands sent by
//! the supervisor never land in the middle of a half-typed console line.

use std::sync::{Arc, Mutex, PoisonError};

use mcwrap_core::{ConsoleReader, PlayerRoster};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::LogEventDispatcher;

/// Child stdin shared between the input relay and the supervisor.
///
/// `None` once the child has exited.
pub type SharedStdin<W> = Arc<tokio::sync::Mutex<Option<W>>>;

/// Roster shared between the log handlers and the console dump.
pub type SharedRoster = Arc<Mutex<PlayerRoster>>;

/// Accumulates raw input and releases it one terminated line at a time.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Next complete line, terminator included.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        Some(self.pending.drain(..=end).collect())
    }

    /// Bytes received after the last terminator.
    pub fn remainder(&self) -> &[u8] {
        &self.pending
    }
}

/// Strip a trailing `\n` or `\r\n`.
fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Feed the server's output into `dispatcher` until EOF or cancellation.
///
/// Lines are decoded lossily so stray non-UTF-8 bytes never end the relay.
pub fn spawn_output_relay<R>(
    stdout: R,
    dispatcher: Arc<LogEventDispatcher>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            let read = tokio::select! {
                () = cancel.cancelled() => break,
                read = reader.read_until(b'\n', &mut buf) => read,
            };
            match read {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(trim_line_end(&buf)).into_owned();
                    dispatcher.handle_line(&line).await;
                }
                Err(e) => {
                    debug!(error = %e, "Server output relay exiting due to read error");
                    break;
                }
            }
        }

        debug!("Server output relay task exiting");
    })
}

/// Forward console input to the server until EOF, error or cancellation.
///
/// A line equal to `dump_command` logs the player roster instead of being
/// forwarded. A trailing line without terminator is discarded.
pub fn spawn_input_relay<W>(
    mut input: ConsoleReader,
    stdin: SharedStdin<W>,
    dump_command: String,
    roster: SharedRoster,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = LineBuffer::new();
        let mut chunk = [0u8; 1024];

        'relay: loop {
            let read = tokio::select! {
                () = cancel.cancelled() => break,
                read = input.read(&mut chunk) => read,
            };
            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!(error = %e, "Console input relay exiting due to read error");
                    break;
                }
            };
            lines.push(&chunk[..n]);

            while let Some(line) = lines.next_line() {
                if trim_line_end(&line) == dump_command.as_bytes() {
                    dump_roster(&roster);
                    continue;
                }

                let mut guard = stdin.lock().await;
                let Some(writer) = guard.as_mut() else {
                    debug!("Server stdin closed, stopping console relay");
                    break 'relay;
                };
                let written = async {
                    writer.write_all(&line).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    debug!(error = %e, "Console input relay exiting due to write error");
                    break 'relay;
                }
            }
        }

        if !lines.remainder().is_empty() {
            debug!(bytes = lines.remainder().len(), "Discarding unterminated console input");
        }
        debug!("Console input relay task exiting");
    })
}

fn dump_roster(roster: &SharedRoster) {
    let roster = roster.lock().unwrap_or_else(PoisonError::into_inner);
    let players = roster.players();
    info!(count = players.len(), ?players, "Connected players");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::handler;
    use chrono::Utc;
    use regex::Regex;
    use std::time::Duration;
    use tokio::io::duplex;

    #[test]
    fn line_buffer_releases_only_complete_lines() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"say hel");
        assert!(buffer.next_line().is_none());

        buffer.push(b"lo\nlist\npart");
        assert_eq!(buffer.next_line().unwrap(), b"say hello\n");
        assert_eq!(buffer.next_line().unwrap(), b"list\n");
        assert!(buffer.next_line().is_none());
        assert_eq!(buffer.remainder(), b"part");
    }

    #[test]
    fn trims_both_line_endings() {
        assert_eq!(trim_line_end(b"ll\r\n"), b"ll");
        assert_eq!(trim_line_end(b"ll\n"), b"ll");
        assert_eq!(trim_line_end(b"ll"), b"ll");
    }

    #[tokio::test]
    async fn output_lines_reach_dispatcher_in_order() {
        let dispatcher = Arc::new(LogEventDispatcher::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.register(
            Regex::new(".*").unwrap(),
            handler(move |m| {
                sink.lock().unwrap().push(m.text().to_string());
                async { true }
            }),
        );

        let output: &[u8] = b"[00:00:01] [main/INFO]: one\r\n[00:00:02] [main/INFO]: tw\xffo\n";
        spawn_output_relay(output, Arc::clone(&dispatcher), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["one".to_string(), "tw\u{fffd}o".to_string()]);
    }

    #[tokio::test]
    async fn console_lines_are_forwarded_except_dump() {
        let (console_tx, console_rx) = duplex(64);
        let (stdin_tx, mut stdin_rx) = duplex(64);
        let stdin = Arc::new(tokio::sync::Mutex::new(Some(stdin_tx)));
        let roster = Arc::new(Mutex::new(PlayerRoster::new()));
        roster.lock().unwrap().join("Steve", Utc::now());

        let task = spawn_input_relay(
            Box::pin(console_rx),
            Arc::clone(&stdin),
            "ll".to_string(),
            roster,
            CancellationToken::new(),
        );

        let mut console_tx = console_tx;
        console_tx.write_all(b"say hi\nll\nlist\nhalf").await.unwrap();
        drop(console_tx);
        task.await.unwrap();
        stdin.lock().await.take();

        let mut forwarded = String::new();
        stdin_rx.read_to_string(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, "say hi\nlist\n");
    }

    #[tokio::test]
    async fn cancellation_stops_input_relay() {
        let (_console_tx, console_rx) = duplex(64);
        let (stdin_tx, _stdin_rx) = duplex(64);
        let cancel = CancellationToken::new();
        let task = spawn_input_relay(
            Box::pin(console_rx),
            Arc::new(tokio::sync::Mutex::new(Some(stdin_tx))),
            "ll".to_string(),
            Arc::new(Mutex::new(PlayerRoster::new())),
            cancel.clone(),
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
