//! Console input port.
//!
//! A fresh reader is opened each time the server starts, so the port is a
//! factory rather than a single stream.

use std::io::{self, Read};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf, empty};
use tokio::sync::mpsc;
use tracing::debug;

/// Boxed async byte source.
pub type ConsoleReader = Pin<Box<dyn AsyncRead + Send>>;

/// Source of operator input relayed to the server's stdin.
pub trait ConsoleInputPort: Send + Sync {
    /// Open a reader for the lifetime of one server process.
    fn open(&self) -> ConsoleReader;
}

type ChunkReceiver = Arc<Mutex<mpsc::Receiver<io::Result<Vec<u8>>>>>;

/// Chunks buffered between the stdin thread and the relay.
const STDIN_CHANNEL_CAPACITY: usize = 16;

/// Relays the wrapper's own stdin.
///
/// Stdin is read on a dedicated thread that hands chunks over a channel, so a
/// relay waiting for input can be cancelled at any time and an idle terminal
/// never holds up shutdown. The thread lives as long as the process.
#[derive(Debug, Clone)]
pub struct StdinConsoleInput {
    chunks: ChunkReceiver,
}

impl StdinConsoleInput {
    /// Start the stdin reader thread.
    pub fn new() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel(STDIN_CHANNEL_CAPACITY);
        std::thread::Builder::new()
            .name("mcwrap-stdin".to_string())
            .spawn(move || pump_stdin(&tx))?;
        Ok(Self {
            chunks: Arc::new(Mutex::new(rx)),
        })
    }
}

fn pump_stdin(tx: &mpsc::Sender<io::Result<Vec<u8>>>) {
    let mut stdin = io::stdin().lock();
    let mut buf = [0u8; 1024];
    loop {
        let chunk = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => Err(e),
        };
        let failed = chunk.is_err();
        if tx.blocking_send(chunk).is_err() || failed {
            break;
        }
    }
    debug!("Stdin reader thread exiting");
}

impl ConsoleInputPort for StdinConsoleInput {
    fn open(&self) -> ConsoleReader {
        Box::pin(ChannelReader::new(Arc::clone(&self.chunks)))
    }
}

/// Async reader over chunks arriving on a channel.
///
/// Ends when every sender is gone. Bytes of a chunk not yet read when the
/// reader is dropped are discarded.
struct ChannelReader {
    chunks: ChunkReceiver,
    current: Vec<u8>,
    offset: usize,
}

impl ChannelReader {
    const fn new(chunks: ChunkReceiver) -> Self {
        Self {
            chunks,
            current: Vec::new(),
            offset: 0,
        }
    }
}

impl AsyncRead for ChannelReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.offset >= this.current.len() {
            let polled = this
                .chunks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .poll_recv(cx);
            match polled {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(e)),
                Poll::Ready(Some(Ok(chunk))) => {
                    this.current = chunk;
                    this.offset = 0;
                }
            }
        }

        let available = &this.current[this.offset..];
        let n = available.len().min(buf.remaining());
        buf.put_slice(&available[..n]);
        this.offset += n;
        Poll::Ready(Ok(()))
    }
}

/// No operator input; the relay sees immediate end-of-stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConsoleInput;

impl ConsoleInputPort for NoConsoleInput {
    fn open(&self) -> ConsoleReader {
        Box::pin(empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn channel() -> (mpsc::Sender<io::Result<Vec<u8>>>, ChunkReceiver) {
        let (tx, rx) = mpsc::channel(4);
        (tx, Arc::new(Mutex::new(rx)))
    }

    #[tokio::test]
    async fn reader_yields_chunks_then_eof() {
        let (tx, rx) = channel();
        tx.send(Ok(b"say hi\n".to_vec())).await.unwrap();
        tx.send(Ok(b"list\n".to_vec())).await.unwrap();
        drop(tx);

        let mut reader = ChannelReader::new(rx);
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "say hi\nlist\n");
    }

    #[tokio::test]
    async fn reader_splits_chunk_across_small_reads() {
        let (tx, rx) = channel();
        tx.send(Ok(b"abcdef".to_vec())).await.unwrap();

        let mut reader = ChannelReader::new(rx);
        let mut small = [0u8; 4];
        assert_eq!(reader.read(&mut small).await.unwrap(), 4);
        assert_eq!(&small, b"abcd");
        assert_eq!(reader.read(&mut small).await.unwrap(), 2);
        assert_eq!(&small[..2], b"ef");
    }

    #[tokio::test]
    async fn idle_read_can_be_abandoned() {
        let (tx, rx) = channel();
        let mut reader = ChannelReader::new(Arc::clone(&rx));
        let mut buf = [0u8; 8];

        let idle = tokio::time::timeout(Duration::from_millis(50), reader.read(&mut buf)).await;
        assert!(idle.is_err());

        // A reader opened for the next run still receives later input
        drop(reader);
        tx.send(Ok(b"stop\n".to_vec())).await.unwrap();
        let mut next = ChannelReader::new(rx);
        let n = next.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"stop\n");
    }

    #[tokio::test]
    async fn read_error_is_surfaced() {
        let (tx, rx) = channel();
        tx.send(Err(io::Error::other("tty gone"))).await.unwrap();

        let mut reader = ChannelReader::new(rx);
        let mut buf = [0u8; 8];
        assert!(reader.read(&mut buf).await.is_err());
    }
}
