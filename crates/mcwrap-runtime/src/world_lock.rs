//! Writer-preferring reader/writer lock guarding the world directory.
//!
//! A single gate serializes entry. Readers pass through it and leave it free
//! again, bumping a shared counter on the way. A writer takes the gate and
//! keeps it until it is done, so once a writer is queued no new reader can
//! get in. The writer then waits for the counter to drain before proceeding.
//!
//! Permits release on drop. Callers that need a deadline wrap the acquire
//! future in `tokio::time::timeout`; dropping a pending acquire leaves the
//! lock unchanged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tracing::trace;

struct LockState {
    gate: Arc<Mutex<()>>,
    readers: watch::Sender<usize>,
    writer_held: AtomicBool,
}

/// Shared handle to the world lock.
#[derive(Clone)]
pub struct WorldAccessLock {
    state: Arc<LockState>,
}

impl WorldAccessLock {
    pub fn new() -> Self {
        let (readers, _) = watch::channel(0);
        Self {
            state: Arc::new(LockState {
                gate: Arc::new(Mutex::new(())),
                readers,
                writer_held: AtomicBool::new(false),
            }),
        }
    }

    /// Wait until no writer holds or awaits the gate, then register a reader.
    pub async fn acquire_read(&self) -> ReadPermit {
        let _gate = self.state.gate.lock().await;
        self.state.readers.send_modify(|count| *count += 1);
        trace!(readers = self.reader_count(), "World read permit acquired");
        ReadPermit {
            state: Arc::clone(&self.state),
        }
    }

    /// Take the gate, then wait for every active reader to finish.
    pub async fn acquire_write(&self) -> WritePermit {
        let gate = Arc::clone(&self.state.gate).lock_owned().await;

        let mut readers = self.state.readers.subscribe();
        // The sender lives in `state`, which this call keeps alive
        let _ = readers.wait_for(|count| *count == 0).await;

        self.state.writer_held.store(true, Ordering::Release);
        trace!("World write permit acquired");
        WritePermit {
            state: Arc::clone(&self.state),
            _gate: gate,
        }
    }

    /// Whether a reader would get through the gate right now.
    pub fn can_read(&self) -> bool {
        self.state.gate.try_lock().is_ok()
    }

    /// Whether a writer would proceed without waiting.
    pub fn can_write(&self) -> bool {
        self.can_read() && self.reader_count() == 0
    }

    pub fn reader_count(&self) -> usize {
        *self.state.readers.borrow()
    }

    pub fn is_write_held(&self) -> bool {
        self.state.writer_held.load(Ordering::Acquire)
    }
}

impl Default for WorldAccessLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorldAccessLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldAccessLock")
            .field("readers", &self.reader_count())
            .field("writer_held", &self.is_write_held())
            .finish()
    }
}

/// Shared access to the world. Released on drop.
#[must_use = "the read permit is released as soon as it is dropped"]
pub struct ReadPermit {
    state: Arc<LockState>,
}

impl std::fmt::Debug for ReadPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadPermit")
            .field("readers", &*self.state.readers.borrow())
            .finish()
    }
}

impl Drop for ReadPermit {
    fn drop(&mut self) {
        self.state
            .readers
            .send_modify(|count| *count = count.saturating_sub(1));
        trace!("World read permit released");
    }
}

/// Exclusive access to the world. Released on drop.
#[must_use = "the write permit is released as soon as it is dropped"]
pub struct WritePermit {
    state: Arc<LockState>,
    _gate: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for WritePermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePermit").finish_non_exhaustive()
    }
}

impl Drop for WritePermit {
    fn drop(&mut self) {
        // The gate guard is dropped right after this body runs
        self.state.writer_held.store(false, Ordering::Release);
        trace!("World write permit released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn readers_share_access() {
        let lock = WorldAccessLock::new();
        let first = lock.acquire_read().await;
        let second = lock.acquire_read().await;

        assert_eq!(lock.reader_count(), 2);
        assert!(lock.can_read());
        assert!(!lock.can_write());

        drop(first);
        drop(second);
        assert_eq!(lock.reader_count(), 0);
        assert!(lock.can_write());
    }

    #[tokio::test]
    async fn writer_excludes_readers_and_writers() {
        let lock = WorldAccessLock::new();
        let permit = lock.acquire_write().await;

        assert!(lock.is_write_held());
        assert!(!lock.can_read());
        assert!(!lock.can_write());
        assert!(timeout(SHORT, lock.acquire_read()).await.is_err());
        assert!(timeout(SHORT, lock.acquire_write()).await.is_err());

        drop(permit);
        assert!(!lock.is_write_held());
        assert!(lock.can_write());
        let _reader = lock.acquire_read().await;
    }

    #[tokio::test]
    async fn pending_reader_wakes_when_writer_releases() {
        let lock = WorldAccessLock::new();
        let permit = lock.acquire_write().await;

        let mut read = tokio_test::task::spawn(lock.acquire_read());
        tokio_test::assert_pending!(read.poll());

        drop(permit);
        assert!(read.is_woken());
        let reader = tokio_test::assert_ready!(read.poll());
        assert_eq!(lock.reader_count(), 1);
        assert_eq!(format!("{reader:?}"), "ReadPermit { readers: 1 }");
    }

    #[tokio::test]
    async fn writer_waits_for_readers_to_drain() {
        let lock = WorldAccessLock::new();
        let reader = lock.acquire_read().await;

        let writer_lock = lock.clone();
        let writer = tokio::spawn(async move {
            let _permit = writer_lock.acquire_write().await;
            writer_lock.is_write_held()
        });

        tokio::time::sleep(SHORT).await;
        assert!(!writer.is_finished());
        assert!(!lock.is_write_held());

        drop(reader);
        assert!(writer.await.unwrap());
    }

    #[tokio::test]
    async fn queued_writer_blocks_new_readers() {
        let lock = WorldAccessLock::new();
        let reader = lock.acquire_read().await;

        let writer_lock = lock.clone();
        let writer = tokio::spawn(async move {
            let permit = writer_lock.acquire_write().await;
            tokio::time::sleep(SHORT).await;
            drop(permit);
        });
        tokio::time::sleep(SHORT).await;

        // The writer owns the gate while waiting for the first reader
        assert!(!lock.can_read());
        assert!(timeout(SHORT, lock.acquire_read()).await.is_err());

        drop(reader);
        writer.await.unwrap();
        assert!(lock.can_read());
    }

    #[tokio::test]
    async fn abandoned_write_attempt_releases_gate() {
        let lock = WorldAccessLock::new();
        let reader = lock.acquire_read().await;

        assert!(timeout(SHORT, lock.acquire_write()).await.is_err());
        assert!(lock.can_read());
        assert!(!lock.is_write_held());
        drop(reader);
    }
}
