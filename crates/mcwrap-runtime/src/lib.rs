//! Process runtime for mcwrap.
//!
//! Everything that touches the operating system lives here: spawning and
//! watching the server, relaying its stdio, the world lock, and reading and
//! writing world archives. Types shared with callers come from `mcwrap-core`.

#![deny(unsafe_code)]

pub mod archive;
pub mod events;
pub mod relay;
pub mod signal;
pub mod supervisor;
pub mod world;
pub mod world_lock;

pub use archive::{ArchiveFormat, ArchiveReader, ArchiveWriter, new_writer, open_reader};
pub use events::{HandlerId, LogEventDispatcher, LogHandler, LogMatch, handler};
pub use signal::ShutdownSignal;
pub use supervisor::ProcessSupervisor;
pub use world::{ExtractSummary, WorldExport, WorldFile};
pub use world_lock::{ReadPermit, WorldAccessLock, WritePermit};
