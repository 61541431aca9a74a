//! Domain types describing the supervised server.

mod roster;
mod status;

pub use roster::PlayerRoster;
pub use status::{ProcessStatus, StatusSnapshot};
