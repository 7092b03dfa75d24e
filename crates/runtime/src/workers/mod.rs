//! Worker tasks that back the runtime orchestration.
//!
//! The session worker owns the world state and advances it on a fixed
//! tick; handles talk to it over channels.

mod session;

pub use session::{SessionCommand, SessionWorker};
