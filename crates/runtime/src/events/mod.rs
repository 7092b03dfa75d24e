//! Topic-based event bus for session events.
//!
//! Events are published to specific topics, and consumers subscribe only to
//! the topics they need. Delivery is best-effort: slow subscribers lag.

mod bus;
mod types;

pub use bus::{Event, EventBus, Topic};
pub use types::{CommandEvent, SessionEvent, SyncEvent};
