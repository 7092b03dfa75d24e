//! Session layer for the lockstep simulation.
//!
//! This crate replicates [`game_core`] commands between one authority and
//! any number of followers so every instance applies the same commands at
//! the same frame, and detects divergence through periodic PRNG
//! checkpoints. Consumers embed [`Runtime`] to host or join a session and
//! interact with it through [`RuntimeHandle`].
//!
//! Modules are organized by responsibility:
//! - [`session`] holds the authority and follower state machines
//! - [`protocol`] and [`net`] define the wire format and peer links
//! - [`runtime`] hosts the orchestrator and builder
//! - [`api`] exposes the types downstream clients interact with
//! - [`events`] provides topic-based event bus for flexible event routing
//! - [`workers`] keeps background tasks internal to the crate
pub mod api;
pub mod config;
pub mod events;
pub mod net;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod utils;

mod workers;

pub use api::{Result, RuntimeHandle, SessionError};
pub use config::{ConfigError, LagConfig, NetConfig, RuntimeConfig, SyncConfig};
pub use events::{CommandEvent, Event, EventBus, SessionEvent, SyncEvent, Topic};
pub use net::{ClientLink, ConnectionString, DEFAULT_PORT, LinkError, ServerLink};
pub use protocol::{ErrorCode, PeerId, ProtocolError};
pub use runtime::{Runtime, RuntimeBuilder};
pub use session::{AuthoritySession, FollowerSession, FollowerStatus, SessionInfo};
