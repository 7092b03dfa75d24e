//! Deterministic world state and command pipeline shared by every instance.
//!
//! `game-core` defines the replicated [`GameState`], the command table
//! ([`command::CommandRegistry`]) and the execution pipeline
//! ([`engine::Dispatcher`], [`engine::Executor`]). It performs no I/O: the
//! session layer feeds it [`Command`] values and reads back outcomes and PRNG
//! fingerprints.
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod state;

pub use command::{
    Command, CommandCallback, CommandError, CommandFlags, CommandId, CommandRegistry,
    CommandReport, CommandResult, DispatchOptions, ExecFlags, MessageId,
};
pub use config::GameConfig;
pub use engine::{
    CommandSink, DispatchOutcome, Dispatcher, ExecutionContext, ExecutionPhase, Executor,
    SessionRole,
};
pub use error::{ErrorSeverity, GameError};
pub use state::{
    Fingerprint, GameRandom, GameState, Location, Money, PlayerId, PlayerState, Structure,
    StructureKind, TileMap,
};
