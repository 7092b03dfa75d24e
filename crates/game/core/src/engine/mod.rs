//! Command execution pipeline.
//!
//! [`Executor`] runs one command with trial/commit semantics and recursion
//! tracking; [`Dispatcher`] is the admission point that decides whether an
//! accepted command commits locally or goes to the replication queue. Both
//! thread an explicit [`ExecutionContext`] instead of process-wide globals.
mod context;
mod dispatch;
mod executor;

pub use context::ExecutionContext;
pub use dispatch::{CommandSink, DispatchOutcome, Dispatcher, ExecutionPhase, SessionRole};
pub use executor::Executor;
