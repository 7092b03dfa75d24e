//! Session worker that owns a [`Session`] and its world state.
//!
//! Receives commands from [`RuntimeHandle`](crate::RuntimeHandle), advances
//! the session on a fixed tick and answers queries with snapshots. Nothing
//! outside this task ever touches the world state.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use game_core::{CommandCallback, DispatchOutcome, GameState};

use crate::api::Result;
use crate::session::{Session, SessionInfo};

/// Commands that can be sent to the session worker
pub enum SessionCommand {
    /// Dispatch a command through the session.
    Dispatch {
        command: game_core::Command,
        callback: Option<CommandCallback>,
        reply: oneshot::Sender<Result<DispatchOutcome>>,
    },
    /// Query the current game state (read-only).
    QueryState { reply: oneshot::Sender<GameState> },
    /// Query frame counters and fingerprint.
    QueryInfo { reply: oneshot::Sender<SessionInfo> },
    /// Leave or close the session and stop the worker.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Background task that drives one session.
pub struct SessionWorker {
    session: Box<dyn Session>,
    command_rx: mpsc::Receiver<SessionCommand>,
    tick_interval: Duration,
}

impl SessionWorker {
    pub fn new(
        session: Box<dyn Session>,
        command_rx: mpsc::Receiver<SessionCommand>,
        tick_interval: Duration,
    ) -> Self {
        info!(
            target: "runtime::worker",
            role = %session.role(),
            frame = session.info().frame,
            ?tick_interval,
            "SessionWorker initialized"
        );

        Self {
            session,
            command_rx,
            tick_interval,
        }
    }

    /// Main worker loop. Returns the error that ended the session, if any.
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.session.update() {
                        error!(target: "runtime::worker", error = %err, "session ended with error");
                        self.session.shutdown();
                        return Err(err);
                    }
                    if self.session.is_finished() {
                        info!(target: "runtime::worker", "session finished");
                        return Ok(());
                    }
                }
                cmd = self.command_rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd) {
                            return Ok(());
                        }
                    }
                    None => {
                        debug!(target: "runtime::worker", "all handles dropped, shutting down");
                        self.session.shutdown();
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Returns `true` when the worker should stop.
    fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::Dispatch {
                command,
                callback,
                reply,
            } => {
                let result = self.session.dispatch(command, callback);
                if reply.send(result).is_err() {
                    debug!("Dispatch reply channel closed (caller dropped)");
                }
                false
            }
            SessionCommand::QueryState { reply } => {
                if reply.send(self.session.state().clone()).is_err() {
                    debug!("QueryState reply channel closed (caller dropped)");
                }
                false
            }
            SessionCommand::QueryInfo { reply } => {
                if reply.send(self.session.info()).is_err() {
                    debug!("QueryInfo reply channel closed (caller dropped)");
                }
                false
            }
            SessionCommand::Shutdown { reply } => {
                self.session.shutdown();
                let _ = reply.send(());
                true
            }
        }
    }
}
