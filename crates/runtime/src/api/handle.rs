//! Cloneable façade for issuing commands to a running session.
//!
//! [`RuntimeHandle`] hides channel plumbing and offers async helpers for
//! dispatching commands, querying the world or streaming events from
//! specific topics.
use tokio::sync::{broadcast, mpsc, oneshot};

use game_core::{Command, CommandCallback, CommandReport, DispatchOutcome, GameState};

use super::errors::{Result, SessionError};
use crate::events::{Event, EventBus, Topic};
use crate::session::SessionInfo;
use crate::workers::SessionCommand;

/// Client-facing handle to interact with the runtime
#[derive(Clone)]
pub struct RuntimeHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    event_bus: EventBus,
}

impl RuntimeHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<SessionCommand>, event_bus: EventBus) -> Self {
        Self {
            command_tx,
            event_bus,
        }
    }

    /// Dispatch a command on behalf of this instance's player.
    pub async fn dispatch(&self, command: Command) -> Result<DispatchOutcome> {
        self.dispatch_inner(command, None).await
    }

    /// Dispatch a command and run `callback` with its final result.
    ///
    /// For networked commands the callback fires once the command is applied
    /// at its target frame, which is after this call returns.
    pub async fn dispatch_with_callback(
        &self,
        command: Command,
        callback: impl FnOnce(CommandReport) + Send + 'static,
    ) -> Result<DispatchOutcome> {
        self.dispatch_inner(command, Some(Box::new(callback))).await
    }

    async fn dispatch_inner(
        &self,
        command: Command,
        callback: Option<CommandCallback>,
    ) -> Result<DispatchOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(SessionCommand::Dispatch {
                command,
                callback,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::CommandChannelClosed)?;

        reply_rx.await.map_err(SessionError::ReplyChannelClosed)?
    }

    /// Query the current game state (read-only snapshot)
    pub async fn query_state(&self) -> Result<GameState> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(SessionCommand::QueryState { reply: reply_tx })
            .await
            .map_err(|_| SessionError::CommandChannelClosed)?;

        reply_rx.await.map_err(SessionError::ReplyChannelClosed)
    }

    /// Frame counters, fingerprint and status.
    pub async fn info(&self) -> Result<SessionInfo> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(SessionCommand::QueryInfo { reply: reply_tx })
            .await
            .map_err(|_| SessionError::CommandChannelClosed)?;

        reply_rx.await.map_err(SessionError::ReplyChannelClosed)
    }

    /// Leave or close the session. The worker stops afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(SessionCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| SessionError::CommandChannelClosed)?;

        reply_rx.await.map_err(SessionError::ReplyChannelClosed)
    }

    /// Subscribe to events from a specific topic
    ///
    /// # Topics
    ///
    /// - `Topic::Command` - Command outcomes
    /// - `Topic::Sync` - Checkpoints and desync reports
    /// - `Topic::Session` - Peers and follower status
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use runtime::Topic;
    ///
    /// let mut sync_rx = handle.subscribe(Topic::Sync);
    /// while let Ok(event) = sync_rx.recv().await {
    ///     // Handle checkpoint events
    /// }
    /// ```
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    /// Subscribe to multiple topics at once
    pub fn subscribe_multiple(
        &self,
        topics: &[Topic],
    ) -> std::collections::HashMap<Topic, broadcast::Receiver<Event>> {
        self.event_bus.subscribe_multiple(topics)
    }

    /// Get a reference to the event bus for advanced usage
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}
