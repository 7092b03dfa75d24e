//! Follower side of a session.
//!
//! A follower joins with `Join`, receives the world in `Welcome` and from
//! then on only simulates what the authority allows: it never runs past
//! `frame_max`, applies every command at its stamped frame and checks each
//! checkpoint against its own fingerprint.
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use game_core::{
    Command, CommandCallback, CommandRegistry, CommandSink, DispatchOutcome, Dispatcher,
    ExecutionContext, Fingerprint, GameState, PlayerId, SessionRole,
};

use crate::api::{Result, SessionError};
use crate::config::RuntimeConfig;
use crate::events::{EventBus, SessionEvent, SyncEvent};
use crate::net::{ClientLink, LinkError};
use crate::protocol::{
    ClientPacket, CommandPacket, ErrorCode, FramedCommand, PROTOCOL_VERSION, PeerId,
    ProtocolError, ServerPacket, Welcome,
};
use crate::utils::hash::state_digest;

use super::apply::{self, Applied};
use super::callbacks::PendingCallbacks;
use super::queue::CommandQueue;
use super::sync::{CommitFailureTracker, SyncVerifier, Verification};

/// Follower session state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FollowerStatus {
    /// Waiting for `Welcome`.
    Joining,
    /// One frame per update, level with the authority.
    Running,
    /// Several frames per update to reach the authority's frame.
    CatchingUp,
    /// At the frame allowance; waiting for the authority.
    Stalled,
    Desynced,
    ConnectionLost,
    /// Ended by `Shutdown` or by leaving.
    Closed,
}

impl FollowerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Desynced | Self::ConnectionLost | Self::Closed)
    }

    pub fn is_joined(self) -> bool {
        matches!(self, Self::Running | Self::CatchingUp | Self::Stalled)
    }
}

pub struct FollowerSession {
    config: RuntimeConfig,
    registry: Arc<CommandRegistry>,
    link: ClientLink,
    state: GameState,
    ctx: ExecutionContext,
    peer: Option<PeerId>,
    player: PlayerId,
    frame: u32,
    frame_max: u32,
    frame_server: u32,
    queue: CommandQueue,
    verifier: SyncVerifier,
    failures: CommitFailureTracker,
    callbacks: PendingCallbacks,
    /// Frame of the last `Ack`; `None` until a checkpoint verified.
    last_ack: Option<u32>,
    last_heard: Instant,
    roster: BTreeMap<PeerId, (String, PlayerId)>,
    status: FollowerStatus,
    /// Code the authority disconnected us with.
    refused: Option<ErrorCode>,
    /// Failed checkpoint: frame, local and expected fingerprint.
    desync: Option<(u32, Fingerprint, Fingerprint)>,
    events: EventBus,
}

impl FollowerSession {
    /// Sends `Join` over `link` and waits for `Welcome` in later updates.
    pub fn join(
        config: RuntimeConfig,
        registry: Arc<CommandRegistry>,
        mut link: ClientLink,
        name: &str,
        player: PlayerId,
        events: EventBus,
    ) -> Result<Self> {
        link.send(ClientPacket::Join {
            version: PROTOCOL_VERSION,
            name: name.to_string(),
            player,
        })?;
        info!(target: "session::follower", link = link.label(), %player, "joining session");

        let verifier = SyncVerifier::new(config.sync.history_len, config.sync.double_word);
        let failures = CommitFailureTracker::new(
            config.sync.max_commit_failures,
            config.sync.commit_failure_window,
        );
        Ok(Self {
            config,
            registry,
            link,
            state: GameState::default(),
            ctx: ExecutionContext::new(),
            peer: None,
            player,
            frame: 0,
            frame_max: 0,
            frame_server: 0,
            queue: CommandQueue::new(),
            verifier,
            failures,
            callbacks: PendingCallbacks::new(),
            last_ack: None,
            last_heard: Instant::now(),
            roster: BTreeMap::new(),
            status: FollowerStatus::Joining,
            refused: None,
            desync: None,
            events,
        })
    }

    pub fn status(&self) -> FollowerStatus {
        self.status
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn frame_max(&self) -> u32 {
        self.frame_max
    }

    /// Latest frame the authority reported.
    pub fn frame_server(&self) -> u32 {
        self.frame_server
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.state.fingerprint()
    }

    /// Id assigned by the authority, once welcomed.
    pub fn peer(&self) -> Option<PeerId> {
        self.peer
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Other followers known to be in the session.
    pub fn roster(&self) -> impl Iterator<Item = (PeerId, &str, PlayerId)> {
        self.roster
            .iter()
            .map(|(peer, (name, player))| (*peer, name.as_str(), *player))
    }

    /// Commands waiting for their frame.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Dispatches a command on behalf of this follower's player.
    ///
    /// Accepted commands are sent to the authority; the callback, if any,
    /// fires when the command comes back and is applied here.
    pub fn dispatch(
        &mut self,
        mut command: Command,
        callback: Option<CommandCallback>,
    ) -> Result<DispatchOutcome> {
        if !self.status.is_joined() {
            if let Some(callback) = callback {
                callback(command.report(false));
            }
            return Err(if self.status.is_terminal() {
                SessionError::Closed
            } else {
                SessionError::NotJoined
            });
        }
        command.player = self.player;

        let mut sink = FollowerSink {
            link: &mut self.link,
            callbacks: &mut self.callbacks,
            failure: None,
        };
        let summary = command.clone();
        let outcome = Dispatcher::networked(
            &mut self.state,
            &self.registry,
            &mut self.ctx,
            SessionRole::Follower,
            &mut sink,
        )
        .dispatch(command, callback);

        if let Some(error) = sink.failure {
            self.lose_connection();
            return Err(error.into());
        }
        let origin = self.peer.unwrap_or(PeerId::AUTHORITY);
        apply::publish_dispatch(&self.events, origin, self.frame, summary, &outcome);
        Ok(outcome)
    }

    /// Polls the link and advances as far as the authority allows.
    ///
    /// Returns the status after the update. The update that ends the
    /// session returns the reason as an error; later calls return the
    /// terminal status.
    pub fn update(&mut self) -> Result<FollowerStatus> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }
        self.poll()?;
        if self.status.is_terminal() || self.status == FollowerStatus::Joining {
            return Ok(self.status);
        }
        self.advance()?;
        Ok(self.status)
    }

    /// Tells the authority this follower is leaving.
    pub fn leave(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        let _ = self.link.send(ClientPacket::Quit);
        self.link.close();
        self.callbacks.fail_all();
        self.set_status(FollowerStatus::Closed);
        info!(target: "session::follower", frame = self.frame, "left session");
    }

    // ========================================================================
    // Network poll
    // ========================================================================

    fn poll(&mut self) -> Result<()> {
        loop {
            match self.link.try_recv() {
                Ok(Some(packet)) => {
                    self.last_heard = Instant::now();
                    if let Err(error) = self.handle_packet(packet) {
                        return Err(self.violation(error));
                    }
                    if self.status.is_terminal() {
                        return self.terminal_result();
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    warn!(target: "session::follower", %error, frame = self.frame, "connection lost");
                    self.lose_connection();
                    return Err(match error {
                        LinkError::Closed => SessionError::ConnectionLost,
                        other => other.into(),
                    });
                }
            }
        }

        let silent = self.last_heard.elapsed();
        if silent > self.config.net.connection_timeout {
            warn!(target: "session::follower", ?silent, frame = self.frame, "authority timed out");
            self.lose_connection();
            return Err(SessionError::Timeout(silent));
        }
        Ok(())
    }

    fn terminal_result(&self) -> Result<()> {
        match self.status {
            FollowerStatus::Closed => Ok(()),
            FollowerStatus::Desynced => Err(self.desync_error()),
            _ => Err(self
                .refused
                .map_or(SessionError::ConnectionLost, SessionError::Refused)),
        }
    }

    fn handle_packet(&mut self, packet: ServerPacket) -> std::result::Result<(), ProtocolError> {
        let joining = self.status == FollowerStatus::Joining;
        match packet {
            ServerPacket::Welcome(welcome) => {
                if !joining {
                    return Err(ProtocolError::Unexpected("welcome"));
                }
                self.welcome(*welcome)
            }
            ServerPacket::Error { code } => {
                error!(target: "session::follower", %code, frame = self.frame, "disconnected by authority");
                self.refused = Some(code);
                self.lose_connection();
                Ok(())
            }
            ServerPacket::Shutdown => {
                info!(target: "session::follower", frame = self.frame, "authority shut down");
                self.link.close();
                self.callbacks.fail_all();
                self.set_status(FollowerStatus::Closed);
                Ok(())
            }
            packet if joining => Err(ProtocolError::Unexpected(packet.kind())),
            ServerPacket::Frame { frame, frame_max } => {
                self.frame_server = self.frame_server.max(frame);
                self.frame_max = self.frame_max.max(frame_max);
                Ok(())
            }
            ServerPacket::Sync { frame, fingerprint } => {
                if let Some(verification) = self.verifier.checkpoint(frame, fingerprint) {
                    self.on_verification(verification);
                }
                Ok(())
            }
            ServerPacket::Command(framed) => self.receive_command(framed),
            ServerPacket::PeerJoined { peer, name, player } => {
                debug!(target: "session::follower", %peer, %name, %player, "peer joined");
                self.roster.insert(peer, (name.clone(), player));
                self.events
                    .publish(SessionEvent::PeerJoined { peer, name, player });
                Ok(())
            }
            ServerPacket::PeerLeft { peer, code } => {
                debug!(target: "session::follower", %peer, ?code, "peer left");
                self.roster.remove(&peer);
                self.events.publish(SessionEvent::PeerLeft { peer, code });
                Ok(())
            }
        }
    }

    fn welcome(&mut self, welcome: Welcome) -> std::result::Result<(), ProtocolError> {
        self.peer = Some(welcome.peer);
        self.player = welcome.player;
        self.frame = welcome.frame;
        self.frame_max = welcome.frame_max.max(welcome.frame);
        self.frame_server = welcome.frame;
        self.state = welcome.state;
        self.verifier.record(self.frame, self.state.fingerprint());
        for framed in welcome.pending {
            self.receive_command(framed)?;
        }

        info!(
            target: "session::follower",
            peer = %welcome.peer,
            player = %welcome.player,
            frame = self.frame,
            frame_max = self.frame_max,
            "welcomed"
        );
        self.set_status(FollowerStatus::Running);
        Ok(())
    }

    fn receive_command(&mut self, framed: FramedCommand) -> std::result::Result<(), ProtocolError> {
        if framed.frame <= self.frame {
            return Err(ProtocolError::FrameRegression {
                target: framed.frame,
                frame: self.frame,
            });
        }
        if !self.registry.contains(framed.command.id) {
            return Err(ProtocolError::UnknownCommand(framed.command.id));
        }
        self.queue.push(framed);
        Ok(())
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    fn advance(&mut self) -> Result<()> {
        if self.frame >= self.frame_max {
            self.set_status(FollowerStatus::Stalled);
            return Ok(());
        }

        let behind = self.frame_server.saturating_sub(self.frame);
        let budget = if behind > 1 {
            self.set_status(FollowerStatus::CatchingUp);
            behind.min(self.frame_max - self.frame)
        } else {
            self.set_status(FollowerStatus::Running);
            1
        };

        for _ in 0..budget {
            self.tick()?;
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        self.frame += 1;
        for framed in self.queue.drain_due(self.frame) {
            let token = (Some(framed.origin) == self.peer)
                .then_some(framed.callback)
                .flatten();
            let applied = apply::apply(
                &mut self.state,
                &self.registry,
                &mut self.ctx,
                &self.events,
                &framed,
            );
            if let Some(token) = token {
                self.callbacks.complete(token, applied.is_success());
            }
            if applied == Applied::Failed && self.failures.record(self.frame) {
                return Err(self.too_many_failures());
            }
        }
        self.state.step();

        let fingerprint = self.state.fingerprint();
        for verification in self.verifier.record(self.frame, fingerprint) {
            self.on_verification(verification);
            if self.status == FollowerStatus::Desynced {
                return Err(self.desync_error());
            }
        }

        if let Some(last) = self.last_ack
            && self.frame >= last.saturating_add(self.config.lag.ack_interval)
        {
            self.send_ack()?;
        }
        Ok(())
    }

    fn on_verification(&mut self, verification: Verification) {
        match verification {
            Verification::Verified { frame } => {
                debug!(target: "sync", frame, "checkpoint verified");
                self.events.publish(SyncEvent::Verified { frame });
                if self.last_ack.is_none() {
                    // First verified checkpoint: the authority can mark us active.
                    // On failure the next verified checkpoint tries again.
                    if let Err(error) = self.send_ack() {
                        warn!(target: "session::follower", %error, frame, "failed to send first ack");
                    }
                }
            }
            Verification::Missed { frame } => {
                warn!(target: "sync", frame, current = self.frame, "checkpoint older than history");
                self.events.publish(SyncEvent::Missed { frame });
            }
            Verification::Mismatch {
                frame,
                local,
                expected,
            } => {
                error!(
                    target: "sync",
                    frame,
                    local = %local,
                    expected = %expected,
                    peer = ?self.peer,
                    state = %state_digest(&self.state),
                    "desync detected"
                );
                self.events.publish(SyncEvent::Desync {
                    frame,
                    local,
                    expected,
                    peer: self.peer,
                });
                self.desync = Some((frame, local, expected));
                self.abort(ErrorCode::Desync, FollowerStatus::Desynced);
            }
        }
    }

    fn send_ack(&mut self) -> Result<()> {
        self.link.send(ClientPacket::Ack { frame: self.frame })?;
        self.last_ack = Some(self.frame);
        Ok(())
    }

    // ========================================================================
    // Termination
    // ========================================================================

    fn too_many_failures(&mut self) -> SessionError {
        let count = self.failures.recent();
        let window = self.failures.window();
        error!(
            target: "sync",
            frame = self.frame,
            failures = count,
            window,
            peer = ?self.peer,
            state = %state_digest(&self.state),
            "commit failures exceed tolerance, treating as desync"
        );
        self.abort(ErrorCode::Desync, FollowerStatus::Desynced);
        SessionError::CommitFailures { count, window }
    }

    fn violation(&mut self, error: ProtocolError) -> SessionError {
        warn!(target: "session::follower", %error, frame = self.frame, "protocol violation by authority");
        self.abort(error.code(), FollowerStatus::ConnectionLost);
        SessionError::Protocol {
            peer: PeerId::AUTHORITY,
            error,
        }
    }

    fn desync_error(&self) -> SessionError {
        match self.desync {
            Some((frame, local, expected)) => SessionError::Desync {
                frame,
                local,
                expected,
            },
            None => SessionError::ConnectionLost,
        }
    }

    /// Reports `code` to the authority and ends the session.
    fn abort(&mut self, code: ErrorCode, status: FollowerStatus) {
        let _ = self.link.send(ClientPacket::Error { code });
        self.link.close();
        self.callbacks.fail_all();
        self.set_status(status);
    }

    fn lose_connection(&mut self) {
        self.link.close();
        self.callbacks.fail_all();
        self.set_status(FollowerStatus::ConnectionLost);
    }

    fn set_status(&mut self, status: FollowerStatus) {
        if self.status == status {
            return;
        }
        debug!(target: "session::follower", from = %self.status, to = %status, frame = self.frame, "status changed");
        self.status = status;
        self.events.publish(SessionEvent::StatusChanged {
            status,
            frame: self.frame,
        });
    }
}

impl Drop for FollowerSession {
    fn drop(&mut self) {
        self.leave();
    }
}

/// Replication sink for commands dispatched on a follower.
struct FollowerSink<'a> {
    link: &'a mut ClientLink,
    callbacks: &'a mut PendingCallbacks,
    failure: Option<LinkError>,
}

impl CommandSink for FollowerSink<'_> {
    fn submit(&mut self, command: Command, callback: Option<CommandCallback>) {
        let token = callback.map(|callback| self.callbacks.insert(&command, callback));
        debug!(target: "command", command = %command.id, "command sent to authority");
        if let Err(error) = self.link.send(ClientPacket::Command(CommandPacket {
            command,
            callback: token,
        })) {
            if let Some(token) = token {
                self.callbacks.complete(token, false);
            }
            self.failure = Some(error);
        }
    }
}
