//! Authority side of a session.
//!
//! The authority owns the frame clock. Each [`AuthoritySession::update`]
//! polls links, advances one frame, applies the commands stamped for it and
//! then serves followers: lag checks, command flush, frame allowance and
//! periodic checkpoints, in that order.
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use game_core::{
    Command, CommandCallback, CommandFlags, CommandRegistry, CommandSink, DispatchOutcome,
    Dispatcher, ExecutionContext, Fingerprint, GameState, PlayerId, SessionRole,
};

use crate::api::{Result, SessionError};
use crate::config::RuntimeConfig;
use crate::events::{EventBus, SessionEvent, SyncEvent};
use crate::net::{ServerLink, tcp::Acceptor};
use crate::protocol::{
    ClientPacket, CommandPacket, ErrorCode, FramedCommand, PeerId, PROTOCOL_VERSION,
    ProtocolError, ServerPacket, Welcome,
};

use super::apply::{self, Applied};
use super::callbacks::PendingCallbacks;
use super::peer::{LagVerdict, Peer, PeerStatus};
use super::queue::CommandQueue;
use super::sync::CommitFailureTracker;

pub struct AuthoritySession {
    config: RuntimeConfig,
    registry: Arc<CommandRegistry>,
    state: GameState,
    ctx: ExecutionContext,
    player: PlayerId,
    frame: u32,
    frame_max: u32,
    queue: CommandQueue,
    peers: BTreeMap<PeerId, Peer>,
    next_peer: u16,
    callbacks: PendingCallbacks,
    failures: CommitFailureTracker,
    acceptor: Option<Acceptor>,
    events: EventBus,
    closed: bool,
}

impl AuthoritySession {
    pub fn new(
        config: RuntimeConfig,
        registry: Arc<CommandRegistry>,
        state: GameState,
        player: PlayerId,
        events: EventBus,
    ) -> Self {
        let failures = CommitFailureTracker::new(
            config.sync.max_commit_failures,
            config.sync.commit_failure_window,
        );
        Self {
            config,
            registry,
            state,
            ctx: ExecutionContext::new(),
            player,
            frame: 0,
            frame_max: 0,
            queue: CommandQueue::new(),
            peers: BTreeMap::new(),
            next_peer: 1,
            callbacks: PendingCallbacks::new(),
            failures,
            acceptor: None,
            events,
            closed: false,
        }
    }

    /// Accepts TCP followers from `acceptor` on every update.
    pub fn with_acceptor(mut self, acceptor: Acceptor) -> Self {
        self.acceptor = Some(acceptor);
        self
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Highest frame followers are currently allowed to reach.
    pub fn frame_max(&self) -> u32 {
        self.frame_max
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.state.fingerprint()
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peer_status(&self, peer: PeerId) -> Option<PeerStatus> {
        self.peers.get(&peer).map(|peer| peer.status)
    }

    /// No listener and no connected peers: nothing to replicate to.
    pub fn is_standalone(&self) -> bool {
        self.acceptor.is_none() && self.peers.is_empty()
    }

    /// Commands waiting for their frame on the authority itself.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Frame a command submitted now is applied at.
    ///
    /// Never at or below the current allowance, so no follower can have
    /// passed it yet.
    pub fn target_frame(&self) -> u32 {
        self.frame
            .saturating_add(self.config.sync.command_delay)
            .max(self.frame_max.saturating_add(1))
    }

    /// Registers a new follower connection. A full session answers with
    /// `ServerFull` and closes the link.
    pub fn accept(&mut self, mut link: ServerLink) -> Option<PeerId> {
        if self.closed || self.peers.len() >= self.config.net.max_peers {
            warn!(
                target: "session::authority",
                link = link.label(),
                peers = self.peers.len(),
                "rejecting connection, session full"
            );
            let _ = link.send(ServerPacket::Error {
                code: ErrorCode::ServerFull,
            });
            link.close();
            return None;
        }

        let id = PeerId(self.next_peer);
        self.next_peer = self.next_peer.wrapping_add(1).max(1);
        debug!(target: "session::authority", peer = %id, link = link.label(), "connection accepted");
        self.peers.insert(id, Peer::new(id, link, self.frame));
        Some(id)
    }

    /// Dispatches a command issued on the authority.
    ///
    /// Accepted commands are stamped with [`Self::target_frame`], queued
    /// locally and buffered for every joined follower. A standalone
    /// session commits them on the spot instead.
    pub fn dispatch(
        &mut self,
        mut command: Command,
        callback: Option<CommandCallback>,
    ) -> Result<DispatchOutcome> {
        if self.closed {
            if let Some(callback) = callback {
                callback(command.report(false));
            }
            return Err(SessionError::Closed);
        }
        if !command.player.is_world() {
            command.player = self.player;
        }

        if self.is_standalone() {
            let summary = command.clone();
            let outcome = Dispatcher::offline(&mut self.state, &self.registry, &mut self.ctx)
                .dispatch(command, callback);
            apply::publish_dispatch(&self.events, PeerId::AUTHORITY, self.frame, summary, &outcome);
            return Ok(outcome);
        }

        let target = self.target_frame();
        let mut sink = AuthoritySink {
            frame: target,
            queue: &mut self.queue,
            peers: &mut self.peers,
            callbacks: &mut self.callbacks,
        };
        let summary = command.clone();
        let outcome = Dispatcher::networked(
            &mut self.state,
            &self.registry,
            &mut self.ctx,
            SessionRole::Authority,
            &mut sink,
        )
        .dispatch(command, callback);

        let frame = if matches!(outcome, DispatchOutcome::Queued) {
            target
        } else {
            self.frame
        };
        apply::publish_dispatch(&self.events, PeerId::AUTHORITY, frame, summary, &outcome);
        Ok(outcome)
    }

    /// Runs one frame: network poll, tick, follower service.
    pub fn update(&mut self) -> Result<()> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.poll_acceptor();
        self.poll_peers();
        self.tick();
        self.serve_peers();
        Ok(())
    }

    /// Notifies followers and closes every link. Pending callbacks fail.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        info!(target: "session::authority", frame = self.frame, peers = self.peers.len(), "shutting down");
        for (_, mut peer) in std::mem::take(&mut self.peers) {
            let _ = peer.link.send(ServerPacket::Shutdown);
            peer.link.close();
        }
        self.callbacks.fail_all();
        self.acceptor = None;
        self.closed = true;
    }

    // ========================================================================
    // Network poll
    // ========================================================================

    fn poll_acceptor(&mut self) {
        let mut accepted = Vec::new();
        if let Some(acceptor) = self.acceptor.as_mut() {
            while let Some(link) = acceptor.try_accept() {
                accepted.push(link);
            }
        }
        for link in accepted {
            self.accept(link);
        }
    }

    fn poll_peers(&mut self) {
        let ids: Vec<PeerId> = self.peers.keys().copied().collect();
        for id in ids {
            loop {
                let received = match self.peers.get_mut(&id) {
                    Some(peer) => peer.link.try_recv(),
                    None => break,
                };
                match received {
                    Ok(Some(packet)) => {
                        if let Err(error) = self.handle_packet(id, packet) {
                            warn!(
                                target: "session::authority",
                                peer = %id,
                                %error,
                                "protocol violation, disconnecting"
                            );
                            self.drop_peer(id, Some(error.code()), true);
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        info!(target: "session::authority", peer = %id, %error, "connection closed");
                        self.drop_peer(id, None, false);
                        break;
                    }
                }
            }
        }
    }

    fn handle_packet(
        &mut self,
        id: PeerId,
        packet: ClientPacket,
    ) -> std::result::Result<(), ProtocolError> {
        let Some(peer) = self.peers.get(&id) else {
            return Ok(());
        };
        let status = peer.status;
        match packet {
            ClientPacket::Join {
                version,
                name,
                player,
            } => {
                if status != PeerStatus::Connected {
                    return Err(ProtocolError::Unexpected("join"));
                }
                if version != PROTOCOL_VERSION {
                    return Err(ProtocolError::WrongVersion {
                        ours: PROTOCOL_VERSION,
                        theirs: version,
                    });
                }
                let available = player.is_spectator()
                    || self.state.player(player).is_some_and(|state| state.active);
                if !available {
                    return Err(ProtocolError::PlayerUnavailable(player));
                }
                self.welcome(id, name, player);
                Ok(())
            }
            ClientPacket::Command(packet) => {
                if status == PeerStatus::Connected {
                    return Err(ProtocolError::Unexpected("command"));
                }
                self.receive_command(id, packet)
            }
            ClientPacket::Ack { frame } => {
                if status == PeerStatus::Connected {
                    return Err(ProtocolError::Unexpected("ack"));
                }
                if frame > self.frame_max {
                    return Err(ProtocolError::AckBeyondAllowance {
                        acked: frame,
                        frame_max: self.frame_max,
                    });
                }
                self.acknowledge(id, frame);
                Ok(())
            }
            ClientPacket::Error { code } => {
                if code == ErrorCode::Desync {
                    error!(
                        target: "sync",
                        peer = %id,
                        frame = self.frame,
                        fingerprint = %self.state.fingerprint(),
                        "follower reported desync"
                    );
                } else {
                    warn!(target: "session::authority", peer = %id, %code, "follower reported error");
                }
                self.drop_peer(id, Some(code), false);
                Ok(())
            }
            ClientPacket::Quit => {
                info!(target: "session::authority", peer = %id, "follower quit");
                self.drop_peer(id, None, false);
                Ok(())
            }
        }
    }

    fn welcome(&mut self, id: PeerId, name: String, player: PlayerId) {
        let welcome = Welcome {
            peer: id,
            player,
            frame: self.frame,
            frame_max: self.frame_max,
            state: self.state.clone(),
            pending: self
                .queue
                .pending_after(self.frame)
                .map(FramedCommand::without_callback)
                .collect(),
        };
        let roster: Vec<ServerPacket> = self
            .peers
            .values()
            .filter(|other| other.id != id && other.is_joined())
            .map(|other| ServerPacket::PeerJoined {
                peer: other.id,
                name: other.name.clone(),
                player: other.player,
            })
            .collect();

        let frame = self.frame;
        let Some(peer) = self.peers.get_mut(&id) else {
            return;
        };
        peer.status = PeerStatus::PreActive;
        peer.name = name.clone();
        peer.player = player;
        peer.acknowledge(frame, frame);
        let mut sent = peer.link.send(ServerPacket::Welcome(Box::new(welcome)));
        for packet in roster {
            if sent.is_err() {
                break;
            }
            sent = peer.link.send(packet);
        }
        if let Err(error) = sent {
            warn!(target: "session::authority", peer = %id, %error, "failed to send welcome");
            self.drop_peer(id, None, false);
            return;
        }

        info!(target: "session::authority", peer = %id, %name, %player, frame, "follower joined");
        self.broadcast_except(
            id,
            ServerPacket::PeerJoined {
                peer: id,
                name: name.clone(),
                player,
            },
        );
        self.events
            .publish(SessionEvent::PeerJoined { peer: id, name, player });
    }

    fn receive_command(
        &mut self,
        id: PeerId,
        packet: CommandPacket,
    ) -> std::result::Result<(), ProtocolError> {
        let command = packet.command;
        let entry = self
            .registry
            .lookup(command.id)
            .map_err(|_| ProtocolError::UnknownCommand(command.id))?;
        if entry
            .flags
            .intersects(CommandFlags::SERVER | CommandFlags::OFFLINE)
        {
            return Err(ProtocolError::Forbidden(command.id));
        }
        let peer_player = self.peers.get(&id).map_or(PlayerId::SPECTATOR, |peer| peer.player);
        if command.player != peer_player {
            return Err(ProtocolError::PlayerMismatch {
                command: command.player,
                peer: peer_player,
            });
        }

        let framed = FramedCommand {
            frame: self.target_frame(),
            origin: id,
            command,
            callback: packet.callback,
        };
        debug!(
            target: "command",
            peer = %id,
            command = %framed.command.id,
            frame = framed.frame,
            "follower command stamped"
        );
        replicate(&mut self.queue, &mut self.peers, framed);
        Ok(())
    }

    fn acknowledge(&mut self, id: PeerId, acked: u32) {
        let frame = self.frame;
        let ack_interval = self.config.lag.ack_interval;
        let Some(peer) = self.peers.get_mut(&id) else {
            return;
        };
        peer.acknowledge(acked, frame);
        if peer.status == PeerStatus::PreActive && acked.saturating_add(ack_interval) >= frame {
            peer.status = PeerStatus::Active;
            info!(target: "session::authority", peer = %id, frame = acked, "follower active");
            self.events.publish(SessionEvent::PeerActive { peer: id });
        }
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    fn tick(&mut self) {
        self.frame += 1;
        for framed in self.queue.drain_due(self.frame) {
            let token = (framed.origin == PeerId::AUTHORITY)
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
                error!(
                    target: "command",
                    frame = self.frame,
                    failures = self.failures.recent(),
                    window = self.failures.window(),
                    "commit failures exceed tolerance"
                );
            }
        }
        self.state.step();
    }

    // ========================================================================
    // Follower service
    // ========================================================================

    fn serve_peers(&mut self) {
        self.check_lag();
        self.flush_commands();

        if self.frame > self.frame_max {
            self.frame_max = self.frame + self.config.sync.frame_freq;
            self.broadcast(ServerPacket::Frame {
                frame: self.frame,
                frame_max: self.frame_max,
            });
        }

        if self.frame % self.config.sync.sync_interval == 0 {
            let fingerprint = self.state.fingerprint();
            debug!(target: "sync", frame = self.frame, %fingerprint, "checkpoint");
            self.broadcast(ServerPacket::Sync {
                frame: self.frame,
                fingerprint,
            });
            self.events.publish(SyncEvent::Checkpoint {
                frame: self.frame,
                fingerprint,
            });
        }
    }

    fn check_lag(&mut self) {
        let mut dropped = Vec::new();
        for peer in self.peers.values_mut() {
            match peer.check_lag(self.frame, &self.config) {
                LagVerdict::Healthy => {}
                LagVerdict::Lagging(lag) => {
                    warn!(
                        target: "session::authority",
                        peer = %peer.id,
                        lag,
                        last_frame = peer.last_frame,
                        "follower is lagging"
                    );
                    self.events.publish(SessionEvent::PeerLagging {
                        peer: peer.id,
                        lag,
                        last_frame: peer.last_frame,
                    });
                }
                LagVerdict::Drop(lag) => {
                    warn!(
                        target: "session::authority",
                        peer = %peer.id,
                        lag,
                        last_frame = peer.last_frame,
                        status = %peer.status,
                        "dropping follower, lag too high"
                    );
                    dropped.push(peer.id);
                }
            }
        }
        for id in dropped {
            self.drop_peer(id, Some(ErrorCode::Timeout), true);
        }
    }

    fn flush_commands(&mut self) {
        let mut failed = Vec::new();
        for peer in self.peers.values_mut() {
            if let Err(error) = peer.flush() {
                debug!(target: "session::authority", peer = %peer.id, %error, "command flush failed");
                failed.push(peer.id);
            }
        }
        for id in failed {
            self.drop_peer(id, None, false);
        }
    }

    /// Sends `packet` to every joined peer.
    fn broadcast(&mut self, packet: ServerPacket) {
        self.broadcast_except(PeerId::AUTHORITY, packet);
    }

    fn broadcast_except(&mut self, skip: PeerId, packet: ServerPacket) {
        let mut failed = Vec::new();
        for peer in self.peers.values_mut() {
            if peer.id == skip || !peer.is_joined() {
                continue;
            }
            if peer.link.send(packet.clone()).is_err() {
                failed.push(peer.id);
            }
        }
        for id in failed {
            self.drop_peer(id, None, false);
        }
    }

    /// Removes a peer. With `notify`, the peer itself is told `code` before
    /// its link closes; the others always learn it left.
    fn drop_peer(&mut self, id: PeerId, code: Option<ErrorCode>, notify: bool) {
        let Some(mut peer) = self.peers.remove(&id) else {
            return;
        };
        if notify && let Some(code) = code {
            let _ = peer.link.send(ServerPacket::Error { code });
        }
        peer.link.close();

        if peer.is_joined() {
            info!(target: "session::authority", peer = %id, code = ?code, "follower left");
            self.broadcast(ServerPacket::PeerLeft { peer: id, code });
            self.events.publish(SessionEvent::PeerLeft { peer: id, code });
        }
    }
}

impl Drop for AuthoritySession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Replication sink for commands dispatched on the authority.
struct AuthoritySink<'a> {
    frame: u32,
    queue: &'a mut CommandQueue,
    peers: &'a mut BTreeMap<PeerId, Peer>,
    callbacks: &'a mut PendingCallbacks,
}

impl CommandSink for AuthoritySink<'_> {
    fn submit(&mut self, command: Command, callback: Option<CommandCallback>) {
        let callback = callback.map(|callback| self.callbacks.insert(&command, callback));
        debug!(target: "command", command = %command.id, frame = self.frame, "local command stamped");
        replicate(
            self.queue,
            self.peers,
            FramedCommand {
                frame: self.frame,
                origin: PeerId::AUTHORITY,
                command,
                callback,
            },
        );
    }
}

/// Buffers `framed` for every joined peer and queues it locally. Only the
/// originating peer sees the callback token.
fn replicate(queue: &mut CommandQueue, peers: &mut BTreeMap<PeerId, Peer>, framed: FramedCommand) {
    for peer in peers.values_mut().filter(|peer| peer.is_joined()) {
        if peer.id == framed.origin {
            peer.enqueue(framed.clone());
        } else {
            peer.enqueue(framed.without_callback());
        }
    }
    if framed.origin == PeerId::AUTHORITY {
        queue.push(framed);
    } else {
        queue.push(framed.without_callback());
    }
}
