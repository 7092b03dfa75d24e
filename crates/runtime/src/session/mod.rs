//! Lockstep sessions: the network command queue and the synchronization
//! engine.
//!
//! [`AuthoritySession`] owns the frame clock and the command order;
//! [`FollowerSession`] replays the authority's command stream and verifies
//! checkpoints. Both are plain synchronous state machines advanced by one
//! `update()` call per tick, so tests can drive them frame by frame; the
//! [`crate::runtime`] module runs them on a tokio interval.
mod apply;
mod authority;
mod callbacks;
mod follower;
mod peer;
mod queue;
mod sync;

pub use authority::AuthoritySession;
pub use callbacks::PendingCallbacks;
pub use follower::{FollowerSession, FollowerStatus};
pub use peer::{LagVerdict, Peer, PeerStatus};
pub use queue::CommandQueue;
pub use sync::{CommitFailureTracker, SyncVerifier, Verification};

use serde::{Deserialize, Serialize};

use game_core::{
    Command, CommandCallback, DispatchOutcome, Fingerprint, GameState, SessionRole,
};

use crate::api::Result;

/// Point-in-time summary of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub frame: u32,
    pub frame_max: u32,
    pub fingerprint: Fingerprint,
    /// `None` on the authority.
    pub follower: Option<FollowerStatus>,
    /// Connected followers (authority) or known other peers (follower).
    pub peers: usize,
}

/// Surface the session worker drives.
pub trait Session: Send {
    fn role(&self) -> SessionRole;

    /// Advances one tick.
    fn update(&mut self) -> Result<()>;

    fn dispatch(
        &mut self,
        command: Command,
        callback: Option<CommandCallback>,
    ) -> Result<DispatchOutcome>;

    fn state(&self) -> &GameState;

    fn info(&self) -> SessionInfo;

    /// Whether the session reached a terminal state.
    fn is_finished(&self) -> bool;

    fn shutdown(&mut self);
}

impl Session for AuthoritySession {
    fn role(&self) -> SessionRole {
        SessionRole::Authority
    }

    fn update(&mut self) -> Result<()> {
        AuthoritySession::update(self)
    }

    fn dispatch(
        &mut self,
        command: Command,
        callback: Option<CommandCallback>,
    ) -> Result<DispatchOutcome> {
        AuthoritySession::dispatch(self, command, callback)
    }

    fn state(&self) -> &GameState {
        AuthoritySession::state(self)
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            frame: self.frame(),
            frame_max: self.frame_max(),
            fingerprint: self.fingerprint(),
            follower: None,
            peers: self.peer_count(),
        }
    }

    fn is_finished(&self) -> bool {
        self.is_closed()
    }

    fn shutdown(&mut self) {
        AuthoritySession::shutdown(self);
    }
}

impl Session for FollowerSession {
    fn role(&self) -> SessionRole {
        SessionRole::Follower
    }

    fn update(&mut self) -> Result<()> {
        FollowerSession::update(self).map(|_| ())
    }

    fn dispatch(
        &mut self,
        command: Command,
        callback: Option<CommandCallback>,
    ) -> Result<DispatchOutcome> {
        FollowerSession::dispatch(self, command, callback)
    }

    fn state(&self) -> &GameState {
        FollowerSession::state(self)
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            frame: self.frame(),
            frame_max: self.frame_max(),
            fingerprint: self.fingerprint(),
            follower: Some(self.status()),
            peers: self.roster().count(),
        }
    }

    fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    fn shutdown(&mut self) {
        self.leave();
    }
}
