//! Event types for different topics.

use game_core::{Command, ExecutionPhase, Fingerprint, Money, PlayerId};
use serde::{Deserialize, Serialize};

use crate::protocol::{ErrorCode, PeerId};
use crate::session::FollowerStatus;

/// Outcome of dispatching or applying a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandEvent {
    /// Accepted locally and handed to the network for `frame`.
    Queued { command: Command, frame: Option<u32> },

    /// Committed at `frame`.
    Applied {
        command: Command,
        origin: PeerId,
        frame: u32,
        cost: Money,
    },

    /// Passed its trial when submitted but failed when applied.
    Failed {
        command: Command,
        origin: PeerId,
        frame: u32,
        phase: ExecutionPhase,
        error: String,
    },

    /// Refused by local dispatch; nothing was sent or committed.
    Rejected {
        command: Command,
        phase: ExecutionPhase,
        error: String,
    },

    /// Cost preview.
    Estimated {
        command: Command,
        cost: Option<Money>,
        error: Option<String>,
    },
}

/// Checkpoint verification results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
    /// Authority published a checkpoint.
    Checkpoint { frame: u32, fingerprint: Fingerprint },
    Verified { frame: u32 },
    Desync {
        frame: u32,
        local: Fingerprint,
        expected: Fingerprint,
        peer: Option<PeerId>,
    },
    Missed { frame: u32 },
}

/// Membership and connection changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    PeerJoined {
        peer: PeerId,
        name: String,
        player: PlayerId,
    },
    PeerActive { peer: PeerId },
    PeerLagging { peer: PeerId, lag: u32, last_frame: u32 },
    PeerLeft {
        peer: PeerId,
        code: Option<ErrorCode>,
    },
    StatusChanged { status: FollowerStatus, frame: u32 },
}
