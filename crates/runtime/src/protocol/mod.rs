//! Wire messages exchanged between the authority and its followers.
//!
//! Every message travels as one length-prefixed bincode frame (see
//! [`codec`]). Clients speak [`ClientPacket`], the authority answers with
//! [`ServerPacket`]; one ordered stream per peer carries both directions.
pub mod codec;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use game_core::{Command, CommandId, Fingerprint, GameState, PlayerId};

pub use codec::CodecError;

/// Bumped whenever packets or the command table change incompatibly.
pub const PROTOCOL_VERSION: u16 = 1;

/// Session-local peer identifier assigned by the authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u16);

impl PeerId {
    /// The authority itself.
    pub const AUTHORITY: Self = Self(0);
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Handle for a completion callback kept by the originating instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackToken(pub u32);

/// Reason code attached to errors and departures.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    General,
    Desync,
    NotExpected,
    Kicked,
    PlayerMismatch,
    ServerFull,
    Timeout,
    ProtocolViolation,
    WrongVersion,
}

/// Packet-level rule broken by a peer. Fatal for that connection only.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unexpected {0} packet")]
    Unexpected(&'static str),

    #[error("unknown command {0}")]
    UnknownCommand(CommandId),

    #[error("command {0} may not be issued by a follower")]
    Forbidden(CommandId),

    #[error("command acts for {command} but peer plays {peer}")]
    PlayerMismatch { command: PlayerId, peer: PlayerId },

    #[error("player {0} cannot be joined")]
    PlayerUnavailable(PlayerId),

    #[error("command stamped for frame {target} received at frame {frame}")]
    FrameRegression { target: u32, frame: u32 },

    #[error("ack for frame {acked} beyond allowance {frame_max}")]
    AckBeyondAllowance { acked: u32, frame_max: u32 },

    #[error("protocol version {theirs} does not match {ours}")]
    WrongVersion { ours: u16, theirs: u16 },
}

impl ProtocolError {
    /// Code sent to the peer before disconnecting it.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unexpected(_) => ErrorCode::NotExpected,
            Self::Forbidden(_) => ErrorCode::Kicked,
            Self::PlayerMismatch { .. } | Self::PlayerUnavailable(_) => ErrorCode::PlayerMismatch,
            Self::WrongVersion { .. } => ErrorCode::WrongVersion,
            Self::UnknownCommand(_)
            | Self::FrameRegression { .. }
            | Self::AckBeyondAllowance { .. } => ErrorCode::ProtocolViolation,
        }
    }
}

/// Command as submitted by a follower.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPacket {
    pub command: Command,
    pub callback: Option<CallbackToken>,
}

/// Command stamped with the frame every instance applies it at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramedCommand {
    pub frame: u32,
    pub origin: PeerId,
    pub command: Command,
    /// Present only in the copy delivered to `origin`.
    pub callback: Option<CallbackToken>,
}

impl FramedCommand {
    /// Copy for a peer other than the origin.
    pub fn without_callback(&self) -> Self {
        Self {
            callback: None,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientPacket {
    Join {
        version: u16,
        name: String,
        player: PlayerId,
    },
    Command(CommandPacket),
    /// Frame the follower has simulated up to.
    Ack { frame: u32 },
    /// Fatal condition on the follower; it disconnects after sending this.
    Error { code: ErrorCode },
    Quit,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerPacket {
    Welcome(Box<Welcome>),
    /// Authority's current frame and the highest frame followers may reach.
    Frame { frame: u32, frame_max: u32 },
    Sync {
        frame: u32,
        fingerprint: Fingerprint,
    },
    Command(FramedCommand),
    PeerJoined {
        peer: PeerId,
        name: String,
        player: PlayerId,
    },
    PeerLeft {
        peer: PeerId,
        code: Option<ErrorCode>,
    },
    Error { code: ErrorCode },
    Shutdown,
}

/// Everything a joining follower needs to start simulating.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Welcome {
    pub peer: PeerId,
    pub player: PlayerId,
    pub frame: u32,
    pub frame_max: u32,
    pub state: GameState,
    /// Commands already stamped for frames after `frame`.
    pub pending: Vec<FramedCommand>,
}

impl ClientPacket {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Command(_) => "command",
            Self::Ack { .. } => "ack",
            Self::Error { .. } => "error",
            Self::Quit => "quit",
        }
    }
}

impl ServerPacket {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome(_) => "welcome",
            Self::Frame { .. } => "frame",
            Self::Sync { .. } => "sync",
            Self::Command(_) => "command",
            Self::PeerJoined { .. } => "peer_joined",
            Self::PeerLeft { .. } => "peer_left",
            Self::Error { .. } => "error",
            Self::Shutdown => "shutdown",
        }
    }
}
