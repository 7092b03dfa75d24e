//! Unified error type surfaced by sessions and the runtime API.
//!
//! Desync, protocol violations and lost connections are distinct variants
//! so callers can tell a logic bug from a network drop.
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use game_core::Fingerprint;

use crate::config::ConfigError;
use crate::net::{AddressError, LinkError};
use crate::protocol::{ErrorCode, PeerId, ProtocolError};

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("protocol violation by {peer}: {error}")]
    Protocol {
        peer: PeerId,
        #[source]
        error: ProtocolError,
    },

    #[error("desync at frame {frame}: local {local}, expected {expected}")]
    Desync {
        frame: u32,
        local: Fingerprint,
        expected: Fingerprint,
    },

    #[error("{count} commands failed at commit within {window} frames")]
    CommitFailures { count: usize, window: u32 },

    #[error("connection to the authority lost")]
    ConnectionLost,

    #[error("nothing heard from the authority for {0:?}")]
    Timeout(Duration),

    #[error("disconnected by the authority: {0}")]
    Refused(ErrorCode),

    #[error("session has not been joined yet")]
    NotJoined,

    #[error("session is closed")]
    Closed,

    #[error("session worker command channel closed")]
    CommandChannelClosed,

    #[error("session worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("session worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),
}
