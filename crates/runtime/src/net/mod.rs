//! Peer links.
//!
//! A [`Link`] is a non-blocking, ordered, bidirectional packet pipe. The
//! session layer only ever calls [`Link::send`] and [`Link::try_recv`];
//! socket I/O happens in background tasks that bridge the stream to
//! channels, so polling a link never blocks a tick.
mod address;
pub mod memory;
pub mod tcp;

pub use address::{AddressError, ConnectionString, DEFAULT_PORT};

use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::protocol::{ClientPacket, CodecError, ServerPacket, codec};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link closed")]
    Closed,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Authority-side end of a link.
pub type ServerLink = Link<ServerPacket, ClientPacket>;
/// Follower-side end of a link.
pub type ClientLink = Link<ClientPacket, ServerPacket>;

/// First failure observed by a background I/O task.
pub(crate) type FailureSlot = Arc<Mutex<Option<CodecError>>>;

enum Outbound<Out> {
    /// Packets handed over as values (in-process links).
    Direct(mpsc::UnboundedSender<Out>),
    /// Packets encoded here and written by a background task.
    Encoded {
        tx: mpsc::UnboundedSender<Vec<u8>>,
        max_packet_size: usize,
    },
}

pub struct Link<Out, In> {
    outbound: Option<Outbound<Out>>,
    inbound: mpsc::UnboundedReceiver<In>,
    failure: FailureSlot,
    label: String,
}

impl<Out: Serialize, In> Link<Out, In> {
    pub(crate) fn new_direct(
        outbound: mpsc::UnboundedSender<Out>,
        inbound: mpsc::UnboundedReceiver<In>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            outbound: Some(Outbound::Direct(outbound)),
            inbound,
            failure: FailureSlot::default(),
            label: label.into(),
        }
    }

    pub(crate) fn new_encoded(
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        inbound: mpsc::UnboundedReceiver<In>,
        failure: FailureSlot,
        max_packet_size: usize,
        label: impl Into<String>,
    ) -> Self {
        Self {
            outbound: Some(Outbound::Encoded {
                tx: outbound,
                max_packet_size,
            }),
            inbound,
            failure,
            label: label.into(),
        }
    }

    /// Queues a packet for delivery. Never blocks.
    pub fn send(&mut self, packet: Out) -> Result<(), LinkError> {
        match self.outbound.as_ref() {
            None => Err(LinkError::Closed),
            Some(Outbound::Direct(tx)) => tx.send(packet).map_err(|_| LinkError::Closed),
            Some(Outbound::Encoded {
                tx,
                max_packet_size,
            }) => {
                let frame = codec::encode(&packet, *max_packet_size)?;
                tx.send(frame).map_err(|_| LinkError::Closed)
            }
        }
    }

    /// Returns the next received packet, `Ok(None)` when nothing is waiting.
    pub fn try_recv(&mut self) -> Result<Option<In>, LinkError> {
        match self.inbound.try_recv() {
            Ok(packet) => Ok(Some(packet)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.take_failure()),
        }
    }

    /// Stops sending. Packets already queued are still flushed by the
    /// writer before the stream is shut down.
    pub fn close(&mut self) {
        self.outbound = None;
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_none()
    }

    /// Remote address or a descriptive name, for logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn take_failure(&self) -> LinkError {
        let failure = match self.failure.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        failure.map_or(LinkError::Closed, LinkError::Codec)
    }
}
