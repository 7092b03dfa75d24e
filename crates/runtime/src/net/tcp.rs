//! TCP transport: socket I/O runs in background tasks bridged to a [`Link`].
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ClientLink, FailureSlot, Link, ServerLink};
use crate::protocol::{CodecError, codec};

/// Bridges an ordered byte stream to a packet link.
///
/// Must be called from within a tokio runtime.
pub fn spawn_link<S, Out, In>(stream: S, label: String, max_packet_size: usize) -> Link<Out, In>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    Out: Serialize,
    In: DeserializeOwned + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let failure = FailureSlot::default();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<In>();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let reader_failure = Arc::clone(&failure);
    let reader_label = label.clone();
    tokio::spawn(async move {
        loop {
            let payload = match codec::read_frame(&mut reader, max_packet_size).await {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(err) => {
                    record_failure(&reader_failure, err);
                    break;
                }
            };
            match codec::decode::<In>(&payload) {
                Ok(packet) => {
                    if inbound_tx.send(packet).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    record_failure(&reader_failure, err);
                    break;
                }
            }
        }
        debug!(target: "net", peer = %reader_label, "reader finished");
    });

    let writer_label = label.clone();
    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(err) = codec::write_frame(&mut writer, &frame).await {
                debug!(target: "net", peer = %writer_label, error = %err, "write failed");
                break;
            }
        }
        let _ = writer.shutdown().await;
        debug!(target: "net", peer = %writer_label, "writer finished");
    });

    Link::new_encoded(outbound_tx, inbound_rx, failure, max_packet_size, label)
}

fn record_failure(slot: &FailureSlot, err: CodecError) {
    let mut slot = match slot.lock() {
        Ok(slot) => slot,
        Err(poisoned) => poisoned.into_inner(),
    };
    slot.get_or_insert(err);
}

/// Connects to an authority.
pub async fn connect<A: ToSocketAddrs>(addr: A, max_packet_size: usize) -> io::Result<ClientLink> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let label = stream.peer_addr()?.to_string();
    Ok(spawn_link(stream, label, max_packet_size))
}

/// Accepts followers in the background; the authority polls it each tick.
pub struct Acceptor {
    local_addr: SocketAddr,
    incoming: mpsc::UnboundedReceiver<ServerLink>,
    task: JoinHandle<()>,
}

impl Acceptor {
    pub async fn bind<A: ToSocketAddrs>(addr: A, max_packet_size: usize) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, incoming) = mpsc::unbounded_channel();
        info!(target: "net", addr = %local_addr, "listening");

        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        if let Err(err) = stream.set_nodelay(true) {
                            warn!(target: "net", %peer, error = %err, "failed to set nodelay");
                        }
                        let link = spawn_link(stream, peer.to_string(), max_packet_size);
                        if tx.send(link).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(target: "net", error = %err, "accept failed"),
                }
            }
        });

        Ok(Self {
            local_addr,
            incoming,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Next accepted connection, if any. Never blocks.
    pub fn try_accept(&mut self) -> Option<ServerLink> {
        self.incoming.try_recv().ok()
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
