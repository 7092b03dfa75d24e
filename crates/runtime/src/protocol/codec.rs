//! Length-prefixed bincode framing.
//!
//! Format: `[u32 little-endian payload length][bincode payload]`.
//! Payloads larger than the configured maximum are rejected in both
//! directions.
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const HEADER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("packet of {len} bytes exceeds limit of {max}")]
    Oversized { len: usize, max: usize },

    #[error("malformed packet: {0}")]
    Malformed(#[source] bincode::Error),

    #[error("failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Serializes `packet` into a complete frame (header included).
pub fn encode<T: Serialize>(packet: &T, max_len: usize) -> Result<Vec<u8>, CodecError> {
    let payload = bincode::serialize(packet).map_err(CodecError::Encode)?;
    if payload.len() > max_len {
        return Err(CodecError::Oversized {
            len: payload.len(),
            max: max_len,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(payload).map_err(CodecError::Malformed)
}

/// Reads one frame payload. Returns `None` on a clean end of stream at a
/// frame boundary.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > max_len {
        return Err(CodecError::Oversized { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClientPacket, ErrorCode};

    #[test]
    fn frame_header_carries_payload_length() {
        let frame = encode(&ClientPacket::Ack { frame: 7 }, 1024).expect("encode");
        let len = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - HEADER_LEN);

        let packet: ClientPacket = decode(&frame[HEADER_LEN..]).expect("decode");
        assert_eq!(packet, ClientPacket::Ack { frame: 7 });
    }

    #[test]
    fn oversized_packets_are_refused() {
        let packet = ClientPacket::Join {
            version: 1,
            name: "x".repeat(64),
            player: game_core::PlayerId(0),
        };
        assert!(matches!(
            encode(&packet, 16),
            Err(CodecError::Oversized { max: 16, .. })
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let result: Result<ClientPacket, _> = decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }

    #[tokio::test]
    async fn stream_reads_back_frames_in_order() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        for code in [ErrorCode::Desync, ErrorCode::Kicked] {
            let frame = encode(&ClientPacket::Error { code }, 1024).expect("encode");
            write_frame(&mut client, &frame).await.expect("write");
        }
        drop(client);

        let mut seen = Vec::new();
        while let Some(payload) = read_frame(&mut server, 1024).await.expect("read") {
            let packet: ClientPacket = decode(&payload).expect("decode");
            seen.push(packet);
        }
        assert_eq!(
            seen,
            vec![
                ClientPacket::Error {
                    code: ErrorCode::Desync
                },
                ClientPacket::Error {
                    code: ErrorCode::Kicked
                },
            ]
        );
    }
}
