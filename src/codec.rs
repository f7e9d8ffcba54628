//! Wire codec
//!
//! Encodes packets into `[length][type][body]` frames and reads them back
//! from an async byte stream. Stateless; callers own the stream.

use std::io::{self, ErrorKind};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;
use crate::message::{Packet, PacketType};

/// Header size: body length (u32) + type (u32)
pub const HEADER_LEN: usize = 8;

/// Largest body `read_packet` will allocate for (1 MiB)
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Largest body the server accepts from a client (64 KiB)
///
/// Server-built frames embed at most two client-supplied strings (name and
/// message) plus fixed text, so they always stay within `MAX_FRAME_SIZE`.
pub const MAX_INBOUND_SIZE: u32 = 64 * 1024;

/// Fixed text the server wraps around client-supplied strings
const NOTICE_OVERHEAD: u32 = 128;

const _: () = assert!(2 * MAX_INBOUND_SIZE + NOTICE_OVERHEAD <= MAX_FRAME_SIZE);

/// Encode a packet of the given type with `text` as its UTF-8 body
///
/// Only the u32 length field bounds the body here; receivers enforce
/// `MAX_FRAME_SIZE`.
pub fn encode(kind: PacketType, text: &str) -> Result<Vec<u8>, FrameError> {
    encode_raw(kind.code(), text.as_bytes())
}

/// Encode a frame with an arbitrary type code
pub fn encode_raw(kind: u32, body: &[u8]) -> Result<Vec<u8>, FrameError> {
    let length = body_length(body.len())?;

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(&kind.to_be_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Header length field for a body of `len` bytes
fn body_length(len: usize) -> Result<u32, FrameError> {
    u32::try_from(len).map_err(|_| FrameError::BodyTooLong { length: len })
}

/// Read exactly one packet from `reader`, allowing bodies up to `MAX_FRAME_SIZE`
///
/// End-of-input while reading the length field is a clean
/// `ConnectionClosed`; end-of-input anywhere later is `TruncatedPacket`.
/// The type code is not validated.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, FrameError>
where
    R: AsyncRead + Unpin,
{
    read_packet_with_limit(reader, MAX_FRAME_SIZE).await
}

/// Read exactly one packet, rejecting bodies longer than `max` bytes
pub async fn read_packet_with_limit<R>(reader: &mut R, max: u32) -> Result<Packet, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut word = [0u8; 4];

    reader.read_exact(&mut word).await.map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => FrameError::ConnectionClosed,
        _ => FrameError::Io(e),
    })?;
    let length = u32::from_be_bytes(word);

    read_exact_or_truncated(reader, &mut word).await?;
    let kind = u32::from_be_bytes(word);

    if length > max {
        return Err(FrameError::FrameTooLarge { length, max });
    }

    let mut body = vec![0u8; length as usize];
    read_exact_or_truncated(reader, &mut body).await?;

    Ok(Packet::new(kind, body))
}

/// Encode and write one packet, flushing afterwards
pub async fn write_packet<W>(writer: &mut W, kind: PacketType, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(kind, text).map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    writer.write_all(&frame).await?;
    writer.flush().await
}

async fn read_exact_or_truncated<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(FrameError::TruncatedPacket),
        Err(e) => Err(FrameError::Io(e)),
    }
}
