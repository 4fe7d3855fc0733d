//! Control-connection framing.
//!
//! Wire format: all multi-byte integers are big-endian.
//! Frame format: len:u32 | type:u8 | payload (bincode)

use crate::error::{Result, SyncError};
use crate::request::{Request, RequestResponse};
use crate::transfer::status::{DestinationTransferStatus, RequestDone, SourceTransferStatus};
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame payload (16MB)
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Frame Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Request = 0x01,
    RequestResponse = 0x02,
    SourceStatus = 0x03,
    DestinationStatus = 0x04,
    RequestDone = 0x05,
}

impl FrameType {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::RequestResponse),
            0x03 => Some(Self::SourceStatus),
            0x04 => Some(Self::DestinationStatus),
            0x05 => Some(Self::RequestDone),
            _ => None,
        }
    }
}

/// A message that travels in exactly one kind of frame.
pub trait Message: Serialize + DeserializeOwned {
    const FRAME: FrameType;
}

impl Message for Request {
    const FRAME: FrameType = FrameType::Request;
}

impl Message for RequestResponse {
    const FRAME: FrameType = FrameType::RequestResponse;
}

impl Message for SourceTransferStatus {
    const FRAME: FrameType = FrameType::SourceStatus;
}

impl Message for DestinationTransferStatus {
    const FRAME: FrameType = FrameType::DestinationStatus;
}

impl Message for RequestDone {
    const FRAME: FrameType = FrameType::RequestDone;
}

// =============================================================================
// Frame I/O
// =============================================================================

pub fn encode<T: Message>(msg: &T) -> Result<Bytes> {
    let payload = bincode::serialize(msg)?;
    if payload.len() > MAX_FRAME_SIZE as usize {
        return Err(SyncError::Protocol(format!(
            "{:?} frame of {} bytes exceeds maximum {}",
            T::FRAME,
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }

    let mut buf = BytesMut::with_capacity(5 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_u8(T::FRAME as u8);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Read a single frame from the stream.
/// Returns (frame_type, payload).
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<(FrameType, Bytes)> {
    let len = r.read_u32().await?;

    // Validate frame size before allocation
    if len > MAX_FRAME_SIZE {
        return Err(SyncError::Protocol(format!(
            "Frame size {} exceeds maximum allowed size {}",
            len, MAX_FRAME_SIZE
        )));
    }

    let frame_type = r.read_u8().await?;
    let frame_type = FrameType::from_u8(frame_type)
        .ok_or_else(|| SyncError::Protocol(format!("Unknown frame type 0x{:02x}", frame_type)))?;

    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).await?;

    Ok((frame_type, Bytes::from(payload)))
}

pub async fn write_message<W, T>(w: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Message,
{
    let frame = encode(msg)?;
    w.write_all(&frame).await?;
    w.flush().await?;
    Ok(())
}

/// Read the next frame and decode it as `T`. Any other frame type is a
/// protocol error.
pub async fn read_message<R, T>(r: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: Message,
{
    let (frame_type, payload) = read_frame(r).await?;
    if frame_type != T::FRAME {
        return Err(SyncError::Protocol(format!(
            "Expected {:?} frame, got {:?}",
            T::FRAME,
            frame_type
        )));
    }
    Ok(bincode::deserialize(&payload)?)
}
