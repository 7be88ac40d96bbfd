//! Length-prefixed frame codec.
//!
//! Every wire message travels as `[4 bytes big-endian u32 length][payload]`.
//! The payload length must lie in `(0, MAX_PACKET_SIZE]`; zero-length and
//! oversize frames are fatal to the connection in both directions.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum framed payload size in bytes (64 KiB).
pub const MAX_PACKET_SIZE: usize = 65_536;

/// Errors raised by the frame codec.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended cleanly before any byte of a new frame arrived.
    #[error("end of stream")]
    Eof,
    /// The length prefix announced a zero-length payload.
    #[error("zero-length frame")]
    Empty,
    /// The announced payload exceeds [`MAX_PACKET_SIZE`].
    #[error("frame too large: {actual} > {max}")]
    Oversize {
        /// Maximum allowed payload size.
        max: usize,
        /// Announced payload size.
        actual: usize,
    },
    /// The stream ended in the middle of a frame.
    #[error("truncated frame")]
    Truncated,
    /// Underlying transport failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one frame and returns its payload.
///
/// Partial reads are retried until the frame is complete or the stream
/// ends. A clean end of stream before the first prefix byte is reported
/// as [`FrameError::Eof`] so callers can distinguish a peer hanging up
/// between frames from a connection dying mid-frame.
///
/// # Errors
///
/// Returns [`FrameError`] on end of stream, a zero-length or oversize
/// announcement, a frame cut short, or transport failure.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            return Err(if filled == 0 {
                FrameError::Eof
            } else {
                FrameError::Truncated
            });
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if len > MAX_PACKET_SIZE {
        return Err(FrameError::Oversize {
            max: MAX_PACKET_SIZE,
            actual: len,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(e)
        }
    })?;
    Ok(payload)
}

/// Writes `payload` as one frame: length prefix and payload submitted as a
/// single write so frames cannot interleave as long as callers serialize
/// access to `writer` (on a shared TCP connection, a per-connection mutex).
///
/// # Errors
///
/// Returns [`FrameError::Oversize`] if the payload exceeds
/// [`MAX_PACKET_SIZE`], or [`FrameError::Io`] on transport failure.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_PACKET_SIZE {
        return Err(FrameError::Oversize {
            max: MAX_PACKET_SIZE,
            actual: payload.len(),
        });
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
