//! Message serialization and deserialization using postcard
//!
//! Messages are serialized using postcard (compact binary format) and framed
//! with a length prefix for use over the helper's Unix socket.
//!
//! # Frame Format
//!
//! ```text
//! [Length: u32 (big-endian)][Message bytes (postcard serialized)]
//! ```
//!
//! Requests and replies are tiny, so frames are capped at 4 KiB.

use crate::error::{ProtocolError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};

#[cfg(feature = "async")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum allowed frame payload size
pub const MAX_FRAME_SIZE: usize = 4 * 1024;

/// Encode a message to bytes using postcard
///
/// # Example
/// ```
/// use protocol::{IpcRequest, encode_message};
///
/// let bytes = encode_message(&IpcRequest::enable()).unwrap();
/// assert!(!bytes.is_empty());
/// ```
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(message).map_err(ProtocolError::from)
}

/// Decode a message from bytes using postcard
pub fn decode_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    postcard::from_bytes(bytes).map_err(ProtocolError::from)
}

/// Encode a message with length prefix for framing
///
/// # Example
/// ```
/// use protocol::{IpcReply, encode_framed};
///
/// let framed = encode_framed(&IpcReply::ok()).unwrap();
/// assert!(framed.len() >= 4);
/// ```
pub fn encode_framed<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let message_bytes = encode_message(message)?;
    let message_len = message_bytes.len();

    if message_len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: message_len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(4 + message_len);
    frame.extend_from_slice(&(message_len as u32).to_be_bytes());
    frame.extend_from_slice(&message_bytes);

    Ok(frame)
}

/// Decode a framed message
///
/// Expects frame format: [4-byte length (big-endian)][postcard message bytes]
pub fn decode_framed<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    if frame.len() < 4 {
        return Err(ProtocolError::IncompleteFrame {
            expected: 4,
            actual: frame.len(),
        });
    }

    let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    if frame.len() < 4 + length {
        return Err(ProtocolError::IncompleteFrame {
            expected: 4 + length,
            actual: frame.len(),
        });
    }

    decode_message(&frame[4..4 + length])
}

/// Write a framed message to a blocking writer
pub fn write_framed<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let framed = encode_framed(message)?;
    writer.write_all(&framed)?;
    writer.flush()?;
    Ok(())
}

/// Read a framed message from a blocking reader
///
/// # Example
/// ```
/// use protocol::{IpcRequest, read_framed, write_framed};
/// use std::io::Cursor;
///
/// let mut buffer = Vec::new();
/// write_framed(&mut buffer, &IpcRequest::disable(1050, 407)).unwrap();
///
/// let decoded: IpcRequest = read_framed(&mut Cursor::new(buffer)).unwrap();
/// assert_eq!(decoded.id_vendor, 1050);
/// ```
pub fn read_framed<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let length = u32::from_be_bytes(len_bytes) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut message_bytes = vec![0u8; length];
    reader.read_exact(&mut message_bytes)?;

    decode_message(&message_bytes)
}

/// Async: Write a framed message to an async writer
#[cfg(feature = "async")]
pub async fn write_framed_async<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let framed = encode_framed(message)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Async: Read a framed message from an async reader
///
/// Returns [`ProtocolError::ConnectionClosed`] when the peer closes the
/// stream cleanly before a new frame starts.
#[cfg(feature = "async")]
pub async fn read_framed_async<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    let mut filled = 0;
    while filled < len_bytes.len() {
        let n = reader.read(&mut len_bytes[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Err(ProtocolError::ConnectionClosed)
            } else {
                Err(ProtocolError::IncompleteFrame {
                    expected: 4,
                    actual: filled,
                })
            };
        }
        filled += n;
    }
    let length = u32::from_be_bytes(len_bytes) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut message_bytes = vec![0u8; length];
    reader.read_exact(&mut message_bytes).await?;

    decode_message(&message_bytes)
}
