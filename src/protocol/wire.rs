//! Frame codec for the socket transport.
//!
//! A frame is a big-endian `u32` length followed by that many bytes of JSON.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{GatewayError, ProtocolErrorKind};

/// Default upper bound on a frame payload (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1_048_576;

/// Read one frame payload.
///
/// A clean EOF before the length prefix maps to `ConnectionClosed`.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<Vec<u8>, GatewayError>
where
    R: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(GatewayError::Protocol {
                kind: ProtocolErrorKind::ConnectionClosed,
            });
        }
        Err(e) => return Err(GatewayError::Io(e)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(GatewayError::Protocol {
            kind: ProtocolErrorKind::MessageTooLarge {
                size: len,
                max: max_size,
            },
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), GatewayError>
where
    W: AsyncWriteExt + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| GatewayError::Protocol {
        kind: ProtocolErrorKind::MessageTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        },
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame with a deadline.
pub async fn read_frame_with_timeout<R>(
    reader: &mut R,
    max_size: usize,
    deadline: Duration,
) -> Result<Vec<u8>, GatewayError>
where
    R: AsyncReadExt + Unpin,
{
    timeout(deadline, read_frame(reader, max_size))
        .await
        .map_err(|_| GatewayError::Protocol {
            kind: ProtocolErrorKind::ConnectionTimeout,
        })?
}

/// Serialize `value` and write it as one frame with a deadline.
pub async fn write_json_with_timeout<W, T>(
    writer: &mut W,
    value: &T,
    deadline: Duration,
) -> Result<(), GatewayError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    timeout(deadline, write_frame(writer, &payload))
        .await
        .map_err(|_| GatewayError::Protocol {
            kind: ProtocolErrorKind::ConnectionTimeout,
        })?
}

/// Decode a frame payload as JSON.
pub fn decode_json<T: DeserializeOwned>(payload: &[u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(payload).map_err(|e| GatewayError::Protocol {
        kind: ProtocolErrorKind::InvalidMessageFormat {
            message: format!("Invalid JSON: {}", e),
        },
    })
}
