//! Length-prefixed JSON framing
//!
//! Every message in either direction is a 4-byte unsigned little-endian
//! length followed by that many bytes of UTF-8 JSON.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use sdk::errors::EngineError;

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Frames larger than this are treated as a corrupt stream
pub const MAX_FRAME_BYTES: usize = 512 * 1024 * 1024;

/// Encode a JSON payload as a complete wire frame
pub fn encode(payload: &Value) -> Result<Vec<u8>, EngineError> {
    let body = serde_json::to_vec(payload)?;
    let len = u32::try_from(body.len()).map_err(|_| {
        EngineError::InvalidActionFormat(format!("payload of {} bytes is too large", body.len()))
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_BYTES + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write an already encoded frame and flush it
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Read one frame body.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly before a new
/// length prefix started. Short reads are retried until the full body has
/// arrived.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame length {} exceeds limit", len),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}
