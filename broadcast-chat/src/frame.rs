use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::mutf8;

/// Largest payload a frame can carry; the length prefix is a `u16`.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Reserved chat line that ends a session instead of being broadcast.
pub const EXIT_TOKEN: &str = "exit";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("stream closed in the middle of a frame")]
    Truncated,
    #[error("malformed frame payload: {0}")]
    Malformed(String),
    #[error("frame payload of {len} bytes exceeds the {max} byte limit", max = MAX_FRAME_LEN)]
    TooLong { len: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reads one `[u16 length][modified UTF-8]` frame.
///
/// Returns `Ok(None)` when the peer closes the stream on a frame boundary.
/// A close anywhere inside a frame is [`FrameError::Truncated`]. Not cancel
/// safe: dropping the future mid-frame loses the bytes already consumed.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<String>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    read_exact_or_truncated(reader, &mut header[1..]).await?;

    let len = usize::from(u16::from_be_bytes(header));
    let mut payload = vec![0u8; len];
    read_exact_or_truncated(reader, &mut payload).await?;

    mutf8::decode(&payload).map(Some)
}

/// Encodes `message` as one frame and flushes it.
///
/// Nothing is written when the payload does not fit the length prefix.
pub async fn write_frame<W>(writer: &mut W, message: &str) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = mutf8::encoded_len(message);
    let prefix = u16::try_from(len).map_err(|_| FrameError::TooLong { len })?;

    let mut encoded = Vec::with_capacity(2 + len);
    encoded.extend_from_slice(&prefix.to_be_bytes());
    mutf8::encode_into(message, &mut encoded);

    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_exact_or_truncated<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(FrameError::Truncated),
        Err(err) => Err(err.into()),
    }
}
