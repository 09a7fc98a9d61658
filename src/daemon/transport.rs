//! Byte transport for the one-exchange-per-connection wire protocol.
//!
//! A frame is "everything until the peer closes its write side". The writer
//! half-closes after sending; the reader drains to EOF. Deadlines cover the
//! whole read and surface as `TimedOut`, distinguishable from transport
//! failures so the client's recovery logic can treat a wedged daemon
//! differently from a dead one.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::utils::error::{Result, SkFindError};

/// Write a full payload and flush. The caller half-closes afterwards.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(payload).await.map_err(SkFindError::Io)?;
    writer.flush().await.map_err(SkFindError::Io)?;
    Ok(())
}

/// Read until EOF, optionally bounded by a deadline.
///
/// The deadline applies to the whole read, not per chunk: a peer that
/// accepted the connection but never answers trips `TimedOut` rather than
/// hanging the caller forever.
pub async fn read_frame<R>(
    reader: &mut R,
    deadline: Option<Duration>,
    operation: &str,
) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();

    let read = async {
        reader.read_to_end(&mut buffer).await.map_err(SkFindError::Io)?;
        Ok::<(), SkFindError>(())
    };

    match deadline {
        Some(limit) => match tokio::time::timeout(limit, read).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SkFindError::TimedOut { operation: operation.to_string() });
            }
        },
        None => read.await?,
    }

    Ok(buffer)
}
