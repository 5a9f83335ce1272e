use std::{future::Future, io, time::Duration};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::header::{MbapHeader, MBAP_PREFIX_LEN};
use crate::api::traits::{TransportError, TransportResult, RECEIVE_OPERATION};

/// Run an I/O future under `limit`; a zero limit waits indefinitely.
pub async fn bounded<F, O>(operation: &str, limit: Duration, future: F) -> TransportResult<O>
where
    F: Future<Output = io::Result<O>>,
{
    let result = if limit.is_zero() {
        future.await
    } else {
        tokio::time::timeout(limit, future)
            .await
            .map_err(|_| TransportError::Timeout {
                operation: operation.to_string(),
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })?
    };
    result.map_err(TransportError::io)
}

pub async fn write_modbus_frame<S>(
    stream: &mut S,
    frame: &[u8],
    limit: Duration,
) -> TransportResult<()>
where
    S: AsyncWrite + Unpin,
{
    log::debug!("Send Modbus request: {frame:02x?}");
    bounded("send", limit, async {
        stream.write_all(frame).await?;
        stream.flush().await
    })
    .await
}

/// Read one complete MBAP frame, sized by the header's length field
///
/// Only the wait for the header may time out softly. A malformed header or a
/// body that stops arriving leaves the stream out of sync, so both are
/// reported as I/O failures rather than protocol errors.
pub async fn read_modbus_frame<S>(stream: &mut S, limit: Duration) -> TransportResult<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut prefix = [0u8; MBAP_PREFIX_LEN];
    bounded(RECEIVE_OPERATION, limit, stream.read_exact(&mut prefix)).await?;
    let header = MbapHeader::parse(prefix).map_err(TransportError::io)?;

    let mut frame = prefix.to_vec();
    frame.resize(MBAP_PREFIX_LEN + usize::from(header.length), 0);
    bounded("receive body", limit, stream.read_exact(&mut frame[MBAP_PREFIX_LEN..]))
        .await
        .map_err(|err| match err {
            TransportError::Timeout { .. } => TransportError::io(err),
            other => other,
        })?;

    log::debug!("Received Modbus response: {frame:02x?}");
    Ok(frame)
}
