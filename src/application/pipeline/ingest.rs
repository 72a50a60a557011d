use std::error::Error as StdError;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, pin_mut};

use super::error::PipelineError;

/// Accumulate `stream` into `buffer`, refusing any chunk that would take the
/// buffer past `limit` bytes.
///
/// The check happens before the chunk is appended, so on overflow the buffer
/// still holds at most `limit` bytes.
pub(crate) async fn read_body<S, E>(
    buffer: &mut BytesMut,
    stream: S,
    limit: usize,
) -> Result<(), PipelineError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| PipelineError::Ingest(err.into()))?;
        let received = buffer.len().saturating_add(chunk.len());
        if received > limit {
            return Err(PipelineError::IngestOverflow { limit, received });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(())
}
