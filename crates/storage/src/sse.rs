//! Server-sent event framing for item streams.
//!
//! Turns a [`Database::stream`](crate::Database::stream) into the byte frames
//! an HTTP layer writes to an `text/event-stream` response:
//!
//! ```text
//! event: <name>
//! data: {"pk":"…","sk":"…","data":…,"versionstamp":"…"}
//!
//! ```

use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use serde::Serialize;

use crate::{
    error::{StorageError, StorageResult},
    pagination::ItemStream,
    types::Item,
};

/// Renders one item as an event frame.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the item cannot be rendered as
/// JSON.
pub fn frame<T: Serialize>(event: &str, item: &Item<T>) -> StorageResult<Bytes> {
    let json = serde_json::to_string(item)
        .map_err(|e| StorageError::serialization_with_source("failed to encode event", e))?;
    Ok(Bytes::from(format!("event: {event}\ndata: {json}\n\n")))
}

/// Maps an item stream to a stream of event frames.
///
/// Errors from the item stream pass through unchanged; the consumer decides
/// whether to end the response.
pub fn event_stream<T>(
    items: ItemStream<T>,
    event: impl Into<String>,
) -> BoxStream<'static, StorageResult<Bytes>>
where
    T: Serialize + Send + 'static,
{
    let event = event.into();
    items.map(move |item| item.and_then(|item| frame(&event, &item))).boxed()
}
