//! Page-fetch loop shared by `query` and `stream`.
//!
//! [`paginate`] turns a backend's [`query_page`](StorageBackend::query_page)
//! primitive into one lazy, ordered item stream. Nothing is fetched until the
//! stream is polled, and a page is requested only once the previous one has
//! been handed out, so dropping the stream stops further backend calls.
//! [`Database::query`](crate::Database::query) simply collects the same
//! stream, which keeps eager and lazy reads byte-for-byte identical.

use std::sync::Arc;

use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use serde_json::Value;

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    types::{Item, Key, Query},
};

/// Owned, lazily produced stream of items.
pub type ItemStream<T> = BoxStream<'static, StorageResult<Item<T>>>;

struct PageState {
    cursor: Option<Key>,
    remaining: Option<usize>,
    exhausted: bool,
}

/// Streams every item matching `query`, page by page.
///
/// The per-page limit is the backend's [`page_size`](StorageBackend::page_size),
/// reduced to whatever is left of `query.limit`. The stream ends when the
/// backend reports no cursor or the limit is reached.
pub fn paginate<B>(backend: Arc<B>, query: Query) -> ItemStream<Value>
where
    B: StorageBackend + ?Sized + 'static,
{
    let page_size = backend.page_size().max(1);
    let initial = PageState { cursor: None, remaining: query.limit, exhausted: false };

    let pages = stream::try_unfold(initial, move |mut state| {
        let backend = Arc::clone(&backend);
        let query = query.clone();
        async move {
            if state.exhausted || state.remaining == Some(0) {
                return Ok::<_, StorageError>(None);
            }

            let limit = state.remaining.map_or(page_size, |remaining| remaining.min(page_size));
            let page = backend.query_page(&query, state.cursor.as_ref(), limit).await?;
            tracing::trace!(
                pk = %query.pk,
                fetched = page.items.len(),
                more = page.cursor.is_some(),
                "fetched page"
            );

            let mut items = page.items;
            if let Some(remaining) = state.remaining.as_mut() {
                items.truncate(*remaining);
                *remaining -= items.len();
            }
            state.exhausted = page.cursor.is_none();
            state.cursor = page.cursor;
            Ok(Some((items, state)))
        }
    });

    pages
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, StorageError>)))
        .try_flatten()
        .boxed()
}
